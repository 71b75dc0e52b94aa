use anyhow::Context;
use axum::{routing::get, Router};
use envconfig::Envconfig;
use health::HealthMonitor;
use registrator::HttpConnector;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use reconciler_controller::config::Config;
use reconciler_controller::{Identity, ReconcilerController};

async fn shutdown_signal() -> anyhow::Result<()> {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to register SIGTERM handler")?;
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .context("failed to register SIGINT handler")?;

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
    Ok(())
}

async fn serve_health(
    bind: String,
    monitor: HealthMonitor,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let readiness = monitor.clone();
    let router = Router::new()
        .route(
            "/_readiness",
            get(move || {
                let monitor = readiness.clone();
                async move { monitor.check() }
            }),
        )
        .route("/_liveness", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind health port {bind}"))?;
    tracing::info!("Health server listening on {}", bind);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("health server error")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(log_layer)
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::init_from_env().context("invalid configuration")?;
    let identity = Identity::from_env().context("invalid pod identity")?;

    tracing::info!("Starting reconciler controller");
    tracing::info!("gRPC address: {}", config.grpc_bind_address);
    tracing::info!("Service discovery: {}", config.service_discovery);

    let shutdown = CancellationToken::new();
    let controller = ReconcilerController::new(&shutdown, config.options(), &HttpConnector)?;

    let health_task = tokio::spawn(serve_health(
        config.health_bind_address.clone(),
        controller.health().clone(),
        shutdown.clone(),
    ));

    if let Err(e) = controller.start(&identity).await {
        shutdown.cancel();
        return Err(e).context("failed to start reconciler controller");
    }

    shutdown_signal().await?;
    controller.stop().await?;
    shutdown.cancel();

    health_task.await??;
    Ok(())
}
