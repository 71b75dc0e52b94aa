use std::net::SocketAddr;

use health::HealthMonitor;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::service::Routes;
use tonic::transport::Server;
use tonic_health::pb::health_server::HealthServer;
use tracing::{error, info};

mod probe;

pub use probe::HealthService;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to resolve bind address {address}: {reason}")]
    Resolve { address: String, reason: String },
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("grpc transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("grpc server task failed: {0}")]
    Join(#[from] JoinError),
}

/// The controller's gRPC server: the health service plus whatever routes the
/// caller plugs in.
pub struct GrpcServer {
    bind_address: String,
    monitor: HealthMonitor,
    service_name: String,
    health: bool,
    routes: Routes,
}

impl GrpcServer {
    pub fn new(bind_address: impl Into<String>, monitor: HealthMonitor) -> Self {
        Self {
            bind_address: bind_address.into(),
            monitor,
            service_name: String::new(),
            health: true,
            routes: Routes::default(),
        }
    }

    /// Name the health service answers for, besides the overall `""`.
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_health(mut self, enabled: bool) -> Self {
        self.health = enabled;
        self
    }

    pub fn with_routes(mut self, routes: Routes) -> Self {
        self.routes = routes;
        self
    }

    /// Binds the listener and spawns the server task.
    ///
    /// Returns once the socket is listening. The server drains and exits when
    /// `shutdown` is cancelled; health answers `NOT_SERVING` from then on.
    pub async fn start(self, shutdown: CancellationToken) -> Result<RunningServer, ServerError> {
        let address = resolve(&self.bind_address).await?;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind { address, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { address, source })?;

        let mut routes = self.routes;
        if self.health {
            let monitor = self.monitor.with_shutdown(shutdown.clone());
            let service = HealthService::new(monitor, self.service_name.clone(), shutdown.clone());
            routes = routes.add_service(HealthServer::new(service));
        }
        let router = Server::builder().add_routes(routes);

        let token = shutdown.clone();
        let join = tokio::spawn(async move {
            let result = router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                    token.cancelled().await
                })
                .await;
            if let Err(e) = &result {
                error!(error = %e, "grpc server exited with error");
            }
            result
        });

        info!(
            address = %local_addr,
            service = %self.service_name,
            health = self.health,
            "grpc server listening"
        );
        Ok(RunningServer { local_addr, join })
    }
}

async fn resolve(bind_address: &str) -> Result<SocketAddr, ServerError> {
    let mut addresses = tokio::net::lookup_host(bind_address)
        .await
        .map_err(|e| ServerError::Resolve {
            address: bind_address.to_string(),
            reason: e.to_string(),
        })?;
    addresses.next().ok_or_else(|| ServerError::Resolve {
        address: bind_address.to_string(),
        reason: "no addresses found".to_string(),
    })
}

/// A server started by [`GrpcServer::start`].
pub struct RunningServer {
    pub local_addr: SocketAddr,
    join: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl RunningServer {
    /// Waits for the server task to exit. Cancel its shutdown token first.
    pub async fn wait(self) -> Result<(), ServerError> {
        self.join.await??;
        Ok(())
    }
}
