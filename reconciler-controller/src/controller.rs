use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use health::{HealthMonitor, HealthRegistry};
use registrator::{BackendConnector, Registrator, ServiceDescriptor};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ControllerError, LifecycleState};
use crate::identity::Identity;
use crate::options::Options;
use crate::server::{GrpcServer, RunningServer};

const DEREGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Starts the controller's gRPC server and keeps it registered with service
/// discovery for as long as it runs.
///
/// `start` and `stop` serialize on an internal lock. A stopped controller can
/// be started again; every run gets its own child of the construction token.
pub struct ReconcilerController {
    options: Options,
    registrator: Arc<dyn Registrator>,
    health: HealthMonitor,
    root: CancellationToken,
    state: watch::Sender<LifecycleState>,
    run: Mutex<Option<Run>>,
}

struct Run {
    token: CancellationToken,
    server: RunningServer,
    descriptor: ServiceDescriptor,
}

impl ReconcilerController {
    /// Builds the registrator selected by `options.service_discovery`. Nothing
    /// is started.
    ///
    /// Must be called from within a tokio runtime, the health registry spawns
    /// its message pump here. Outside one this returns [`ControllerError::Runtime`].
    pub fn new(
        parent: &CancellationToken,
        options: Options,
        connector: &dyn BackendConnector,
    ) -> Result<Self, ControllerError> {
        let root = parent.child_token();
        let health = monitor(&options, &root)?;
        let registrator = registrator::build(
            &options.registrator_settings(),
            connector,
            health.clone(),
        )
        .map_err(ControllerError::Construction)?;
        Ok(Self::assemble(root, options, registrator, health))
    }

    /// Like [`new`](Self::new), with a registrator built by the caller. Same
    /// runtime requirement.
    pub fn with_registrator(
        parent: &CancellationToken,
        options: Options,
        registrator: Arc<dyn Registrator>,
    ) -> Result<Self, ControllerError> {
        let root = parent.child_token();
        let health = monitor(&options, &root)?;
        Ok(Self::assemble(root, options, registrator, health))
    }

    fn assemble(
        root: CancellationToken,
        options: Options,
        registrator: Arc<dyn Registrator>,
        health: HealthMonitor,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Stopped);
        Self {
            options,
            registrator,
            health,
            root,
            state,
            run: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receives every lifecycle transition.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn registrator(&self) -> &Arc<dyn Registrator> {
        &self.registrator
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.run.lock().await.as_ref().map(|run| run.server.local_addr)
    }

    /// The descriptor registered by the current run.
    pub async fn descriptor(&self) -> Option<ServiceDescriptor> {
        self.run.lock().await.as_ref().map(|run| run.descriptor.clone())
    }

    fn transition(&self, state: LifecycleState) {
        let previous = self.state.send_replace(state);
        info!(from = %previous, to = %state, "controller state changed");
    }

    fn build_descriptor(&self, identity: &Identity, port: u16) -> ServiceDescriptor {
        ServiceDescriptor {
            name: self.options.service_name(),
            id: identity.pod_name.clone(),
            address: identity.address(),
            port,
            tags: identity.tags(),
            health_checks: self.options.health_checks(),
        }
    }

    /// Starts the gRPC server, then registers it.
    ///
    /// A server that cannot start is never registered. A failed registration
    /// shuts the server down again. Both leave the controller `Failed`.
    /// Once the construction token is cancelled nothing is bound or registered
    /// and [`ControllerError::ShuttingDown`] is returned.
    pub async fn start(&self, identity: &Identity) -> Result<(), ControllerError> {
        let mut run = self.run.lock().await;
        let state = self.state();
        if state != LifecycleState::Stopped {
            return Err(ControllerError::InvalidState(state));
        }
        if self.root.is_cancelled() {
            warn!("shutdown requested, not starting controller");
            return Err(ControllerError::ShuttingDown);
        }
        self.transition(LifecycleState::Starting);

        let token = self.root.child_token();
        let mut server = GrpcServer::new(&self.options.grpc_bind_address, self.health.clone())
            .with_service_name(self.options.service_name());
        if let Some(routes) = &self.options.routes {
            server = server.with_routes(routes.clone());
        }

        let server = match server.start(token.clone()).await {
            Ok(server) => server,
            Err(e) => {
                token.cancel();
                error!(address = %self.options.grpc_bind_address, error = %e, "grpc server failed to start");
                self.transition(LifecycleState::Failed);
                return Err(ControllerError::ServerStart(e));
            }
        };

        if token.is_cancelled() {
            warn!("shutdown requested while starting, stopping grpc server");
            if let Err(e) = server.wait().await {
                warn!(error = %e, "grpc server did not stop cleanly");
            }
            self.transition(LifecycleState::Stopped);
            return Err(ControllerError::ShuttingDown);
        }

        let descriptor = self.build_descriptor(identity, server.local_addr.port());
        if let Err(source) = self.registrator.register(&token, &descriptor).await {
            error!(
                discovery = %self.registrator.kind(),
                id = %descriptor.id,
                error = %source,
                "service registration failed, stopping grpc server"
            );
            token.cancel();
            if let Err(e) = server.wait().await {
                warn!(error = %e, "grpc server did not stop cleanly");
            }
            self.transition(LifecycleState::Failed);
            return Err(ControllerError::Registration {
                id: descriptor.id,
                source,
            });
        }

        info!(
            discovery = %self.registrator.kind(),
            service = %descriptor.name,
            id = %descriptor.id,
            address = %descriptor.address,
            port = descriptor.port,
            "reconciler controller running"
        );
        *run = Some(Run {
            token,
            server,
            descriptor,
        });
        self.transition(LifecycleState::Running);
        Ok(())
    }

    /// Deregisters and shuts the server down. Safe to call in any state and
    /// any number of times; a `Failed` controller is reset to `Stopped`.
    pub async fn stop(&self) -> Result<(), ControllerError> {
        let mut run = self.run.lock().await;
        let Some(current) = run.take() else {
            if self.state() == LifecycleState::Failed {
                self.transition(LifecycleState::Stopped);
            }
            return Ok(());
        };
        self.transition(LifecycleState::Stopping);

        // The run token may already be cancelled through the parent
        let ctx = CancellationToken::new();
        let deregister = self.registrator.deregister(&ctx, &current.descriptor.id);
        match tokio::time::timeout(DEREGISTER_TIMEOUT, deregister).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(id = %current.descriptor.id, error = %e, "failed to deregister service"),
            Err(_) => warn!(id = %current.descriptor.id, "timed out deregistering service"),
        }

        current.token.cancel();
        if let Err(e) = current.server.wait().await {
            warn!(error = %e, "grpc server did not stop cleanly");
        }
        self.transition(LifecycleState::Stopped);
        Ok(())
    }
}

fn monitor(options: &Options, root: &CancellationToken) -> Result<HealthMonitor, ControllerError> {
    tokio::runtime::Handle::try_current()?;
    Ok(HealthMonitor::new(HealthRegistry::new("reconciler-controller"))
        .with_shutdown(root.clone())
        .with_poll_interval(options.health_poll_interval))
}
