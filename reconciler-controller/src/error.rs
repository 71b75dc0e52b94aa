use std::fmt;

use registrator::RegistratorError;
use thiserror::Error;

use crate::server::ServerError;

/// Where a [`ReconcilerController`](crate::ReconcilerController) is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to build service registrator: {0}")]
    Construction(#[source] RegistratorError),
    #[error("failed to start grpc server: {0}")]
    ServerStart(#[from] ServerError),
    #[error("failed to register service instance {id}: {source}")]
    Registration {
        id: String,
        #[source]
        source: RegistratorError,
    },
    #[error("controller cannot start while {0}")]
    InvalidState(LifecycleState),
    #[error("controller is shutting down")]
    ShuttingDown,
    #[error("controller must be built inside a tokio runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}
