use thiserror::Error;

use crate::discovery::DiscoveryType;
use crate::service::HealthCheckKind;

/// Failures surfaced by registrators and their backend clients.
#[derive(Debug, Error)]
pub enum RegistratorError {
    #[error("invalid service descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("invalid {backend} configuration: {reason}")]
    Config {
        backend: DiscoveryType,
        reason: String,
    },
    #[error("failed to build {backend} client: {reason}")]
    Client {
        backend: DiscoveryType,
        reason: String,
    },
    #[error("{backend} request failed: {source}")]
    Request {
        backend: DiscoveryType,
        #[source]
        source: reqwest::Error,
    },
    #[error("{backend} rejected the request with status {status}: {body}")]
    Rejected {
        backend: DiscoveryType,
        status: u16,
        body: String,
    },
    #[error("{backend} does not support {kind} health checks")]
    UnsupportedHealthCheck {
        backend: DiscoveryType,
        kind: HealthCheckKind,
    },
    #[error("{backend} call cancelled")]
    Cancelled { backend: DiscoveryType },
}
