//! Service discovery registration for the reconciler controller.
//!
//! A [`Registrator`] advertises a [`ServiceDescriptor`] to one discovery
//! backend and removes it again. [`build`] picks the implementation from a
//! [`DiscoveryType`]; the live backends get their clients from a
//! [`BackendConnector`] so tests can substitute fakes.

use std::sync::Arc;

use async_trait::async_trait;
use health::HealthMonitor;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod connector;
pub mod consul;
mod discovery;
mod error;
pub mod kubernetes;
mod nop;
mod service;

pub use connector::{
    BackendConnector, CheckSettings, ConsulSettings, HttpConnector, KubernetesSettings,
    RegistratorSettings, DEFAULT_CONSUL_ADDRESS, DEFAULT_KUBERNETES_API_URL, SERVICE_ACCOUNT_CA,
    SERVICE_ACCOUNT_TOKEN,
};
pub use consul::ConsulRegistrator;
pub use discovery::{DiscoveryType, DiscoveryTypeParseError};
pub use error::RegistratorError;
pub use kubernetes::KubernetesRegistrator;
pub use nop::NopRegistrator;
pub use service::{HealthCheckKind, ServiceDescriptor};

/// Advertises service instances to a discovery backend.
///
/// Implementations are shared behind an `Arc` and may be called from several
/// tasks. Calls give up with [`RegistratorError::Cancelled`] once `ctx` is
/// cancelled.
#[async_trait]
pub trait Registrator: Send + Sync {
    fn kind(&self) -> DiscoveryType;

    async fn register(
        &self,
        ctx: &CancellationToken,
        service: &ServiceDescriptor,
    ) -> Result<(), RegistratorError>;

    async fn deregister(
        &self,
        ctx: &CancellationToken,
        service_id: &str,
    ) -> Result<(), RegistratorError>;
}

/// Builds the registrator selected by `settings.discovery`.
///
/// Consul sessions are scoped to `settings.namespace`, which must be set.
/// Kubernetes sessions patch pods in that namespace.
pub fn build(
    settings: &RegistratorSettings,
    connector: &dyn BackendConnector,
    health: HealthMonitor,
) -> Result<Arc<dyn Registrator>, RegistratorError> {
    let registrator: Arc<dyn Registrator> = match settings.discovery {
        DiscoveryType::None => Arc::new(NopRegistrator),
        DiscoveryType::Consul => {
            if settings.namespace.trim().is_empty() {
                return Err(RegistratorError::Config {
                    backend: DiscoveryType::Consul,
                    reason: "service discovery namespace is empty".to_string(),
                });
            }
            let client = connector.consul(&settings.consul_settings())?;
            Arc::new(ConsulRegistrator::new(
                client,
                settings.checks.clone(),
                health,
            ))
        }
        DiscoveryType::Kubernetes => {
            let pods = connector.kubernetes(&settings.kubernetes_settings())?;
            Arc::new(KubernetesRegistrator::new(pods))
        }
    };

    info!(
        discovery = %settings.discovery,
        namespace = %settings.namespace,
        "service registrator ready"
    );
    Ok(registrator)
}
