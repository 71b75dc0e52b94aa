use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::discovery::DiscoveryType;
use crate::error::RegistratorError;
use crate::service::ServiceDescriptor;
use crate::Registrator;

/// Registrator used when no discovery integration is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopRegistrator;

#[async_trait]
impl Registrator for NopRegistrator {
    fn kind(&self) -> DiscoveryType {
        DiscoveryType::None
    }

    async fn register(
        &self,
        _ctx: &CancellationToken,
        _service: &ServiceDescriptor,
    ) -> Result<(), RegistratorError> {
        Ok(())
    }

    async fn deregister(
        &self,
        _ctx: &CancellationToken,
        _service_id: &str,
    ) -> Result<(), RegistratorError> {
        Ok(())
    }
}
