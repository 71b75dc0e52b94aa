use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::PodApi;
use crate::discovery::DiscoveryType;
use crate::error::RegistratorError;
use crate::service::{HealthCheckKind, ServiceDescriptor};
use crate::Registrator;

pub const ANNOTATION_PREFIX: &str = "reconciler.discovery/";
/// Label selecting every pod registered under a service name.
pub const SERVICE_LABEL: &str = "reconciler.discovery/service";

/// Publishes the descriptor as labels and annotations on the controller's pod.
///
/// The descriptor ID is the pod name. Only [`HealthCheckKind::ActiveProbe`]
/// is supported; the kubelet is the one doing the probing.
pub struct KubernetesRegistrator {
    pods: Arc<dyn PodApi>,
}

impl KubernetesRegistrator {
    pub fn new(pods: Arc<dyn PodApi>) -> Self {
        Self { pods }
    }

    pub fn namespace(&self) -> &str {
        self.pods.namespace()
    }
}

#[async_trait]
impl Registrator for KubernetesRegistrator {
    fn kind(&self) -> DiscoveryType {
        DiscoveryType::Kubernetes
    }

    async fn register(
        &self,
        ctx: &CancellationToken,
        service: &ServiceDescriptor,
    ) -> Result<(), RegistratorError> {
        service.validate_endpoint()?;
        if service.declares(HealthCheckKind::Ttl) {
            return Err(RegistratorError::UnsupportedHealthCheck {
                backend: DiscoveryType::Kubernetes,
                kind: HealthCheckKind::Ttl,
            });
        }

        until_cancelled(ctx, self.pods.patch_pod(&service.id, &register_patch(service))).await?;
        info!(
            discovery = %DiscoveryType::Kubernetes,
            namespace = %self.pods.namespace(),
            service = %service.name,
            pod = %service.id,
            port = service.port,
            "service registered"
        );
        Ok(())
    }

    async fn deregister(
        &self,
        ctx: &CancellationToken,
        service_id: &str,
    ) -> Result<(), RegistratorError> {
        if service_id.trim().is_empty() {
            return Err(RegistratorError::InvalidDescriptor(
                "pod name is empty".to_string(),
            ));
        }
        until_cancelled(ctx, self.pods.patch_pod(service_id, &deregister_patch())).await?;
        info!(
            discovery = %DiscoveryType::Kubernetes,
            namespace = %self.pods.namespace(),
            pod = %service_id,
            "service deregistered"
        );
        Ok(())
    }
}

fn annotation(key: &str) -> String {
    format!("{ANNOTATION_PREFIX}{key}")
}

fn join<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn register_patch(service: &ServiceDescriptor) -> Value {
    json!({
        "metadata": {
            "labels": {
                SERVICE_LABEL: service.name,
            },
            "annotations": {
                annotation("address"): service.address,
                annotation("port"): service.port.to_string(),
                annotation("health-checks"): join(&service.health_checks),
                annotation("tags"): join(&service.tags),
            }
        }
    })
}

// Null removes the key under merge-patch semantics
fn deregister_patch() -> Value {
    json!({
        "metadata": {
            "labels": {
                SERVICE_LABEL: null,
            },
            "annotations": {
                annotation("address"): null,
                annotation("port"): null,
                annotation("health-checks"): null,
                annotation("tags"): null,
            }
        }
    })
}

async fn until_cancelled<F>(ctx: &CancellationToken, call: F) -> Result<(), RegistratorError>
where
    F: Future<Output = Result<(), RegistratorError>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(RegistratorError::Cancelled { backend: DiscoveryType::Kubernetes }),
        result = call => result,
    }
}
