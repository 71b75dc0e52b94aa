use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use health::{HealthMonitor, ServingStatus};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{consul_duration, AgentServiceCheck, AgentServiceRegistration, CheckStatus};
use super::ConsulApi;
use crate::connector::CheckSettings;
use crate::discovery::DiscoveryType;
use crate::error::RegistratorError;
use crate::service::{HealthCheckKind, ServiceDescriptor};
use crate::Registrator;

/// Registers with a Consul agent and keeps the service's TTL check passing.
///
/// Each registration that declares [`HealthCheckKind::Ttl`] gets a renewal
/// task pushing the [`HealthMonitor`] verdict to the agent every
/// `renew_interval`. The task stops when the context handed to `register` is
/// cancelled or the service is deregistered.
pub struct ConsulRegistrator {
    client: Arc<dyn ConsulApi>,
    checks: CheckSettings,
    health: HealthMonitor,
    renewals: Mutex<HashMap<String, CancellationToken>>,
}

impl ConsulRegistrator {
    pub fn new(client: Arc<dyn ConsulApi>, checks: CheckSettings, health: HealthMonitor) -> Self {
        Self {
            client,
            checks,
            health,
            renewals: Mutex::new(HashMap::new()),
        }
    }

    /// Consul namespace of the owned session.
    pub fn namespace(&self) -> &str {
        self.client.namespace()
    }

    fn registration(&self, service: &ServiceDescriptor) -> AgentServiceRegistration {
        let mut checks = Vec::new();
        if service.declares(HealthCheckKind::Ttl) {
            checks.push(AgentServiceCheck {
                check_id: ttl_check_id(&service.id),
                name: format!("{} ttl", service.name),
                ttl: Some(consul_duration(self.checks.ttl)),
                deregister_critical_service_after: Some(consul_duration(
                    self.checks.deregister_critical_after,
                )),
                ..Default::default()
            });
        }
        if service.declares(HealthCheckKind::ActiveProbe) {
            checks.push(AgentServiceCheck {
                check_id: format!("service:{}:grpc", service.id),
                name: format!("{} grpc", service.name),
                grpc: Some(service.endpoint()),
                interval: Some(consul_duration(self.checks.probe_interval)),
                timeout: Some(consul_duration(self.checks.probe_timeout)),
                deregister_critical_service_after: Some(consul_duration(
                    self.checks.deregister_critical_after,
                )),
                ..Default::default()
            });
        }

        AgentServiceRegistration {
            id: service.id.clone(),
            name: service.name.clone(),
            address: service.address.clone(),
            port: service.port,
            tags: service.tags.iter().cloned().collect(),
            checks,
        }
    }

    fn start_renewal(&self, ctx: &CancellationToken, service_id: &str) {
        let token = ctx.child_token();
        let previous = self
            .renewals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service_id.to_string(), token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        tokio::spawn(renew_ttl(
            self.client.clone(),
            ttl_check_id(service_id),
            self.checks.renew_interval,
            self.health.clone(),
            token,
        ));
    }

    fn stop_renewal(&self, service_id: &str) {
        let renewal = self
            .renewals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(service_id);
        if let Some(token) = renewal {
            token.cancel();
        }
    }
}

#[async_trait]
impl Registrator for ConsulRegistrator {
    fn kind(&self) -> DiscoveryType {
        DiscoveryType::Consul
    }

    async fn register(
        &self,
        ctx: &CancellationToken,
        service: &ServiceDescriptor,
    ) -> Result<(), RegistratorError> {
        service.validate_endpoint()?;
        let registration = self.registration(service);
        until_cancelled(ctx, self.client.register_service(&registration)).await?;

        if service.declares(HealthCheckKind::Ttl) {
            self.start_renewal(ctx, &service.id);
        }

        info!(
            discovery = %DiscoveryType::Consul,
            namespace = %self.client.namespace(),
            service = %service.name,
            id = %service.id,
            address = %service.address,
            port = service.port,
            checks = registration.checks.len(),
            "service registered"
        );
        Ok(())
    }

    async fn deregister(
        &self,
        ctx: &CancellationToken,
        service_id: &str,
    ) -> Result<(), RegistratorError> {
        self.stop_renewal(service_id);
        until_cancelled(ctx, self.client.deregister_service(service_id)).await?;
        info!(
            discovery = %DiscoveryType::Consul,
            id = %service_id,
            "service deregistered"
        );
        Ok(())
    }
}

fn ttl_check_id(service_id: &str) -> String {
    format!("service:{service_id}:ttl")
}

async fn until_cancelled<F>(ctx: &CancellationToken, call: F) -> Result<(), RegistratorError>
where
    F: Future<Output = Result<(), RegistratorError>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(RegistratorError::Cancelled { backend: DiscoveryType::Consul }),
        result = call => result,
    }
}

async fn renew_ttl(
    client: Arc<dyn ConsulApi>,
    check_id: String,
    interval: Duration,
    health: HealthMonitor,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // A slow agent call pushes the next renewal back instead of bursting
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let verdict = health.check();
                let status = match verdict {
                    ServingStatus::Serving => CheckStatus::Passing,
                    _ => CheckStatus::Critical,
                };
                if let Err(e) = client.update_ttl(&check_id, status, &verdict.to_string()).await {
                    warn!(check = %check_id, error = %e, "failed to renew consul ttl check");
                }
            }
        }
    }
    debug!(check = %check_id, "consul ttl renewal stopped");
}
