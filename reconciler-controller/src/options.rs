use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use registrator::{
    CheckSettings, DiscoveryType, HealthCheckKind, RegistratorSettings, DEFAULT_CONSUL_ADDRESS,
    DEFAULT_KUBERNETES_API_URL, SERVICE_ACCOUNT_CA, SERVICE_ACCOUNT_TOKEN,
};
use tonic::service::Routes;

pub const DEFAULT_GRPC_BIND_ADDRESS: &str = "0.0.0.0:9999";
pub const DEFAULT_DISCOVERY_NAMESPACE: &str = "consul";
pub const DEFAULT_CONTROLLER_CONFIG_NAME: &str = "ndd";

/// Construction parameters of a [`ReconcilerController`](crate::ReconcilerController).
#[derive(Clone, Debug)]
pub struct Options {
    pub grpc_bind_address: String,
    pub service_discovery: DiscoveryType,
    /// Consul namespace, or the namespace of the controller's pod for Kubernetes.
    pub service_discovery_namespace: String,
    pub controller_config_name: String,
    /// Overrides the discovery type's default health checks.
    pub health_checks: Option<BTreeSet<HealthCheckKind>>,
    pub consul_address: String,
    pub consul_token: Option<String>,
    pub kubernetes_api_url: String,
    pub kubernetes_token_path: Option<PathBuf>,
    pub kubernetes_ca_path: Option<PathBuf>,
    pub checks: CheckSettings,
    pub health_poll_interval: Duration,
    /// Extra gRPC services served next to the health service.
    pub routes: Option<Routes>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            grpc_bind_address: DEFAULT_GRPC_BIND_ADDRESS.to_string(),
            service_discovery: DiscoveryType::None,
            service_discovery_namespace: DEFAULT_DISCOVERY_NAMESPACE.to_string(),
            controller_config_name: DEFAULT_CONTROLLER_CONFIG_NAME.to_string(),
            health_checks: None,
            consul_address: DEFAULT_CONSUL_ADDRESS.to_string(),
            consul_token: None,
            kubernetes_api_url: DEFAULT_KUBERNETES_API_URL.to_string(),
            kubernetes_token_path: Some(PathBuf::from(SERVICE_ACCOUNT_TOKEN)),
            kubernetes_ca_path: Some(PathBuf::from(SERVICE_ACCOUNT_CA)),
            checks: CheckSettings::default(),
            health_poll_interval: health::DEFAULT_POLL_INTERVAL,
            routes: None,
        }
    }
}

impl Options {
    /// Name the controller registers under, e.g. `ndd-reconciler`.
    pub fn service_name(&self) -> String {
        format!("{}-reconciler", self.controller_config_name)
    }

    pub fn health_checks(&self) -> BTreeSet<HealthCheckKind> {
        self.health_checks
            .clone()
            .unwrap_or_else(|| self.service_discovery.default_health_checks())
    }

    pub fn registrator_settings(&self) -> RegistratorSettings {
        RegistratorSettings {
            discovery: self.service_discovery,
            namespace: self.service_discovery_namespace.clone(),
            consul_address: self.consul_address.clone(),
            consul_token: self.consul_token.clone(),
            kubernetes_api_url: self.kubernetes_api_url.clone(),
            kubernetes_token: None,
            kubernetes_token_path: self.kubernetes_token_path.clone(),
            kubernetes_ca_path: self.kubernetes_ca_path.clone(),
            checks: self.checks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_derives_from_config_name() {
        let options = Options {
            controller_config_name: "fabric".to_string(),
            ..Default::default()
        };
        assert_eq!(options.service_name(), "fabric-reconciler");
        assert_eq!(Options::default().service_name(), "ndd-reconciler");
    }

    #[test]
    fn health_checks_follow_discovery_unless_overridden() {
        let consul = Options {
            service_discovery: DiscoveryType::Consul,
            ..Default::default()
        };
        assert_eq!(
            consul.health_checks(),
            BTreeSet::from([HealthCheckKind::Ttl, HealthCheckKind::ActiveProbe])
        );

        let ttl_only = Options {
            health_checks: Some(BTreeSet::from([HealthCheckKind::Ttl])),
            ..consul
        };
        assert_eq!(
            ttl_only.health_checks(),
            BTreeSet::from([HealthCheckKind::Ttl])
        );
        assert!(Options::default().health_checks().is_empty());
    }

    #[test]
    fn registrator_settings_carry_namespace() {
        let options = Options {
            service_discovery: DiscoveryType::Consul,
            service_discovery_namespace: "ns1".to_string(),
            consul_token: Some("secret".to_string()),
            ..Default::default()
        };
        let settings = options.registrator_settings();
        assert_eq!(settings.discovery, DiscoveryType::Consul);
        assert_eq!(settings.consul_settings().namespace, "ns1");
        assert_eq!(settings.consul_settings().token.as_deref(), Some("secret"));
    }
}
