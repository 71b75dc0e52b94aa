use std::time::Duration;

use envconfig::Envconfig;
use registrator::{CheckSettings, DiscoveryType};

use crate::options::{Options, DEFAULT_DISCOVERY_NAMESPACE};

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    // ── gRPC server ─────────────────────────────────────────────────
    #[envconfig(default = "0.0.0.0:9999")]
    pub grpc_bind_address: String,

    #[envconfig(default = "0.0.0.0:8080")]
    pub health_bind_address: String,

    // ── Service discovery ───────────────────────────────────────────
    #[envconfig(default = "none")]
    pub service_discovery: DiscoveryType,

    /// Falls back to the pod's namespace for Kubernetes, "consul" otherwise.
    pub service_discovery_namespace: Option<String>,

    #[envconfig(from = "POD_NAMESPACE")]
    pub pod_namespace: Option<String>,

    #[envconfig(default = "ndd")]
    pub controller_config_name: String,

    #[envconfig(from = "CONSUL_HTTP_ADDR", default = "http://127.0.0.1:8500")]
    pub consul_http_addr: String,

    #[envconfig(from = "CONSUL_HTTP_TOKEN")]
    pub consul_http_token: Option<String>,

    #[envconfig(default = "https://kubernetes.default.svc")]
    pub kubernetes_api_url: String,

    // ── Health checks ───────────────────────────────────────────────
    #[envconfig(default = "15")]
    pub health_ttl_secs: u64,

    #[envconfig(default = "5")]
    pub health_renew_interval_secs: u64,

    #[envconfig(default = "60")]
    pub deregister_critical_after_secs: u64,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.health_ttl_secs)
    }

    pub fn health_renew_interval(&self) -> Duration {
        Duration::from_secs(self.health_renew_interval_secs)
    }

    pub fn deregister_critical_after(&self) -> Duration {
        Duration::from_secs(self.deregister_critical_after_secs)
    }

    pub fn discovery_namespace(&self) -> String {
        if let Some(namespace) = &self.service_discovery_namespace {
            return namespace.clone();
        }
        match self.service_discovery {
            // Left empty when unknown so the pod client refuses to build
            DiscoveryType::Kubernetes => self.pod_namespace.clone().unwrap_or_default(),
            _ => DEFAULT_DISCOVERY_NAMESPACE.to_string(),
        }
    }

    pub fn options(&self) -> Options {
        Options {
            grpc_bind_address: self.grpc_bind_address.clone(),
            service_discovery: self.service_discovery,
            service_discovery_namespace: self.discovery_namespace(),
            controller_config_name: self.controller_config_name.clone(),
            consul_address: self.consul_http_addr.clone(),
            consul_token: self.consul_http_token.clone(),
            kubernetes_api_url: self.kubernetes_api_url.clone(),
            checks: CheckSettings {
                ttl: self.health_ttl(),
                renew_interval: self.health_renew_interval(),
                deregister_critical_after: self.deregister_critical_after(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
