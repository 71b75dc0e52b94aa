use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::consul::{ConsulApi, HttpConsulClient};
use crate::discovery::DiscoveryType;
use crate::error::RegistratorError;
use crate::kubernetes::{HttpPodApi, PodApi};

pub const DEFAULT_CONSUL_ADDRESS: &str = "http://127.0.0.1:8500";
pub const DEFAULT_KUBERNETES_API_URL: &str = "https://kubernetes.default.svc";
pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Connection parameters of a Consul session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsulSettings {
    pub address: String,
    /// Consul namespace every call is scoped to.
    pub namespace: String,
    pub token: Option<String>,
}

/// Connection parameters of a Kubernetes API session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KubernetesSettings {
    pub api_url: String,
    /// Namespace of the pods the session patches.
    pub namespace: String,
    /// Bearer token; read from `token_path` when unset.
    pub token: Option<String>,
    pub token_path: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
}

/// Timings of the health checks a registrator enrolls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckSettings {
    pub ttl: Duration,
    pub renew_interval: Duration,
    pub deregister_critical_after: Duration,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(15),
            renew_interval: Duration::from_secs(5),
            deregister_critical_after: Duration::from_secs(60),
            probe_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Everything [`build`](crate::build) needs to pick and wire a registrator.
#[derive(Clone, Debug)]
pub struct RegistratorSettings {
    pub discovery: DiscoveryType,
    /// Namespace (Consul) or pod namespace (Kubernetes) the session is scoped to.
    pub namespace: String,
    pub consul_address: String,
    pub consul_token: Option<String>,
    pub kubernetes_api_url: String,
    pub kubernetes_token: Option<String>,
    pub kubernetes_token_path: Option<PathBuf>,
    pub kubernetes_ca_path: Option<PathBuf>,
    pub checks: CheckSettings,
}

impl Default for RegistratorSettings {
    fn default() -> Self {
        Self {
            discovery: DiscoveryType::None,
            namespace: String::new(),
            consul_address: DEFAULT_CONSUL_ADDRESS.to_string(),
            consul_token: None,
            kubernetes_api_url: DEFAULT_KUBERNETES_API_URL.to_string(),
            kubernetes_token: None,
            kubernetes_token_path: Some(PathBuf::from(SERVICE_ACCOUNT_TOKEN)),
            kubernetes_ca_path: Some(PathBuf::from(SERVICE_ACCOUNT_CA)),
            checks: CheckSettings::default(),
        }
    }
}

impl RegistratorSettings {
    pub fn consul_settings(&self) -> ConsulSettings {
        ConsulSettings {
            address: self.consul_address.clone(),
            namespace: self.namespace.clone(),
            token: self.consul_token.clone(),
        }
    }

    pub fn kubernetes_settings(&self) -> KubernetesSettings {
        KubernetesSettings {
            api_url: self.kubernetes_api_url.clone(),
            namespace: self.namespace.clone(),
            token: self.kubernetes_token.clone(),
            token_path: self.kubernetes_token_path.clone(),
            ca_path: self.kubernetes_ca_path.clone(),
        }
    }
}

/// Builds the backend clients a live registrator owns.
///
/// Production code uses [`HttpConnector`]; tests hand in fakes to observe
/// what the sessions were scoped to.
pub trait BackendConnector: Send + Sync {
    fn consul(&self, settings: &ConsulSettings) -> Result<Arc<dyn ConsulApi>, RegistratorError>;

    fn kubernetes(
        &self,
        settings: &KubernetesSettings,
    ) -> Result<Arc<dyn PodApi>, RegistratorError>;
}

/// Connector speaking plain HTTP to the Consul agent and the Kubernetes API server.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl BackendConnector for HttpConnector {
    fn consul(&self, settings: &ConsulSettings) -> Result<Arc<dyn ConsulApi>, RegistratorError> {
        Ok(Arc::new(HttpConsulClient::new(settings)?))
    }

    fn kubernetes(
        &self,
        settings: &KubernetesSettings,
    ) -> Result<Arc<dyn PodApi>, RegistratorError> {
        Ok(Arc::new(HttpPodApi::new(settings)?))
    }
}
