use std::collections::BTreeSet;

use envconfig::Envconfig;

/// Where this controller instance runs, as injected by the platform.
///
/// Missing variables read as empty strings; registrators decide whether an
/// empty field is acceptable.
#[derive(Envconfig, Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    #[envconfig(from = "POD_NAME", default = "")]
    pub pod_name: String,

    #[envconfig(from = "POD_NAMESPACE", default = "")]
    pub pod_namespace: String,

    #[envconfig(from = "POD_IP", default = "")]
    pub pod_ip: String,

    #[envconfig(from = "GRPC_SVC_NAME", default = "")]
    pub grpc_service_name: String,
}

impl Identity {
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Identity::init_from_env()
    }

    /// `pod_ip` when known, else the pod's DNS name behind the headless
    /// gRPC service, else empty.
    pub fn address(&self) -> String {
        if !self.pod_ip.trim().is_empty() {
            return self.pod_ip.trim().to_string();
        }
        let parts = [&self.pod_name, &self.grpc_service_name, &self.pod_namespace];
        if parts.iter().any(|part| part.trim().is_empty()) {
            return String::new();
        }
        format!(
            "{}.{}.{}.svc.cluster.local",
            self.pod_name, self.grpc_service_name, self.pod_namespace
        )
    }

    pub fn tags(&self) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        if !self.pod_namespace.trim().is_empty() {
            tags.insert(format!("namespace={}", self.pod_namespace));
        }
        tags
    }
}
