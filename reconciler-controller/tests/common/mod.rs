#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use registrator::consul::{AgentServiceRegistration, CheckStatus, ConsulApi};
use registrator::kubernetes::PodApi;
use registrator::{
    BackendConnector, ConsulSettings, DiscoveryType, KubernetesSettings, Registrator,
    RegistratorError, ServiceDescriptor,
};
use tokio_util::sync::CancellationToken;

use reconciler_controller::{Identity, Options};

pub fn test_options() -> Options {
    Options {
        grpc_bind_address: "127.0.0.1:0".to_string(),
        ..Default::default()
    }
}

pub fn pod_identity() -> Identity {
    Identity {
        pod_name: "r1".to_string(),
        pod_namespace: "ns1".to_string(),
        pod_ip: "10.0.0.5".to_string(),
        grpc_service_name: "reconciler".to_string(),
    }
}

// ── Registrator spy ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Register(ServiceDescriptor),
    Deregister(String),
}

#[derive(Default)]
pub struct SpyRegistrator {
    calls: Mutex<Vec<Call>>,
    fail_register: bool,
}

impl SpyRegistrator {
    pub fn failing() -> Self {
        Self {
            fail_register: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl Registrator for SpyRegistrator {
    fn kind(&self) -> DiscoveryType {
        DiscoveryType::Consul
    }

    async fn register(
        &self,
        _ctx: &CancellationToken,
        service: &ServiceDescriptor,
    ) -> Result<(), RegistratorError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(Call::Register(service.clone()));
        if self.fail_register {
            return Err(RegistratorError::Rejected {
                backend: DiscoveryType::Consul,
                status: 500,
                body: "agent unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn deregister(
        &self,
        _ctx: &CancellationToken,
        service_id: &str,
    ) -> Result<(), RegistratorError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(Call::Deregister(service_id.to_string()));
        Ok(())
    }
}

// ── Backend fakes ───────────────────────────────────────────────

/// Records the sessions it was asked to open and the calls made on them.
#[derive(Default)]
pub struct FakeConnector {
    pub consul_sessions: Mutex<Vec<ConsulSettings>>,
    pub kubernetes_sessions: Mutex<Vec<KubernetesSettings>>,
    pub backend: Arc<FakeBackend>,
}

#[derive(Default)]
pub struct FakeBackend {
    pub registrations: Mutex<Vec<AgentServiceRegistration>>,
    pub deregistrations: Mutex<Vec<String>>,
    pub pod_patches: Mutex<Vec<(String, serde_json::Value)>>,
}

impl BackendConnector for FakeConnector {
    fn consul(&self, settings: &ConsulSettings) -> Result<Arc<dyn ConsulApi>, RegistratorError> {
        self.consul_sessions
            .lock()
            .expect("sessions lock")
            .push(settings.clone());
        Ok(Arc::new(FakeSession(self.backend.clone(), settings.namespace.clone())))
    }

    fn kubernetes(
        &self,
        settings: &KubernetesSettings,
    ) -> Result<Arc<dyn PodApi>, RegistratorError> {
        self.kubernetes_sessions
            .lock()
            .expect("sessions lock")
            .push(settings.clone());
        Ok(Arc::new(FakeSession(self.backend.clone(), settings.namespace.clone())))
    }
}

struct FakeSession(Arc<FakeBackend>, String);

#[async_trait]
impl ConsulApi for FakeSession {
    fn namespace(&self) -> &str {
        &self.1
    }

    async fn register_service(
        &self,
        registration: &AgentServiceRegistration,
    ) -> Result<(), RegistratorError> {
        self.0
            .registrations
            .lock()
            .expect("registrations lock")
            .push(registration.clone());
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> Result<(), RegistratorError> {
        self.0
            .deregistrations
            .lock()
            .expect("deregistrations lock")
            .push(service_id.to_string());
        Ok(())
    }

    async fn update_ttl(
        &self,
        _check_id: &str,
        _status: CheckStatus,
        _output: &str,
    ) -> Result<(), RegistratorError> {
        Ok(())
    }
}

#[async_trait]
impl PodApi for FakeSession {
    fn namespace(&self) -> &str {
        &self.1
    }

    async fn patch_pod(
        &self,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), RegistratorError> {
        self.0
            .pod_patches
            .lock()
            .expect("patches lock")
            .push((name.to_string(), patch.clone()));
        Ok(())
    }
}
