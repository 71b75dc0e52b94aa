use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Serialize;

use crate::connector::ConsulSettings;
use crate::discovery::DiscoveryType;
use crate::error::RegistratorError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Body of `PUT /v1/agent/service/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<AgentServiceCheck>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentServiceCheck {
    #[serde(rename = "CheckID")]
    pub check_id: String,
    pub name: String,
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(rename = "GRPC", skip_serializing_if = "Option::is_none")]
    pub grpc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deregister_critical_service_after: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passing,
    Warning,
    Critical,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CheckUpdate<'a> {
    status: CheckStatus,
    output: &'a str,
}

/// The slice of the Consul agent API the registrator needs.
#[async_trait]
pub trait ConsulApi: Send + Sync {
    /// Consul namespace the session is scoped to.
    fn namespace(&self) -> &str;

    async fn register_service(
        &self,
        registration: &AgentServiceRegistration,
    ) -> Result<(), RegistratorError>;

    async fn deregister_service(&self, service_id: &str) -> Result<(), RegistratorError>;

    async fn update_ttl(
        &self,
        check_id: &str,
        status: CheckStatus,
        output: &str,
    ) -> Result<(), RegistratorError>;
}

/// Consul agent client over HTTP.
pub struct HttpConsulClient {
    client: reqwest::Client,
    address: String,
    namespace: String,
    token: Option<String>,
}

impl HttpConsulClient {
    pub fn new(settings: &ConsulSettings) -> Result<Self, RegistratorError> {
        let address = settings.address.trim().trim_end_matches('/').to_string();
        if address.is_empty() {
            return Err(RegistratorError::Config {
                backend: DiscoveryType::Consul,
                reason: "agent address is empty".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RegistratorError::Client {
                backend: DiscoveryType::Consul,
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            address,
            namespace: settings.namespace.clone(),
            token: settings.token.clone(),
        })
    }

    fn put(&self, path: &str) -> RequestBuilder {
        let mut request = self.client.put(format!("{}{}", self.address, path));
        if !self.namespace.is_empty() {
            request = request.query(&[("ns", self.namespace.as_str())]);
        }
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> Result<(), RegistratorError> {
        let response = request
            .send()
            .await
            .map_err(|source| RegistratorError::Request {
                backend: DiscoveryType::Consul,
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(RegistratorError::Rejected {
            backend: DiscoveryType::Consul,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ConsulApi for HttpConsulClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn register_service(
        &self,
        registration: &AgentServiceRegistration,
    ) -> Result<(), RegistratorError> {
        self.send(self.put("/v1/agent/service/register").json(registration))
            .await
    }

    async fn deregister_service(&self, service_id: &str) -> Result<(), RegistratorError> {
        self.send(self.put(&format!("/v1/agent/service/deregister/{service_id}")))
            .await
    }

    async fn update_ttl(
        &self,
        check_id: &str,
        status: CheckStatus,
        output: &str,
    ) -> Result<(), RegistratorError> {
        let update = CheckUpdate { status, output };
        self.send(
            self.put(&format!("/v1/agent/check/update/{check_id}"))
                .json(&update),
        )
        .await
    }
}

/// Formats a duration the way Consul parses them (`15s`, `1500ms`).
pub(crate) fn consul_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn settings(address: String) -> ConsulSettings {
        ConsulSettings {
            address,
            namespace: "ns1".to_string(),
            token: Some("secret".to_string()),
        }
    }

    fn registration() -> AgentServiceRegistration {
        AgentServiceRegistration {
            id: "r1".to_string(),
            name: "ndd-reconciler".to_string(),
            address: "10.0.0.5".to_string(),
            port: 9999,
            tags: vec!["namespace=ns1".to_string()],
            checks: vec![AgentServiceCheck {
                check_id: "service:r1:ttl".to_string(),
                name: "ndd-reconciler ttl".to_string(),
                ttl: Some("15s".to_string()),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn formats_durations_for_consul() {
        assert_eq!(consul_duration(Duration::from_secs(15)), "15s");
        assert_eq!(consul_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn empty_address_is_a_config_error() {
        let result = HttpConsulClient::new(&settings(" ".to_string()));
        assert!(matches!(result, Err(RegistratorError::Config { .. })));
    }

    #[tokio::test]
    async fn registers_in_namespace_with_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/v1/agent/service/register")
                    .query_param("ns", "ns1")
                    .header(TOKEN_HEADER, "secret")
                    .body_contains("\"ID\":\"r1\"")
                    .body_contains("\"CheckID\":\"service:r1:ttl\"")
                    .body_contains("\"TTL\":\"15s\"");
                then.status(200);
            })
            .await;

        let client = HttpConsulClient::new(&settings(server.base_url())).expect("client");
        client
            .register_service(&registration())
            .await
            .expect("register");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_registration_keeps_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/v1/agent/service/register");
                then.status(403).body("Permission denied");
            })
            .await;

        let client = HttpConsulClient::new(&settings(server.base_url())).expect("client");
        let error = client
            .register_service(&registration())
            .await
            .expect_err("should be rejected");
        match error {
            RegistratorError::Rejected { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, "Permission denied");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn updates_ttl_and_deregisters() {
        let server = MockServer::start_async().await;
        let update = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/v1/agent/check/update/service:r1:ttl")
                    .body_contains("\"Status\":\"passing\"");
                then.status(200);
            })
            .await;
        let deregister = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/v1/agent/service/deregister/r1")
                    .query_param("ns", "ns1");
                then.status(200);
            })
            .await;

        let client = HttpConsulClient::new(&settings(server.base_url())).expect("client");
        client
            .update_ttl("service:r1:ttl", CheckStatus::Passing, "serving")
            .await
            .expect("update ttl");
        client.deregister_service("r1").await.expect("deregister");

        update.assert_async().await;
        deregister.assert_async().await;
    }
}
