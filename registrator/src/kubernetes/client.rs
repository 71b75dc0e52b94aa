use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::connector::KubernetesSettings;
use crate::discovery::DiscoveryType;
use crate::error::RegistratorError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MERGE_PATCH: &str = "application/merge-patch+json";

/// The slice of the Kubernetes API the registrator needs.
#[async_trait]
pub trait PodApi: Send + Sync {
    /// Namespace of the pods this session patches.
    fn namespace(&self) -> &str;

    /// Applies a JSON merge patch to a pod's metadata.
    async fn patch_pod(&self, name: &str, patch: &serde_json::Value)
        -> Result<(), RegistratorError>;
}

/// Pod client talking to the API server over HTTP.
pub struct HttpPodApi {
    client: reqwest::Client,
    api_url: String,
    namespace: String,
    token: Option<String>,
}

impl HttpPodApi {
    pub fn new(settings: &KubernetesSettings) -> Result<Self, RegistratorError> {
        let api_url = settings.api_url.trim().trim_end_matches('/').to_string();
        if api_url.is_empty() {
            return Err(config_error("api server url is empty"));
        }
        if settings.namespace.trim().is_empty() {
            return Err(config_error("pod namespace is empty"));
        }

        let token = match (&settings.token, &settings.token_path) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(path)) => read_optional(path)?.map(|t| t.trim().to_string()),
            (None, None) => None,
        };

        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(path) = &settings.ca_path {
            if let Some(pem) = read_optional(path)? {
                let cert = reqwest::Certificate::from_pem(pem.as_bytes()).map_err(|e| {
                    RegistratorError::Client {
                        backend: DiscoveryType::Kubernetes,
                        reason: format!("invalid CA bundle {}: {e}", path.display()),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }
        let client = builder.build().map_err(|e| RegistratorError::Client {
            backend: DiscoveryType::Kubernetes,
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            api_url,
            namespace: settings.namespace.clone(),
            token,
        })
    }
}

#[async_trait]
impl PodApi for HttpPodApi {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn patch_pod(
        &self,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), RegistratorError> {
        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}",
            self.api_url, self.namespace, name
        );
        let mut request = self
            .client
            .patch(url)
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(patch.to_string());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|source| RegistratorError::Request {
                backend: DiscoveryType::Kubernetes,
                source,
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(RegistratorError::Rejected {
            backend: DiscoveryType::Kubernetes,
            status: status.as_u16(),
            body,
        })
    }
}

fn config_error(reason: &str) -> RegistratorError {
    RegistratorError::Config {
        backend: DiscoveryType::Kubernetes,
        reason: reason.to_string(),
    }
}

// Service account files are absent outside a cluster
fn read_optional(path: &Path) -> Result<Option<String>, RegistratorError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "service account file not found, skipping");
            Ok(None)
        }
        Err(e) => Err(RegistratorError::Config {
            backend: DiscoveryType::Kubernetes,
            reason: format!("failed to read {}: {e}", path.display()),
        }),
    }
}
