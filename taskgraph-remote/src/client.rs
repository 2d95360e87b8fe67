//! HTTP client for the scheduler surface (§6.2), built in the teacher's
//! builder style (`Client::new().model(...)` in `agent-provider-ollama`).

use crate::auth::{Credential, CredentialProvider};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Client as HttpClient;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.taskgraph.example.com";
const DEFAULT_NAMESPACE: &str = "default";

/// Talks to one scheduler namespace. Constructed once and reused across
/// requests; holds no per-request state.
pub struct RemoteClient {
    pub(crate) base_url: String,
    pub(crate) namespace: String,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) http: HttpClient,
}

impl RemoteClient {
    /// A client for the default namespace, reading `TASKGRAPH_API_URL` for
    /// the base URL (falling back to the production default) the way the
    /// original resolved `TENSORLAKE_API_URL`.
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            base_url: std::env::var("TASKGRAPH_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            namespace: DEFAULT_NAMESPACE.to_string(),
            credentials,
            http: HttpClient::new(),
        }
    }

    /// Override the scheduler base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the namespace, `"default"` otherwise.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub(crate) fn applications_url(&self) -> String {
        format!("{}/v1/namespaces/{}/applications", self.base_url, self.namespace)
    }

    pub(crate) fn application_url(&self, app_name: &str) -> String {
        format!("{}/{}", self.applications_url(), app_name)
    }

    pub(crate) fn run_url(&self, app_name: &str) -> String {
        self.application_url(app_name)
    }

    pub(crate) fn progress_url(&self, app_name: &str, request_id: &str) -> String {
        format!("{}/requests/{}/progress", self.application_url(app_name), request_id)
    }

    pub(crate) fn metadata_url(&self, app_name: &str, request_id: &str) -> String {
        format!("{}/requests/{}", self.application_url(app_name), request_id)
    }

    pub(crate) fn output_url(&self, app_name: &str, request_id: &str) -> String {
        format!("{}/requests/{}/output", self.application_url(app_name), request_id)
    }

    /// Build the auth headers for a credential, including the
    /// `X-Forwarded-*` pair a personal-access token carries.
    pub(crate) fn auth_headers(credential: &Credential) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", credential.bearer_token)) {
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(org) = &credential.organization_id {
            if let Ok(value) = HeaderValue::from_str(org) {
                headers.insert(
                    HeaderName::from_static("x-forwarded-organization-id"),
                    value,
                );
            }
        }
        if let Some(project) = &credential.project_id {
            if let Ok(value) = HeaderValue::from_str(project) {
                headers.insert(HeaderName::from_static("x-forwarded-project-id"), value);
            }
        }
        headers
    }

    pub(crate) async fn credential(&self) -> Result<Credential, taskgraph_core::TaskError> {
        self.credentials.provide(&self.base_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::EnvCredentialProvider;

    #[test]
    fn default_base_url_is_the_production_default() {
        unsafe {
            std::env::remove_var("TASKGRAPH_API_URL");
        }
        let client = RemoteClient::new(Arc::new(EnvCredentialProvider));
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn builder_overrides_base_url_and_namespace() {
        let client = RemoteClient::new(Arc::new(EnvCredentialProvider))
            .base_url("http://localhost:9090")
            .namespace("acme");
        assert_eq!(client.base_url, "http://localhost:9090");
        assert_eq!(client.namespace, "acme");
    }

    #[test]
    fn urls_are_built_under_the_namespace() {
        let client = RemoteClient::new(Arc::new(EnvCredentialProvider))
            .base_url("http://localhost:9090")
            .namespace("acme");
        assert_eq!(
            client.application_url("sum_all"),
            "http://localhost:9090/v1/namespaces/acme/applications/sum_all"
        );
        assert_eq!(
            client.progress_url("sum_all", "req-1"),
            "http://localhost:9090/v1/namespaces/acme/applications/sum_all/requests/req-1/progress"
        );
    }

    #[test]
    fn auth_headers_carry_bearer_and_forwarded_ids() {
        let headers = RemoteClient::auth_headers(&Credential {
            bearer_token: "tok".to_string(),
            organization_id: Some("org1".to_string()),
            project_id: Some("proj1".to_string()),
        });
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
        assert_eq!(headers.get("x-forwarded-organization-id").unwrap(), "org1");
        assert_eq!(headers.get("x-forwarded-project-id").unwrap(), "proj1");
    }
}
