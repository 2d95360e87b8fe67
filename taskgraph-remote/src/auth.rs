//! Credential resolution for the scheduler HTTP surface (§6.3): an
//! environment variable first, then a stored personal-access token keyed by
//! base URL, in the same precedence order as the system this was
//! distilled from. Grounded on `neuron-auth`'s `AuthProvider`/
//! `AuthProviderChain` pattern, renamed to this crate's own credential shape.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use taskgraph_core::TaskError;

/// A resolved bearer credential plus the organization/project headers a
/// personal-access token carries alongside it.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    /// Bearer token for the `Authorization` header.
    pub bearer_token: String,
    /// `X-Forwarded-Organization-Id`, for PAT auth.
    pub organization_id: Option<String>,
    /// `X-Forwarded-Project-Id`, for PAT auth.
    pub project_id: Option<String>,
}

/// Resolves a credential for a given scheduler base URL.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Produce a credential, or a usage error if none is available.
    async fn provide(&self, base_url: &str) -> Result<Credential, TaskError>;
}

/// Reads the bearer token from `TASKGRAPH_API_KEY`.
#[derive(Debug, Default)]
pub struct EnvCredentialProvider;

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn provide(&self, _base_url: &str) -> Result<Credential, TaskError> {
        std::env::var("TASKGRAPH_API_KEY")
            .map(|bearer_token| Credential {
                bearer_token,
                organization_id: None,
                project_id: None,
            })
            .map_err(|_| TaskError::UsageError("TASKGRAPH_API_KEY is not set".to_string()))
    }
}

/// An in-memory table of credentials keyed by base URL, standing in for a
/// TOML credentials file on disk (file I/O is out of scope; only the
/// precedence contract between it and the environment variable matters
/// here).
#[derive(Debug, Default)]
pub struct StaticCredentialStore {
    by_base_url: HashMap<String, Credential>,
}

impl StaticCredentialStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the credential to use for `base_url`.
    pub fn insert(mut self, base_url: impl Into<String>, credential: Credential) -> Self {
        self.by_base_url.insert(base_url.into(), credential);
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialStore {
    async fn provide(&self, base_url: &str) -> Result<Credential, TaskError> {
        self.by_base_url
            .get(base_url)
            .cloned()
            .ok_or_else(|| TaskError::UsageError(format!("no stored credential for {base_url}")))
    }
}

/// Tries providers in order until one succeeds, environment first.
pub struct CredentialChain {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl CredentialChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Append a provider to the end of the chain.
    pub fn with_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// The default chain: `TASKGRAPH_API_KEY`, then `store`.
    pub fn default_chain(store: Arc<StaticCredentialStore>) -> Self {
        Self::new()
            .with_provider(Arc::new(EnvCredentialProvider))
            .with_provider(store)
    }
}

impl Default for CredentialChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for CredentialChain {
    async fn provide(&self, base_url: &str) -> Result<Credential, TaskError> {
        let mut last_err = None;
        for provider in &self.providers {
            match provider.provide(base_url).await {
                Ok(c) => return Ok(c),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            TaskError::UsageError("no credential providers configured".to_string())
        }))
    }
}
