#![deny(missing_docs)]
//! The remote runner (§4.4): submits a function call to an external
//! scheduler over HTTP and never executes user code in-process. Same
//! input/output contract as [`taskgraph_local::LocalRunner`], driven by an
//! application manifest instead of an in-process future graph.

pub mod auth;
pub mod client;

use async_trait::async_trait;
use auth::CredentialProvider;
use client::RemoteClient;
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use taskgraph_core::manifest::ApplicationManifest;
use taskgraph_core::value::{deserialize_value, serialize_value};
use taskgraph_core::{Arg, Awaitable, SerializerName, TaskError, Value};
use tokio::sync::RwLock;

fn status_is_retryable(status: u16) -> bool {
    matches!(status, 502 | 503 | 504)
}

/// Maps a non-2xx scheduler response to the error taxonomy of §7.
fn http_status_error(status: u16, body: String) -> TaskError {
    TaskError::RemoteApiError {
        status,
        message: body,
        retryable: status_is_retryable(status),
    }
}

/// Long-lived remote-runner client: a [`RemoteClient`] plus a manifest cache
/// so repeated calls to the same application don't re-fetch its manifest.
pub struct RemoteRuntime {
    client: RemoteClient,
    manifests: RwLock<std::collections::HashMap<String, ApplicationManifest>>,
}

impl RemoteRuntime {
    /// Build a runtime talking to the default namespace at the resolved base
    /// URL, authenticating with `credentials`.
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            client: RemoteClient::new(credentials),
            manifests: RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Build a runtime over an already-configured client.
    pub fn with_client(client: RemoteClient) -> Self {
        Self {
            client,
            manifests: RwLock::new(std::collections::HashMap::new()),
        }
    }

    async fn manifest(&self, app_name: &str) -> Result<ApplicationManifest, TaskError> {
        if let Some(m) = self.manifests.read().await.get(app_name) {
            return Ok(m.clone());
        }
        let credential = self.client.credential().await?;
        let headers = RemoteClient::auth_headers(&credential);
        let response = self
            .client
            .http
            .get(self.client.application_url(app_name))
            .headers(headers)
            .send()
            .await
            .map_err(|e| TaskError::Other(Box::new(e)))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(http_status_error(status, body));
        }
        let manifest: ApplicationManifest = response
            .json()
            .await
            .map_err(|e| TaskError::SerializationError {
                serializer: "json".to_string(),
                message: e.to_string(),
            })?;
        self.manifests
            .write()
            .await
            .insert(app_name.to_string(), manifest.clone());
        Ok(manifest)
    }

    /// Submit `args`/`kwargs` to `app_name`'s entrypoint, wait for
    /// completion, and return the decoded output. Implements the submission
    /// sequence of §4.4: manifest lookup, multipart argument submission, SSE
    /// progress subscription, then a metadata and output fetch.
    pub async fn run(
        &self,
        app_name: &str,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<Value, TaskError> {
        let manifest = self.manifest(app_name).await?;
        let request_id = self.submit(app_name, &manifest, args, kwargs).await?;
        tracing::debug!(app = app_name, request_id, "submitted remote request");
        self.watch_progress(app_name, &request_id).await?;
        self.check_outcome(app_name, &request_id).await?;
        self.fetch_output(app_name, &request_id, &manifest).await
    }

    async fn submit(
        &self,
        app_name: &str,
        manifest: &ApplicationManifest,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<String, TaskError> {
        let serializer = manifest.entrypoint.input_serializer;
        let mut form = reqwest::multipart::Form::new();
        for (arg, entry) in args.iter().zip(manifest.entrypoint.inputs.iter()) {
            form = form.part(entry.arg_name.clone(), encode_part(arg, serializer)?);
        }
        for (name, value) in &kwargs {
            form = form.part(name.clone(), encode_part(value, serializer)?);
        }

        let credential = self.client.credential().await?;
        let headers = RemoteClient::auth_headers(&credential);
        let response = self
            .client
            .http
            .post(self.client.run_url(app_name))
            .headers(headers)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TaskError::Other(Box::new(e)))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(http_status_error(status, body));
        }
        #[derive(Deserialize)]
        struct SubmitResponse {
            request_id: String,
        }
        let parsed: SubmitResponse = response.json().await.map_err(|e| TaskError::SerializationError {
            serializer: "json".to_string(),
            message: e.to_string(),
        })?;
        Ok(parsed.request_id)
    }

    async fn watch_progress(&self, app_name: &str, request_id: &str) -> Result<(), TaskError> {
        let credential = self.client.credential().await?;
        let headers = RemoteClient::auth_headers(&credential);
        let response = self
            .client
            .http
            .get(self.client.progress_url(app_name, request_id))
            .headers(headers)
            .send()
            .await
            .map_err(|e| TaskError::Other(Box::new(e)))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(http_status_error(status, body));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TaskError::Other(Box::new(e)))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find("\n\n") {
                let frame = buffer[..pos].to_string();
                buffer.drain(..pos + 2);
                if frame_is_request_finished(&frame) {
                    tracing::debug!(app = app_name, request_id, "request finished");
                    return Ok(());
                }
            }
        }
        Err(TaskError::Internal(
            "progress stream ended without a RequestFinished event".to_string(),
        ))
    }

    async fn check_outcome(&self, app_name: &str, request_id: &str) -> Result<(), TaskError> {
        let credential = self.client.credential().await?;
        let headers = RemoteClient::auth_headers(&credential);
        let response = self
            .client
            .http
            .get(self.client.metadata_url(app_name, request_id))
            .headers(headers)
            .send()
            .await
            .map_err(|e| TaskError::Other(Box::new(e)))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(http_status_error(status, body));
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "lowercase")]
        enum Outcome {
            Pending,
            Failure { message: String },
            Success,
        }
        #[derive(Deserialize)]
        struct Metadata {
            outcome: Outcome,
        }
        let metadata: Metadata = response.json().await.map_err(|e| TaskError::SerializationError {
            serializer: "json".to_string(),
            message: e.to_string(),
        })?;
        match metadata.outcome {
            Outcome::Success => Ok(()),
            Outcome::Failure { message } => Err(TaskError::RequestError(message)),
            Outcome::Pending => Err(TaskError::RequestNotFinished),
        }
    }

    async fn fetch_output(
        &self,
        app_name: &str,
        request_id: &str,
        manifest: &ApplicationManifest,
    ) -> Result<Value, TaskError> {
        let credential = self.client.credential().await?;
        let headers = RemoteClient::auth_headers(&credential);
        let response = self
            .client
            .http
            .get(self.client.output_url(app_name, request_id))
            .headers(headers)
            .send()
            .await
            .map_err(|e| TaskError::Other(Box::new(e)))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(http_status_error(status, body));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let serializer = manifest.entrypoint.output_serializer;
        let bytes = response.bytes().await.map_err(|e| TaskError::Other(Box::new(e)))?;
        // A content type matching neither declared serializer marks a file
        // value that bypassed the named serializer on the way out (§4.2).
        let class_hint = if content_type == serializer.content_type() {
            "value"
        } else {
            "file"
        };
        deserialize_value(&bytes, &content_type, class_hint, serializer)
    }
}

fn encode_part(value: &Value, serializer: SerializerName) -> Result<reqwest::multipart::Part, TaskError> {
    let bytes = serialize_value(value, serializer)?;
    let content_type = match value {
        Value::File { content_type, .. } => content_type.clone(),
        Value::Data(_) => serializer.content_type().to_string(),
    };
    reqwest::multipart::Part::bytes(bytes)
        .mime_str(&content_type)
        .map_err(|e| TaskError::SerializationError {
            serializer: serializer.as_str().to_string(),
            message: e.to_string(),
        })
}

fn frame_is_request_finished(frame: &str) -> bool {
    frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .any(|data| data.contains("RequestFinished"))
}

/// Binds a [`RemoteRuntime`] into the three [`taskgraph_hooks::RuntimeHooks`]
/// slots. The remote runner only knows how to submit a whole application
/// entrypoint; an [`Awaitable::List`] or [`Awaitable::Reduce`] passed to
/// `start` is a usage error here, since reducer lowering and list-gather
/// happen inside the scheduler's own execution of the graph, not in this
/// process.
pub struct RemoteHooks {
    runtime: Arc<RemoteRuntime>,
}

impl RemoteHooks {
    /// Wrap a runtime so it can be bound into [`taskgraph_hooks::RuntimeHooks`].
    pub fn new(runtime: Arc<RemoteRuntime>) -> Self {
        Self { runtime }
    }

    async fn run_one(&self, awaitable: Awaitable) -> Result<(taskgraph_core::FutureId, Value), TaskError> {
        match awaitable {
            Awaitable::FunctionCall {
                id,
                function_name,
                args,
                kwargs,
                ..
            } => {
                let args = args
                    .into_iter()
                    .map(|a| match a {
                        Arg::Value(v) => Ok(v),
                        Arg::Ref(_) => Err(TaskError::UsageError(
                            "the remote runner cannot submit a future-dependency edge directly; \
                             the scheduler resolves nested calls itself"
                                .to_string(),
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let mut kw = BTreeMap::new();
                for (k, v) in kwargs {
                    match v {
                        Arg::Value(v) => {
                            kw.insert(k, v);
                        }
                        Arg::Ref(_) => {
                            return Err(TaskError::UsageError(
                                "the remote runner cannot submit a future-dependency edge directly"
                                    .to_string(),
                            ))
                        }
                    }
                }
                let value = self.runtime.run(&function_name, args, kw).await?;
                Ok((id, value))
            }
            Awaitable::List(_) => Err(TaskError::UsageError(
                "an AwaitableList cannot be submitted to the remote runner directly".to_string(),
            )),
            Awaitable::Reduce { .. } => Err(TaskError::UsageError(
                "reducer lowering is not supported by the remote runner in this process".to_string(),
            )),
        }
    }
}

#[async_trait]
impl taskgraph_hooks::StartFunctionCalls for RemoteHooks {
    async fn start(&self, awaitables: Vec<Awaitable>) -> Result<Vec<taskgraph_core::Future>, TaskError> {
        let mut out = Vec::with_capacity(awaitables.len());
        for awaitable in awaitables {
            let future = taskgraph_core::Future::pending(
                awaitable
                    .id()
                    .cloned()
                    .ok_or_else(|| TaskError::UsageError("awaitable has no id".to_string()))?,
            );
            match self.run_one(awaitable).await {
                Ok((_, value)) => future.resolve(value).await,
                Err(e) => future.fail(e).await,
            }
            out.push(future);
        }
        Ok(out)
    }
}

#[async_trait]
impl taskgraph_hooks::StartAndWaitFunctionCalls for RemoteHooks {
    async fn start_and_wait(
        &self,
        awaitables: Vec<Awaitable>,
    ) -> Result<Vec<Result<Value, TaskError>>, TaskError> {
        let mut out = Vec::with_capacity(awaitables.len());
        for awaitable in awaitables {
            out.push(self.run_one(awaitable).await.map(|(_, v)| v));
        }
        Ok(out)
    }
}

#[async_trait]
impl taskgraph_hooks::WaitFutures for RemoteHooks {
    async fn wait(
        &self,
        futures: &[taskgraph_core::Future],
        timeout: Option<std::time::Duration>,
        mode: taskgraph_core::WaitMode,
    ) -> Result<(Vec<usize>, Vec<usize>), TaskError> {
        Ok(taskgraph_core::wait(futures, timeout, mode).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_the_scheduler_contract() {
        assert!(status_is_retryable(502));
        assert!(status_is_retryable(503));
        assert!(status_is_retryable(504));
        assert!(!status_is_retryable(401));
        assert!(!status_is_retryable(403));
        assert!(!status_is_retryable(404));
    }

    #[test]
    fn frame_detects_request_finished_event() {
        let frame = "event: progress\ndata: {\"type\":\"RequestFinished\",\"request_id\":\"r1\"}";
        assert!(frame_is_request_finished(frame));
    }

    #[test]
    fn frame_ignores_other_events() {
        let frame = "event: progress\ndata: {\"type\":\"FunctionCallStarted\"}";
        assert!(!frame_is_request_finished(frame));
    }
}
