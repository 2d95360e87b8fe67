#![deny(missing_docs)]
//! In-memory backing stores for request context (§4.6): the local runner's
//! per-key state, a console progress sink, and an in-memory metrics
//! recorder. A remote, in-worker-process runner would back the same traits
//! with a loopback HTTP client instead; the traits in
//! `taskgraph_core::context` are what makes that swap invisible to user
//! code.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use taskgraph_core::context::{MetricsRecorder, ProgressReporter, RequestState};
use taskgraph_core::{TaskError, Value};
use tokio::sync::RwLock;

/// In-memory key/value store, scoped to one request by virtue of one
/// instance existing per request (the local runner constructs a fresh
/// `MemoryState` per request rather than sharing one across requests).
pub struct MemoryState {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryState {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestState for MemoryState {
    async fn get(&self, key: &str) -> Result<Option<Value>, TaskError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), TaskError> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Progress sink that logs through `tracing`, the local runner's default.
#[derive(Default)]
pub struct ConsoleProgress;

impl ProgressReporter for ConsoleProgress {
    fn report(&self, message: &str) {
        tracing::info!(target: "taskgraph::progress", "{message}");
    }
}

/// Metrics recorder that accumulates the latest value per metric name
/// in-memory; sufficient for local runs and tests, where there is no
/// external metrics pipeline to forward to.
#[derive(Default)]
pub struct InMemoryMetrics {
    values: Mutex<HashMap<String, f64>>,
}

impl InMemoryMetrics {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last recorded value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.lock().unwrap().get(name).copied()
    }
}

impl MetricsRecorder for InMemoryMetrics {
    fn record(&self, name: &str, value: f64) {
        self.values.lock().unwrap().insert(name.to_string(), value);
    }
}
