//! Request context: state, progress, and metrics scoped to one in-process
//! function execution, bound only for the duration of that dispatch.

use crate::error::TaskError;
use crate::id::RequestId;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;

/// Per-key state backing a request context. Implementations: an in-memory
/// map for the local runner, a loopback HTTP client for an in-worker-process
/// remote runner (§4.6). Values are serialized with the self-describing
/// binary encoding to keep local and remote semantics identical.
#[async_trait]
pub trait RequestState: Send + Sync {
    /// Read a value by key.
    async fn get(&self, key: &str) -> Result<Option<Value>, TaskError>;
    /// Write a value. Creates or overwrites.
    async fn set(&self, key: &str, value: Value) -> Result<(), TaskError>;
}

/// Reports human-readable progress for a request.
pub trait ProgressReporter: Send + Sync {
    /// Record a progress message.
    fn report(&self, message: &str);
}

/// Records request-scoped numeric metrics.
pub trait MetricsRecorder: Send + Sync {
    /// Record a named metric value.
    fn record(&self, name: &str, value: f64);
}

/// The bundle bound to a worker thread for the duration of one function
/// dispatch.
#[derive(Clone)]
pub struct RequestContext {
    request_id: RequestId,
    state: Arc<dyn RequestState>,
    progress: Arc<dyn ProgressReporter>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl RequestContext {
    /// Construct a context from its parts.
    pub fn new(
        request_id: RequestId,
        state: Arc<dyn RequestState>,
        progress: Arc<dyn ProgressReporter>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            request_id,
            state,
            progress,
            metrics,
        }
    }

    /// The id of the request this context belongs to.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// The per-key state store.
    pub fn state(&self) -> &Arc<dyn RequestState> {
        &self.state
    }

    /// The progress reporter.
    pub fn progress(&self) -> &Arc<dyn ProgressReporter> {
        &self.progress
    }

    /// The metrics recorder.
    pub fn metrics(&self) -> &Arc<dyn MetricsRecorder> {
        &self.metrics
    }
}

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Run `f` with `ctx` bound as the current request context for the duration
/// of the future it returns. Models the worker-thread binding in the
/// original system, where a thread-local is attached only around one
/// function dispatch.
pub async fn scope<F, T>(ctx: RequestContext, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CURRENT.scope(ctx, f).await
}

/// Fetch the request context bound to the current task. Returns a usage
/// error, not a panic, when called outside a bound scope — the explicit
/// "not accessible from user-spawned threads" rule in §4.6 and §3.
pub fn current() -> Result<RequestContext, TaskError> {
    CURRENT
        .try_with(|ctx| ctx.clone())
        .map_err(|_| {
            TaskError::UsageError(
                "request context accessed outside a bound function dispatch \
                 (detached threads/tasks do not inherit it)"
                    .to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct NullState;
    #[async_trait]
    impl RequestState for NullState {
        async fn get(&self, _key: &str) -> Result<Option<Value>, TaskError> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: Value) -> Result<(), TaskError> {
            Ok(())
        }
    }

    struct NullProgress;
    impl ProgressReporter for NullProgress {
        fn report(&self, _message: &str) {}
    }

    struct CountingMetrics(AtomicU64);
    impl MetricsRecorder for CountingMetrics {
        fn record(&self, _name: &str, _value: f64) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn current_fails_outside_a_scope() {
        assert!(current().is_err());
    }

    #[tokio::test]
    async fn current_succeeds_inside_a_scope() {
        let ctx = RequestContext::new(
            RequestId::new("r0"),
            Arc::new(NullState),
            Arc::new(NullProgress),
            Arc::new(CountingMetrics(AtomicU64::new(0))),
        );
        let seen = scope(ctx, async {
            current().map(|c| c.request_id().clone())
        })
        .await;
        assert_eq!(seen.unwrap(), RequestId::new("r0"));
    }
}
