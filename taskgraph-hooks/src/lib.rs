#![deny(missing_docs)]
//! Runtime-hook indirection for the awaitable/future SDK surface (§4.5).
//!
//! An awaitable's `run()`, a future's `wait()`, and the SDK's bulk
//! "start and wait" helper don't call a runner directly: they call through
//! three function slots bound once when a runner activates. This is what
//! lets the same user code run under either the local or the remote
//! runner — the SDK surface never knows which one is behind the slot.

use async_trait::async_trait;
use std::sync::OnceLock;
use std::sync::Arc;
use std::time::Duration;
use taskgraph_core::{Awaitable, Future, TaskError, Value, WaitMode};

/// Blocks on a set of futures until `mode`'s predicate is satisfied. Returns
/// a usage error instead of waiting if the active runner has already
/// observed a cancelling failure elsewhere in the request (§4.3.6: every
/// hook call is a cancellation point, not just the top-level dispatch loop).
#[async_trait]
pub trait WaitFutures: Send + Sync {
    /// See [`taskgraph_core::future::wait`].
    async fn wait(
        &self,
        futures: &[Future],
        timeout: Option<Duration>,
        mode: WaitMode,
    ) -> Result<(Vec<usize>, Vec<usize>), TaskError>;
}

/// Hands awaitables to the active runner, returning futures without
/// blocking for their results.
#[async_trait]
pub trait StartFunctionCalls: Send + Sync {
    /// Submit `awaitables` and return one future per awaitable, in order.
    async fn start(&self, awaitables: Vec<Awaitable>) -> Result<Vec<Future>, TaskError>;
}

/// Submits awaitables and blocks until every one resolves, in one hook call.
/// Kept distinct from composing `start` then `wait` because a remote runner
/// can implement this as a single round trip.
#[async_trait]
pub trait StartAndWaitFunctionCalls: Send + Sync {
    /// Submit `awaitables` and return each one's outcome, in order.
    async fn start_and_wait(
        &self,
        awaitables: Vec<Awaitable>,
    ) -> Result<Vec<Result<Value, TaskError>>, TaskError>;
}

/// The three hook slots, each settable exactly once per runner activation.
/// Calling an unset slot is a usage error (`run()` "fails if no runner is
/// bound", §4.1), not a panic.
#[derive(Default)]
pub struct RuntimeHooks {
    wait_futures: OnceLock<Arc<dyn WaitFutures>>,
    start_function_calls: OnceLock<Arc<dyn StartFunctionCalls>>,
    start_and_wait_function_calls: OnceLock<Arc<dyn StartAndWaitFunctionCalls>>,
}

impl RuntimeHooks {
    /// No runner bound yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the `wait_futures` slot. Returns a usage error if already bound.
    pub fn bind_wait_futures(&self, hook: Arc<dyn WaitFutures>) -> Result<(), TaskError> {
        self.wait_futures
            .set(hook)
            .map_err(|_| TaskError::UsageError("wait_futures hook already bound".to_string()))
    }

    /// Bind the `start_function_calls` slot. Returns a usage error if
    /// already bound.
    pub fn bind_start_function_calls(
        &self,
        hook: Arc<dyn StartFunctionCalls>,
    ) -> Result<(), TaskError> {
        self.start_function_calls.set(hook).map_err(|_| {
            TaskError::UsageError("start_function_calls hook already bound".to_string())
        })
    }

    /// Bind the `start_and_wait_function_calls` slot. Returns a usage error
    /// if already bound.
    pub fn bind_start_and_wait_function_calls(
        &self,
        hook: Arc<dyn StartAndWaitFunctionCalls>,
    ) -> Result<(), TaskError> {
        self.start_and_wait_function_calls.set(hook).map_err(|_| {
            TaskError::UsageError(
                "start_and_wait_function_calls hook already bound".to_string(),
            )
        })
    }

    /// True once every slot is bound, i.e. a runner has fully activated.
    pub fn is_bound(&self) -> bool {
        self.wait_futures.get().is_some()
            && self.start_function_calls.get().is_some()
            && self.start_and_wait_function_calls.get().is_some()
    }

    /// Call through to the bound `wait_futures` hook.
    pub async fn wait_futures(
        &self,
        futures: &[Future],
        timeout: Option<Duration>,
        mode: WaitMode,
    ) -> Result<(Vec<usize>, Vec<usize>), TaskError> {
        let hook = self
            .wait_futures
            .get()
            .ok_or_else(|| TaskError::UsageError("no runner is bound".to_string()))?;
        hook.wait(futures, timeout, mode).await
    }

    /// Call through to the bound `start_function_calls` hook.
    pub async fn start_function_calls(
        &self,
        awaitables: Vec<Awaitable>,
    ) -> Result<Vec<Future>, TaskError> {
        let hook = self
            .start_function_calls
            .get()
            .ok_or_else(|| TaskError::UsageError("no runner is bound".to_string()))?;
        hook.start(awaitables).await
    }

    /// Call through to the bound `start_and_wait_function_calls` hook.
    pub async fn start_and_wait_function_calls(
        &self,
        awaitables: Vec<Awaitable>,
    ) -> Result<Vec<Result<Value, TaskError>>, TaskError> {
        let hook = self
            .start_and_wait_function_calls
            .get()
            .ok_or_else(|| TaskError::UsageError("no runner is bound".to_string()))?;
        hook.start_and_wait(awaitables).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskgraph_core::FutureId;

    struct AlwaysEmpty;
    #[async_trait]
    impl WaitFutures for AlwaysEmpty {
        async fn wait(
            &self,
            _futures: &[Future],
            _timeout: Option<Duration>,
            _mode: WaitMode,
        ) -> Result<(Vec<usize>, Vec<usize>), TaskError> {
            Ok((Vec::new(), Vec::new()))
        }
    }

    #[tokio::test]
    async fn unbound_hook_is_a_usage_error() {
        let hooks = RuntimeHooks::new();
        let err = hooks
            .wait_futures(&[], None, WaitMode::AllCompleted)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::UsageError(_)));
    }

    #[tokio::test]
    async fn binding_twice_is_a_usage_error() {
        let hooks = RuntimeHooks::new();
        hooks.bind_wait_futures(Arc::new(AlwaysEmpty)).unwrap();
        let err = hooks.bind_wait_futures(Arc::new(AlwaysEmpty)).unwrap_err();
        assert!(matches!(err, TaskError::UsageError(_)));
    }

    #[tokio::test]
    async fn bound_hook_is_called_through() {
        let hooks = RuntimeHooks::new();
        hooks.bind_wait_futures(Arc::new(AlwaysEmpty)).unwrap();
        let f = Future::pending(FutureId::new("f0"));
        let (done, not_done) = hooks
            .wait_futures(&[f], None, WaitMode::AllCompleted)
            .await
            .unwrap();
        assert!(done.is_empty() && not_done.is_empty());
    }
}
