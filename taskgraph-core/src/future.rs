//! The future handle: the user-visible side of a running awaitable.

use crate::error::TaskError;
use crate::id::FutureId;
use crate::value::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

/// Lifecycle state of a future: pending until a runner resolves it to either
/// a value or an error. There is no third "running" state exposed to users;
/// the local runner's internal future-run table tracks that separately.
#[derive(Debug, Clone)]
enum State {
    Pending,
    Done(Result<Value, Arc<TaskError>>),
}

/// A handle to a computation in progress, with the same id as the awaitable
/// that produced it. Not copyable: identity matters, since the runner keys
/// its tables by this id and other futures may reference it as a
/// data-dependency edge.
#[derive(Debug, Clone)]
pub struct Future {
    id: FutureId,
    state: Arc<RwLock<State>>,
    notify: Arc<Notify>,
}

impl Future {
    /// Create a new pending future with the given id. Runners call this at
    /// the moment an awaitable is handed to them (lifecycle: "futures are
    /// created at the boundary where an awaitable is handed to the
    /// runner").
    pub fn pending(id: FutureId) -> Self {
        Self {
            id,
            state: Arc::new(RwLock::new(State::Pending)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// This future's id, shared with the awaitable that created it.
    pub fn id(&self) -> &FutureId {
        &self.id
    }

    /// Resolve this future to a successful value. Called by a runner's
    /// completion-processing step; waking any blocked `result`/`wait`
    /// callers.
    pub async fn resolve(&self, value: Value) {
        let mut state = self.state.write().await;
        *state = State::Done(Ok(value));
        drop(state);
        self.notify.notify_waiters();
    }

    /// Resolve this future to a failure.
    pub async fn fail(&self, error: TaskError) {
        let mut state = self.state.write().await;
        *state = State::Done(Err(Arc::new(error)));
        drop(state);
        self.notify.notify_waiters();
    }

    /// Non-blocking lifecycle query.
    pub async fn done(&self) -> bool {
        !matches!(*self.state.read().await, State::Pending)
    }

    /// True if this future finished with an error.
    pub async fn failed(&self) -> bool {
        matches!(*self.state.read().await, State::Done(Err(_)))
    }

    /// Block until done or `timeout` elapses; re-raise the failure, or yield
    /// the decoded result. A `None` timeout waits indefinitely.
    pub async fn result(&self, timeout: Option<Duration>) -> Result<Value, TaskError> {
        loop {
            if let State::Done(ref r) = *self.state.read().await {
                return r.clone().map_err(|e| e.clone_lossy());
            }
            let notified = self.notify.notified();
            match timeout {
                Some(d) => {
                    if tokio::time::timeout(d, notified).await.is_err() {
                        return Err(TaskError::TimeoutError);
                    }
                }
                None => notified.await,
            }
        }
    }
}

/// Selects when [`wait`] should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Return as soon as any one future completes.
    FirstCompleted,
    /// Return as soon as any one future fails; otherwise behaves like
    /// `AllCompleted`.
    FirstFailure,
    /// Return only once every future has completed.
    AllCompleted,
}

/// Block the caller until `mode`'s predicate is satisfied, returning the
/// completed futures and the still-pending ones, by index into `futures`.
/// `wait([], AllCompleted)` returns `(vec![], vec![])` immediately.
pub async fn wait(
    futures: &[Future],
    timeout: Option<Duration>,
    mode: WaitMode,
) -> (Vec<usize>, Vec<usize>) {
    if futures.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let deadline = timeout.map(|d| tokio::time::Instant::now() + d);
    loop {
        let mut done = Vec::new();
        let mut failed_any = false;
        for (i, f) in futures.iter().enumerate() {
            if f.done().await {
                done.push(i);
                if f.failed().await {
                    failed_any = true;
                }
            }
        }

        let satisfied = match mode {
            WaitMode::FirstCompleted => !done.is_empty(),
            WaitMode::FirstFailure => failed_any || done.len() == futures.len(),
            WaitMode::AllCompleted => done.len() == futures.len(),
        };

        if satisfied {
            let not_done: Vec<usize> = (0..futures.len()).filter(|i| !done.contains(i)).collect();
            return (done, not_done);
        }

        if let Some(dl) = deadline {
            if tokio::time::Instant::now() >= dl {
                let not_done: Vec<usize> =
                    (0..futures.len()).filter(|i| !done.contains(i)).collect();
                return (done, not_done);
            }
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn result_returns_resolved_value() {
        let f = Future::pending(FutureId::new("f0"));
        f.resolve(Value::Data(serde_json::json!(42))).await;
        let v = f.result(None).await.unwrap();
        assert_eq!(v, Value::Data(serde_json::json!(42)));
    }

    #[tokio::test]
    async fn result_times_out_on_pending_future() {
        let f = Future::pending(FutureId::new("f0"));
        let err = f.result(Some(Duration::from_millis(0))).await.unwrap_err();
        assert!(matches!(err, TaskError::TimeoutError));
        assert!(!f.done().await);
    }

    #[tokio::test]
    async fn wait_on_empty_list_returns_immediately() {
        let (done, not_done) = wait(&[], None, WaitMode::AllCompleted).await;
        assert!(done.is_empty());
        assert!(not_done.is_empty());
    }

    #[tokio::test]
    async fn wait_all_completed_waits_for_every_future() {
        let a = Future::pending(FutureId::new("a"));
        let b = Future::pending(FutureId::new("b"));
        a.resolve(Value::Data(serde_json::json!(1))).await;
        let fa = a.clone();
        let fb = b.clone();
        let fb_spawn = fb.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            fb_spawn.resolve(Value::Data(serde_json::json!(2))).await;
        });
        let (done, not_done) = wait(&[fa.clone(), fb.clone()], None, WaitMode::AllCompleted).await;
        assert_eq!(done.len(), 2);
        assert!(not_done.is_empty());
    }
}
