//! The error taxonomy surfaced to users and threaded through the runners.

use thiserror::Error;

/// All errors a runner, the AST layer, or the registry can produce.
///
/// Names capture intent, not implementation, mirroring the distinction a
/// user needs to make: did my own code fail (`RequestError`/`FunctionError`),
/// did I misuse the SDK (`UsageError`), or did something at a boundary break
/// (`SerializationError`/`RemoteApiError`)?
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TaskError {
    /// Raised by user code with a user-facing message. Never retried;
    /// surfaced to the request handle verbatim.
    #[error("request error: {0}")]
    RequestError(String),

    /// Any non-`RequestError` exception from user code, after retries are
    /// exhausted. The user's underlying error is not forwarded to the
    /// request output, only recorded for local diagnostics.
    #[error("function error: {0}")]
    FunctionError(String),

    /// The SDK was misused: resubmitting a running future, returning an
    /// `AwaitableList`, touching request context from a detached thread,
    /// a failed validation check, etc.
    #[error("usage error: {0}")]
    UsageError(String),

    /// A value could not be encoded or decoded by the named serializer.
    #[error("serialization error ({serializer}): {message}")]
    SerializationError {
        /// Name of the serializer involved (e.g. `"json"`, `"binary"`).
        serializer: String,
        /// What went wrong.
        message: String,
    },

    /// The remote scheduler returned a failure status.
    #[error("remote API error: HTTP {status}: {message}")]
    RemoteApiError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
        /// Whether the caller may retry the same request (502/503/504 or a
        /// transient transport error).
        retryable: bool,
    },

    /// Output was requested before the request finished, in non-blocking
    /// mode.
    #[error("request not finished")]
    RequestNotFinished,

    /// `result(timeout)` or an explicit wait exceeded its deadline.
    #[error("timed out waiting for completion")]
    TimeoutError,

    /// A contract violation within the core itself (not user-caused).
    #[error("internal error: {0}")]
    Internal(String),

    /// Catch-all for errors from below (transport, I/O, third-party crates).
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// True if this error should never be retried by the local runner's
    /// function-call execution loop (only `RequestError` has this property;
    /// everything else either already reflects exhausted retries or is not
    /// a function-body failure at all).
    pub fn is_request_error(&self) -> bool {
        matches!(self, TaskError::RequestError(_))
    }

    /// Best-effort clone, preserving the variant (and thus
    /// [`Self::is_request_error`] and every other match a caller makes on
    /// it). `TaskError` can't derive `Clone` outright because `Other` boxes
    /// a `dyn Error` that isn't `Clone`; that one variant is re-expressed as
    /// `Internal` carrying the same message. Used wherever one stored
    /// failure needs to be delivered to more than one waiter (a future's
    /// `result()`, a tail-called future's output consumer).
    pub fn clone_lossy(&self) -> Self {
        match self {
            TaskError::RequestError(m) => TaskError::RequestError(m.clone()),
            TaskError::FunctionError(m) => TaskError::FunctionError(m.clone()),
            TaskError::UsageError(m) => TaskError::UsageError(m.clone()),
            TaskError::SerializationError { serializer, message } => TaskError::SerializationError {
                serializer: serializer.clone(),
                message: message.clone(),
            },
            TaskError::RemoteApiError {
                status,
                message,
                retryable,
            } => TaskError::RemoteApiError {
                status: *status,
                message: message.clone(),
                retryable: *retryable,
            },
            TaskError::RequestNotFinished => TaskError::RequestNotFinished,
            TaskError::TimeoutError => TaskError::TimeoutError,
            TaskError::Internal(m) => TaskError::Internal(m.clone()),
            TaskError::Other(e) => TaskError::Internal(e.to_string()),
        }
    }
}
