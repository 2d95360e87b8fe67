//! # taskgraph-core — the awaitable/future runtime data model
//!
//! This crate is the core of a durable, distributed function-graph
//! execution system: the data model of computations (function calls, list
//! gathers, reduce chains) and their user-visible handles.
//!
//! ## What lives here
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`awaitable`] | Immutable descriptions of computation, future-id addressed. |
//! | [`future`] | The user-visible handle on work in progress. |
//! | [`value`] | Named serializers (JSON, self-describing binary) and the value type. |
//! | [`retry`] | Retry policy as carried on the wire. |
//! | [`context`] | Per-request state/progress/metrics, scoped to one dispatch. |
//! | [`manifest`] | Wire shapes describing an application to a scheduler. |
//! | [`error`] | The error taxonomy threaded through every runner. |
//!
//! What does *not* live here: the scheduler that drives awaitables to
//! completion (`taskgraph-local`), the HTTP client that submits them to a
//! remote scheduler (`taskgraph-remote`), and the function/class registry
//! (`taskgraph-registry`). This crate only defines the shapes those depend
//! on, so the same shapes can be driven by either runner.

#![deny(missing_docs)]

pub mod awaitable;
pub mod context;
pub mod duration;
pub mod error;
pub mod id;
pub mod manifest;
pub mod retry;
pub mod value;

pub mod future;

pub use awaitable::{Arg, Awaitable};
pub use duration::DurationMs;
pub use error::TaskError;
pub use future::{wait, Future, WaitMode};
pub use id::{FutureId, IdGenerator, NodeId, RequestId};
pub use retry::Retries;
pub use value::{SerializerName, Value};
