#![deny(missing_docs)]
//! # taskgraph — umbrella crate
//!
//! A single import surface for building on durable, distributed
//! function-graph execution: submit a function call as an awaitable, let a
//! runner (in-process or remote) drive its dependency graph to completion,
//! and read back the result. Re-exports the pieces behind feature flags, plus
//! a `prelude` for the common path of registering functions and running them
//! locally.

#[cfg(feature = "hooks")]
pub use taskgraph_hooks;
#[cfg(feature = "local")]
pub use taskgraph_local;
#[cfg(feature = "registry")]
pub use taskgraph_registry;
#[cfg(feature = "remote")]
pub use taskgraph_remote;
#[cfg(feature = "state")]
pub use taskgraph_state;

pub use taskgraph_core;

/// Happy-path imports for registering functions and running a request
/// locally.
pub mod prelude {
    pub use taskgraph_core::{
        Arg, Awaitable, DurationMs, Future, FutureId, IdGenerator, NodeId, Retries, RequestId,
        SerializerName, TaskError, Value, WaitMode,
    };

    #[cfg(feature = "registry")]
    pub use taskgraph_registry::{
        ApplicationDescriptor, ClassDescriptor, FunctionDescriptor, Registry, RegistryError,
        Resources, Severity, ValidationIssue,
    };

    #[cfg(feature = "hooks")]
    pub use taskgraph_hooks::{RuntimeHooks, StartAndWaitFunctionCalls, StartFunctionCalls, WaitFutures};

    #[cfg(feature = "local")]
    pub use taskgraph_local::{FunctionBody, LocalHooks, LocalRunner, LocalRuntime, Outcome};

    #[cfg(feature = "remote")]
    pub use taskgraph_remote::{RemoteHooks, RemoteRuntime};

    #[cfg(feature = "state")]
    pub use taskgraph_state::{ConsoleProgress, InMemoryMetrics, MemoryState};
}
