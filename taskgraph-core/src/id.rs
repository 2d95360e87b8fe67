//! Typed ID wrappers for requests, awaitables/futures, and AST nodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Typed IDs are plain strings underneath; the wrapper exists to keep a
/// request id from being passed where a future id is expected, and so on.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to `String`.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(RequestId, "Unique identifier for one invocation of an application.");
typed_id!(
    FutureId,
    "Identifier shared by an awaitable and the future created from it."
);
typed_id!(NodeId, "Identifier of an AST node, scoped to one request.");

/// Monotonic id generator, one per request. Awaitable/future/node ids only
/// need to be unique within a request (invariant 1 in the data model), so a
/// process-local counter seeded per request is sufficient; there is no
/// cross-request uniqueness requirement.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a generator starting at zero.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Produce the next future id, e.g. `"f0"`, `"f1"`, ...
    pub fn next_future_id(&self) -> FutureId {
        FutureId::new(format!("f{}", self.next.fetch_add(1, Ordering::Relaxed)))
    }

    /// Produce the next AST node id, e.g. `"n0"`, `"n1"`, ...
    pub fn next_node_id(&self) -> NodeId {
        NodeId::new(format!("n{}", self.next.fetch_add(1, Ordering::Relaxed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_within_a_generator() {
        let generator = IdGenerator::new();
        let a = generator.next_future_id();
        let b = generator.next_future_id();
        assert_ne!(a, b);
    }

    #[test]
    fn typed_id_display_roundtrips_string() {
        let id = RequestId::new("req-123");
        assert_eq!(id.as_str(), "req-123");
        assert_eq!(id.to_string(), "req-123");
    }
}
