//! The awaitable model: immutable descriptions of computation.

use crate::id::FutureId;
use crate::value::{SerializerName, Value};
use std::collections::BTreeMap;

/// One argument slot: either a user value or a data-dependency edge onto
/// another awaitable's future.
#[derive(Debug, Clone)]
pub enum Arg {
    /// A plain user value, not yet running.
    Value(Value),
    /// A reference to another awaitable by the future id it will carry once
    /// submitted to a runner.
    Ref(FutureId),
}

impl Arg {
    /// Convenience constructor for a JSON-representable value.
    pub fn value(v: impl Into<serde_json::Value>) -> Self {
        Arg::Value(Value::Data(v.into()))
    }

    /// True if this slot carries a data dependency rather than a value.
    pub fn is_ref(&self) -> bool {
        matches!(self, Arg::Ref(_))
    }
}

/// An immutable description of a computation, identified within one request.
///
/// `FunctionCallAwaitable` and `ReduceOperationAwaitable` each carry a
/// [`FutureId`] because a [`crate::future::Future`] is created with the same
/// id the moment the awaitable is handed to a runner (data model invariant:
/// "a future has the same id as its awaitable"). `AwaitableList` never is:
/// per the tail-call-return invariant, a list may only appear as a function
/// argument, never as a function's return value, so it never becomes a
/// future in its own right.
#[derive(Debug, Clone)]
pub enum Awaitable {
    /// Names a function and carries positional and keyword arguments.
    FunctionCall {
        /// Id this awaitable's future will carry.
        id: FutureId,
        /// Registered function name.
        function_name: String,
        /// Positional arguments, in declaration order.
        args: Vec<Arg>,
        /// Keyword arguments. Encoded in sorted key order (AST §4.2).
        kwargs: BTreeMap<String, Arg>,
        /// Non-negative start delay in seconds; zero means "as soon as
        /// runnable".
        start_delay_secs: f64,
    },
    /// An ordered list of items, each a value or an awaitable reference.
    /// May appear as a function argument; never returned from a function.
    List(Vec<Arg>),
    /// A binary function plus a list of one or more inputs, left-folded by
    /// the runner at submission time (§4.3.5).
    Reduce {
        /// Id this awaitable's future will carry, and the id external
        /// observers see resolve once the runner lowers the reduce chain.
        id: FutureId,
        /// Registered binary function name.
        function_name: String,
        /// Inputs in left-to-right fold order. Must be non-empty.
        inputs: Vec<Arg>,
        /// Output serializer override inherited from an enclosing tail call,
        /// if any (invariant 5, serializer inheritance).
        output_serializer_override: Option<SerializerName>,
        /// Start delay inherited the same way a function call's is.
        start_delay_secs: f64,
    },
}

impl Awaitable {
    /// Construct an ordinary function call awaitable with no start delay.
    pub fn call(id: FutureId, function_name: impl Into<String>, args: Vec<Arg>) -> Self {
        Awaitable::FunctionCall {
            id,
            function_name: function_name.into(),
            args,
            kwargs: BTreeMap::new(),
            start_delay_secs: 0.0,
        }
    }

    /// Construct a reduce awaitable. Per reduce well-formedness (invariant
    /// 6), callers supplying a single input with no initial value should
    /// prefer [`Self::reduce_with_initial`] or accept the runner's
    /// single-input collapse at lowering time (§4.3.5).
    pub fn reduce(id: FutureId, function_name: impl Into<String>, inputs: Vec<Arg>) -> Self {
        Awaitable::Reduce {
            id,
            function_name: function_name.into(),
            inputs,
            output_serializer_override: None,
            start_delay_secs: 0.0,
        }
    }

    /// Construct a reduce awaitable with an initial value prepended to the
    /// input list, satisfying well-formedness with as few as one real input.
    pub fn reduce_with_initial(
        id: FutureId,
        function_name: impl Into<String>,
        initial: Value,
        mut inputs: Vec<Arg>,
    ) -> Self {
        inputs.insert(0, Arg::Value(initial));
        Self::reduce(id, function_name, inputs)
    }

    /// The id this awaitable's future will carry, if it has one.
    pub fn id(&self) -> Option<&FutureId> {
        match self {
            Awaitable::FunctionCall { id, .. } | Awaitable::Reduce { id, .. } => Some(id),
            Awaitable::List(_) => None,
        }
    }

    /// Apply a non-negative start delay, in seconds.
    pub fn with_start_delay(mut self, delay_secs: f64) -> Self {
        match &mut self {
            Awaitable::FunctionCall {
                start_delay_secs, ..
            }
            | Awaitable::Reduce {
                start_delay_secs, ..
            } => *start_delay_secs = delay_secs.max(0.0),
            Awaitable::List(_) => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_call_carries_its_future_id() {
        let a = Awaitable::call(FutureId::new("f0"), "add", vec![Arg::value(1), Arg::value(2)]);
        assert_eq!(a.id(), Some(&FutureId::new("f0")));
    }

    #[test]
    fn list_has_no_future_id() {
        let a = Awaitable::List(vec![Arg::value(1), Arg::value(2)]);
        assert_eq!(a.id(), None);
    }
}
