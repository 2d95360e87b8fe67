use async_trait::async_trait;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskgraph::prelude::*;
use taskgraph_local::{FunctionBody, LocalRuntime, Outcome};

async fn run(runtime: &Arc<LocalRuntime>, root: Awaitable) -> Result<Value, TaskError> {
    runtime
        .run(
            root,
            RequestId::new("req"),
            Arc::new(MemoryState::new()),
            Arc::new(ConsoleProgress),
            Arc::new(InMemoryMetrics::new()),
        )
        .await
}

fn registered(name: &str) -> FunctionDescriptor {
    FunctionDescriptor::new(name, "tests/run_to_completion.rs")
}

struct Add;
#[async_trait]
impl FunctionBody for Add {
    async fn call(
        &self,
        _instance: Option<Arc<dyn Any + Send + Sync>>,
        args: Vec<Value>,
        _kwargs: BTreeMap<String, Value>,
        _hooks: &RuntimeHooks,
    ) -> Result<Outcome, TaskError> {
        let (Value::Data(a), Value::Data(b)) = (args[0].clone(), args[1].clone()) else {
            return Err(TaskError::FunctionError("expected data values".to_string()));
        };
        Ok(Outcome::Value(Value::Data(serde_json::json!(
            a.as_i64().unwrap() + b.as_i64().unwrap()
        ))))
    }
}

#[tokio::test]
async fn reduce_over_four_leaves_matches_depth_first_addition() {
    let registry = Arc::new(Registry::new());
    registry.register_function(registered("add")).unwrap();
    let runtime = Arc::new(LocalRuntime::new(registry));
    runtime.register_body("add", Arc::new(Add)).await;

    let root = Awaitable::reduce(
        FutureId::new("root"),
        "add",
        vec![Arg::value(1), Arg::value(2), Arg::value(3), Arg::value(4)],
    );
    let result = run(&runtime, root).await.unwrap();
    assert_eq!(result, Value::Data(serde_json::json!(10)));
}

struct Tripler;
#[async_trait]
impl FunctionBody for Tripler {
    async fn call(
        &self,
        _instance: Option<Arc<dyn Any + Send + Sync>>,
        args: Vec<Value>,
        _kwargs: BTreeMap<String, Value>,
        hooks: &RuntimeHooks,
    ) -> Result<Outcome, TaskError> {
        let Value::Data(n) = &args[0] else {
            return Err(TaskError::FunctionError("expected a number".to_string()));
        };
        let doubled = Awaitable::call(
            FutureId::new("doubled"),
            "add",
            vec![Arg::value(n.clone()), Arg::value(n.clone())],
        );
        // A function body submitting a second request-local awaitable goes
        // through the bound hooks the same way any SDK caller would.
        let futures = hooks.start_function_calls(vec![doubled]).await?;
        let Value::Data(doubled) = futures[0].result(None).await? else {
            return Err(TaskError::FunctionError("expected a number".to_string()));
        };
        Ok(Outcome::Value(Value::Data(serde_json::json!(
            doubled.as_i64().unwrap() + n.as_i64().unwrap()
        ))))
    }
}

#[tokio::test]
async fn function_body_can_submit_nested_work_through_hooks() {
    let registry = Arc::new(Registry::new());
    registry.register_function(registered("add")).unwrap();
    registry.register_function(registered("tripler")).unwrap();
    let runtime = Arc::new(LocalRuntime::new(registry));
    runtime.register_body("add", Arc::new(Add)).await;
    runtime.register_body("tripler", Arc::new(Tripler)).await;

    let root = Awaitable::call(FutureId::new("root"), "tripler", vec![Arg::value(5)]);
    let result = run(&runtime, root).await.unwrap();
    assert_eq!(result, Value::Data(serde_json::json!(15)));
}

struct FailFast;
#[async_trait]
impl FunctionBody for FailFast {
    async fn call(
        &self,
        _instance: Option<Arc<dyn Any + Send + Sync>>,
        _args: Vec<Value>,
        _kwargs: BTreeMap<String, Value>,
        _hooks: &RuntimeHooks,
    ) -> Result<Outcome, TaskError> {
        Err(TaskError::RequestError("sibling failed".to_string()))
    }
}

struct SlowOk;
#[async_trait]
impl FunctionBody for SlowOk {
    async fn call(
        &self,
        _instance: Option<Arc<dyn Any + Send + Sync>>,
        _args: Vec<Value>,
        _kwargs: BTreeMap<String, Value>,
        _hooks: &RuntimeHooks,
    ) -> Result<Outcome, TaskError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(Outcome::Value(Value::Data(serde_json::json!("done"))))
    }
}

struct Orchestrate;
#[async_trait]
impl FunctionBody for Orchestrate {
    async fn call(
        &self,
        _instance: Option<Arc<dyn Any + Send + Sync>>,
        _args: Vec<Value>,
        _kwargs: BTreeMap<String, Value>,
        hooks: &RuntimeHooks,
    ) -> Result<Outcome, TaskError> {
        let siblings = hooks
            .start_function_calls(vec![
                Awaitable::call(FutureId::new("fail_fast_1"), "fail_fast", vec![]),
                Awaitable::call(FutureId::new("slow_ok_1"), "slow_ok", vec![]),
            ])
            .await?;
        let (done, _not_done) = hooks
            .wait_futures(&siblings, None, WaitMode::FirstFailure)
            .await?;
        for idx in done {
            if siblings[idx].failed().await {
                return Err(TaskError::RequestError("sibling failed".to_string()));
            }
        }
        Ok(Outcome::Value(Value::Data(serde_json::json!("unexpected success"))))
    }
}

#[tokio::test]
async fn first_failure_does_not_wait_for_a_slow_sibling() {
    let registry = Arc::new(Registry::new());
    registry.register_function(registered("fail_fast")).unwrap();
    registry.register_function(registered("slow_ok")).unwrap();
    registry.register_function(registered("orchestrate")).unwrap();
    let runtime = Arc::new(LocalRuntime::new(registry));
    runtime.register_body("fail_fast", Arc::new(FailFast)).await;
    runtime.register_body("slow_ok", Arc::new(SlowOk)).await;
    runtime.register_body("orchestrate", Arc::new(Orchestrate)).await;

    let root = Awaitable::call(FutureId::new("root"), "orchestrate", vec![]);
    let started = tokio::time::Instant::now();
    let err = run(&runtime, root).await.unwrap_err();
    assert!(matches!(err, TaskError::RequestError(m) if m == "sibling failed"));
    assert!(
        started.elapsed() < Duration::from_millis(350),
        "wait_futures(FirstFailure) should return as soon as fail_fast fails, \
         not after slow_ok's 500ms sleep"
    );
}

struct Flaky(Arc<AtomicU32>);
#[async_trait]
impl FunctionBody for Flaky {
    async fn call(
        &self,
        _instance: Option<Arc<dyn Any + Send + Sync>>,
        _args: Vec<Value>,
        _kwargs: BTreeMap<String, Value>,
        _hooks: &RuntimeHooks,
    ) -> Result<Outcome, TaskError> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
            Err(TaskError::FunctionError("still warming up".to_string()))
        } else {
            Ok(Outcome::Value(Value::Data(serde_json::json!("warm"))))
        }
    }
}

#[tokio::test]
async fn exceeding_the_retry_budget_surfaces_a_function_error() {
    let registry = Arc::new(Registry::new());
    registry
        .register_function(registered("flaky").with_retries(Retries::with_max_retries(1)))
        .unwrap();
    let runtime = Arc::new(LocalRuntime::new(registry));
    runtime
        .register_body("flaky", Arc::new(Flaky(Arc::new(AtomicU32::new(0)))))
        .await;

    let root = Awaitable::call(FutureId::new("root"), "flaky", vec![]);
    let err = run(&runtime, root).await.unwrap_err();
    assert!(matches!(err, TaskError::FunctionError(_)));
}

#[tokio::test]
async fn idempotent_function_reregistration_from_the_same_source() {
    let registry = Arc::new(Registry::new());
    let descriptor = registered("add");
    registry.register_function(descriptor.clone()).unwrap();
    registry.register_function(descriptor).unwrap();
    assert_eq!(registry.functions().len(), 1);
}
