#![deny(missing_docs)]
//! The local runner (§4.3): a dependency-driven scheduler that takes a root
//! function-call awaitable and drives it to completion in-process.
//!
//! [`LocalRuntime`] holds the long-lived, reusable pieces (the function
//! registry, registered function bodies, class constructors). Each call to
//! [`LocalRuntime::run`] builds a fresh [`LocalRunner`]: the blob store,
//! future table, and future-run table are local to one request and are
//! never reused across requests (§5). Building a runner also activates its
//! [`taskgraph_hooks::RuntimeHooks`], so a function body running under it can
//! submit and await further awaitables through the same `hooks` parameter
//! any other SDK caller would use (§4.5).

pub mod instance;

use async_trait::async_trait;
use instance::{ClassConstructor, InstanceCache};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskgraph_core::context::{self, MetricsRecorder, ProgressReporter, RequestContext, RequestState};
use taskgraph_core::value::{deserialize_value, serialize_value};
use taskgraph_core::{Arg, Awaitable, FutureId, IdGenerator, RequestId, SerializerName, TaskError, Value};
use taskgraph_hooks::RuntimeHooks;
use taskgraph_registry::Registry;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;

/// What a function body returns: a plain value, or a tail-call awaitable
/// whose eventual result becomes this call's own result (§4.3.7).
pub enum Outcome {
    /// The call is finished; this is its result.
    Value(Value),
    /// The call's result is whatever this awaitable resolves to.
    TailCall(Awaitable),
}

/// A registered function's executable body.
#[async_trait]
pub trait FunctionBody: Send + Sync {
    /// Run the function once. `instance` is the owning class's singleton,
    /// present only for method-functions. `hooks` is bound to this call's
    /// runner for the duration of the call, letting the body submit and
    /// await further awaitables the same way any SDK caller would (§4.5).
    async fn call(
        &self,
        instance: Option<Arc<dyn Any + Send + Sync>>,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        hooks: &RuntimeHooks,
    ) -> Result<Outcome, TaskError>;
}

/// A stored, encoded result: bytes plus the serializer name, content type,
/// and class hint needed to decode it again (§4.3.1).
#[derive(Debug, Clone)]
struct Blob {
    bytes: Vec<u8>,
    serializer: Option<SerializerName>,
    content_type: String,
    class_hint: String,
}

fn encode_blob(value: &Value, serializer: SerializerName) -> Result<Blob, TaskError> {
    let bytes = serialize_value(value, serializer)?;
    let content_type = match value {
        Value::File { content_type, .. } => content_type.clone(),
        Value::Data(_) => serializer.content_type().to_string(),
    };
    Ok(Blob {
        bytes,
        serializer: matches!(value, Value::Data(_)).then_some(serializer),
        content_type,
        class_hint: value.class_hint().to_string(),
    })
}

fn decode_blob(blob: &Blob) -> Result<Value, TaskError> {
    deserialize_value(
        &blob.bytes,
        &blob.content_type,
        &blob.class_hint,
        blob.serializer.unwrap_or(SerializerName::Json),
    )
}

/// A future as tracked by the local runner: the public handle plus the
/// scheduling bookkeeping described in §4.3.1.
struct LocalFuture {
    public: taskgraph_core::Future,
    function_name: String,
    args: Vec<Arg>,
    kwargs: BTreeMap<String, Arg>,
    start_after: Instant,
    output_consumer: Option<FutureId>,
    effective_output_serializer: SerializerName,
    max_retries: u32,
}

/// One worker's report back to the control loop.
enum Completion {
    Value(FutureId, Value),
    TailCall(FutureId, Awaitable),
    Failed(FutureId, TaskError),
}

/// The long-lived pieces of the local runner: the registry and everything
/// needed to actually execute a registered function.
pub struct LocalRuntime {
    registry: Arc<Registry>,
    bodies: RwLock<HashMap<String, Arc<dyn FunctionBody>>>,
    constructors: RwLock<HashMap<String, Arc<dyn ClassConstructor>>>,
}

impl LocalRuntime {
    /// Build a runtime over an existing registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            bodies: RwLock::new(HashMap::new()),
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// Attach the executable body for a registered function.
    pub async fn register_body(&self, function_name: impl Into<String>, body: Arc<dyn FunctionBody>) {
        self.bodies.write().await.insert(function_name.into(), body);
    }

    /// Attach the constructor for a method-function's owning class.
    pub async fn register_class_constructor(
        &self,
        class_name: impl Into<String>,
        constructor: Arc<dyn ClassConstructor>,
    ) {
        self.constructors
            .write()
            .await
            .insert(class_name.into(), constructor);
    }

    /// Drive `root` to completion and return its decoded output.
    pub async fn run(
        self: &Arc<Self>,
        root: Awaitable,
        request_id: RequestId,
        state: Arc<dyn RequestState>,
        progress: Arc<dyn ProgressReporter>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<Value, TaskError> {
        let runner = LocalRunner::new(self.clone(), request_id, state, progress, metrics);
        runner.run_to_completion(root).await
    }
}

/// One request's worth of scheduler state: blob store, future table,
/// future-run table, and the request-level exception slot (§4.3.1). Never
/// reused across requests.
pub struct LocalRunner {
    runtime: Arc<LocalRuntime>,
    request_id: RequestId,
    blobs: RwLock<HashMap<FutureId, Blob>>,
    futures: RwLock<HashMap<FutureId, LocalFuture>>,
    running: RwLock<HashSet<FutureId>>,
    instance_cache: InstanceCache,
    request_exception: RwLock<Option<TaskError>>,
    id_gen: IdGenerator,
    hooks: Arc<RuntimeHooks>,
    state: Arc<dyn RequestState>,
    progress: Arc<dyn ProgressReporter>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl LocalRunner {
    /// Build a runner and activate its runtime hooks: the three slots a
    /// function body's nested SDK calls dispatch through are bound to this
    /// runner before it ever runs a future (§4.5 "settable exactly once per
    /// runner activation").
    fn new(
        runtime: Arc<LocalRuntime>,
        request_id: RequestId,
        state: Arc<dyn RequestState>,
        progress: Arc<dyn ProgressReporter>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Arc<Self> {
        let runner = Arc::new(Self {
            runtime,
            request_id,
            blobs: RwLock::new(HashMap::new()),
            futures: RwLock::new(HashMap::new()),
            running: RwLock::new(HashSet::new()),
            instance_cache: InstanceCache::new(),
            request_exception: RwLock::new(None),
            id_gen: IdGenerator::new(),
            hooks: Arc::new(RuntimeHooks::new()),
            state,
            progress,
            metrics,
        });
        let local_hooks = LocalHooks::new(runner.clone());
        runner
            .hooks
            .bind_wait_futures(Arc::new(local_hooks.clone()))
            .expect("hooks freshly constructed, first bind cannot fail");
        runner
            .hooks
            .bind_start_function_calls(Arc::new(local_hooks.clone()))
            .expect("hooks freshly constructed, first bind cannot fail");
        runner
            .hooks
            .bind_start_and_wait_function_calls(Arc::new(local_hooks))
            .expect("hooks freshly constructed, first bind cannot fail");
        runner
    }

    /// Submit a function-call or reduce awaitable, registering a pending
    /// future for it. A `List` cannot be submitted directly (data model:
    /// "never as a function's return value"). Resubmitting an id already
    /// known to the future table is a usage error (acyclicity, §3 invariant
    /// 3; boundary property in §8).
    async fn submit(
        self: &Arc<Self>,
        awaitable: Awaitable,
        forced_output_serializer: Option<SerializerName>,
    ) -> Result<taskgraph_core::Future, TaskError> {
        match awaitable {
            Awaitable::List(_) => Err(TaskError::UsageError(
                "an AwaitableList cannot be submitted directly".to_string(),
            )),
            Awaitable::FunctionCall {
                id,
                function_name,
                args,
                kwargs,
                start_delay_secs,
            } => {
                if self.futures.read().await.contains_key(&id) {
                    return Err(TaskError::UsageError(format!(
                        "future {id} is already known to this runner"
                    )));
                }
                let descriptor = self.runtime.registry.function(&function_name).map_err(|e| {
                    TaskError::UsageError(format!("unregistered function {function_name:?}: {e}"))
                })?;
                let effective_serializer = forced_output_serializer.unwrap_or(descriptor.output_serializer);
                let public = taskgraph_core::Future::pending(id.clone());
                self.futures.write().await.insert(
                    id.clone(),
                    LocalFuture {
                        public: public.clone(),
                        function_name,
                        args,
                        kwargs,
                        start_after: Instant::now() + Duration::from_secs_f64(start_delay_secs.max(0.0)),
                        output_consumer: None,
                        effective_output_serializer: effective_serializer,
                        max_retries: descriptor.retries.max_retries,
                    },
                );
                Ok(public)
            }
            Awaitable::Reduce {
                id,
                function_name,
                inputs,
                output_serializer_override,
                start_delay_secs,
            } => {
                self.lower_reduce(
                    id,
                    function_name,
                    inputs,
                    forced_output_serializer.or(output_serializer_override),
                    start_delay_secs,
                )
                .await
            }
        }
    }

    /// Reducer lowering (§4.3.5): a single input short-circuits to that
    /// input's own result; otherwise the reduce expands into a
    /// left-associated chain of binary calls, with the last call's id
    /// rewritten to the reducer's id so external observers see the
    /// reducer's promised id resolve.
    async fn lower_reduce(
        self: &Arc<Self>,
        id: FutureId,
        function_name: String,
        inputs: Vec<Arg>,
        output_serializer_override: Option<SerializerName>,
        start_delay_secs: f64,
    ) -> Result<taskgraph_core::Future, TaskError> {
        if inputs.is_empty() {
            return Err(TaskError::UsageError(
                "a reduce must have at least one input".to_string(),
            ));
        }
        if inputs.len() == 1 {
            // Single-input reduce collapses to the identity of that input.
            let only = Awaitable::FunctionCall {
                id,
                function_name: "identity".to_string(),
                args: inputs,
                kwargs: BTreeMap::new(),
                start_delay_secs,
            };
            return Box::pin(self.submit(only, output_serializer_override)).await;
        }

        let mut acc = inputs[0].clone();
        let n = inputs.len();
        for (i, input) in inputs.into_iter().enumerate().skip(1) {
            let call_id = if i == n - 1 {
                id.clone()
            } else {
                self.id_gen.next_future_id()
            };
            let call = Awaitable::FunctionCall {
                id: call_id.clone(),
                function_name: function_name.clone(),
                args: vec![acc, input],
                kwargs: BTreeMap::new(),
                start_delay_secs,
            };
            let future = Box::pin(self.submit(call, output_serializer_override)).await?;
            acc = Arg::Ref(future.id().clone());
        }
        // acc now holds Arg::Ref(id), whose future we already registered
        // with the reducer's own id.
        self.futures
            .read()
            .await
            .get(&id)
            .map(|lf| lf.public.clone())
            .ok_or_else(|| TaskError::Internal("reduce lowering lost its own future".to_string()))
    }

    async fn is_runnable(&self, id: &FutureId, lf: &LocalFuture) -> bool {
        if Instant::now() < lf.start_after {
            return false;
        }
        let blobs = self.blobs.read().await;
        let deps_ready = lf
            .args
            .iter()
            .chain(lf.kwargs.values())
            .all(|arg| match arg {
                Arg::Value(_) => true,
                Arg::Ref(fid) => blobs.contains_key(fid),
            });
        if !deps_ready {
            return false;
        }
        !self.running.read().await.contains(id)
    }

    /// Scan for runnable futures and spawn a worker for each. Returns how
    /// many were started.
    async fn scan_and_start(self: &Arc<Self>, tx: &mpsc::UnboundedSender<Completion>) -> usize {
        let candidates: Vec<FutureId> = {
            let futures = self.futures.read().await;
            let blobs = self.blobs.read().await;
            let running = self.running.read().await;
            futures
                .iter()
                .filter(|(id, lf)| {
                    !blobs.contains_key(*id)
                        && !running.contains(*id)
                        && Instant::now() >= lf.start_after
                        && lf.args.iter().chain(lf.kwargs.values()).all(|a| match a {
                            Arg::Value(_) => true,
                            Arg::Ref(fid) => blobs.contains_key(fid),
                        })
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in &candidates {
            self.running.write().await.insert(id.clone());
        }
        for id in candidates.iter().cloned() {
            let this = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                this.execute(id, tx).await;
            });
        }
        candidates.len()
    }

    async fn execute(self: Arc<Self>, id: FutureId, tx: mpsc::UnboundedSender<Completion>) {
        let (function_name, args, kwargs, max_retries) = {
            let futures = self.futures.read().await;
            let lf = futures.get(&id).expect("scheduled future must be registered");
            (
                lf.function_name.clone(),
                lf.args.clone(),
                lf.kwargs.clone(),
                lf.max_retries,
            )
        };

        let result = self
            .run_with_retries(&id, &function_name, args, kwargs, max_retries)
            .await;

        self.running.write().await.remove(&id);
        let completion = match result {
            Ok(Outcome::Value(v)) => Completion::Value(id, v),
            Ok(Outcome::TailCall(a)) => Completion::TailCall(id, a),
            Err(e) => Completion::Failed(id, e),
        };
        let _ = tx.send(completion);
    }

    async fn run_with_retries(
        &self,
        id: &FutureId,
        function_name: &str,
        args: Vec<Arg>,
        kwargs: BTreeMap<String, Arg>,
        max_retries: u32,
    ) -> Result<Outcome, TaskError> {
        let mut attempt = 0u32;
        loop {
            if let Some(stop) = self.check_cancellation().await {
                return Err(stop);
            }

            let resolved_args = self.resolve_args(&args).await?;
            let mut resolved_kwargs = BTreeMap::new();
            for (k, v) in &kwargs {
                resolved_kwargs.insert(k.clone(), self.resolve_arg(v).await?);
            }

            let descriptor = self
                .runtime
                .registry
                .function(function_name)
                .map_err(|e| TaskError::UsageError(e.to_string()))?;
            let instance = match &descriptor.class_name {
                Some(class_name) => {
                    let constructors = self.runtime.constructors.read().await;
                    let ctor = constructors.get(class_name).ok_or_else(|| {
                        TaskError::UsageError(format!("no constructor registered for class {class_name:?}"))
                    })?;
                    Some(self.instance_cache.get_or_construct(class_name, ctor.as_ref()).await?)
                }
                None => None,
            };

            let body = {
                let bodies = self.runtime.bodies.read().await;
                bodies.get(function_name).cloned()
            }
            .ok_or_else(|| TaskError::UsageError(format!("no body registered for function {function_name:?}")))?;

            let ctx = RequestContext::new(
                self.request_id.clone(),
                self.state.clone(),
                self.progress.clone(),
                self.metrics.clone(),
            );

            let outcome = context::scope(
                ctx,
                body.call(instance, resolved_args, resolved_kwargs, &self.hooks),
            )
            .await;

            match outcome {
                Ok(out) => return Ok(out),
                Err(e) if e.is_request_error() => return Err(e),
                Err(e) => {
                    if attempt >= max_retries {
                        return Err(TaskError::FunctionError(e.to_string()));
                    }
                    attempt += 1;
                    tracing::debug!(future = %id, attempt, "retrying after non-request error: {e}");
                }
            }
        }
    }

    async fn check_cancellation(&self) -> Option<TaskError> {
        self.request_exception
            .read()
            .await
            .as_ref()
            .map(|_| TaskError::FunctionError("stop signal: a sibling call already failed".to_string()))
    }

    async fn resolve_args(&self, args: &[Arg]) -> Result<Vec<Value>, TaskError> {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            out.push(self.resolve_arg(a).await?);
        }
        Ok(out)
    }

    async fn resolve_arg(&self, arg: &Arg) -> Result<Value, TaskError> {
        match arg {
            Arg::Value(v) => Ok(v.clone()),
            Arg::Ref(fid) => {
                let blob = self
                    .blobs
                    .read()
                    .await
                    .get(fid)
                    .cloned()
                    .ok_or_else(|| TaskError::Internal(format!("argument future {fid} has no blob yet")))?;
                decode_blob(&blob)
            }
        }
    }

    async fn process_completion(self: &Arc<Self>, completion: Completion) -> Result<(), TaskError> {
        match completion {
            Completion::Value(id, value) => self.commit_value(id, value).await,
            Completion::TailCall(id, awaitable) => self.handle_tail_call(id, awaitable).await,
            Completion::Failed(id, err) => {
                if let Some(lf) = self.futures.read().await.get(&id) {
                    lf.public.fail(err.clone_lossy()).await;
                }
                // A future that is itself the inner half of a tail call has
                // an output consumer waiting on its result (see
                // `commit_value`'s success-path chaining); propagate the
                // failure the same way so that waiter doesn't hang forever.
                let mut current = id.clone();
                loop {
                    let consumer = self
                        .futures
                        .read()
                        .await
                        .get(&current)
                        .and_then(|lf| lf.output_consumer.clone());
                    match consumer {
                        Some(next) => {
                            if let Some(lf) = self.futures.read().await.get(&next) {
                                lf.public.fail(err.clone_lossy()).await;
                            }
                            current = next;
                        }
                        None => break,
                    }
                }

                let mut slot = self.request_exception.write().await;
                if slot.is_none() {
                    tracing::debug!(future = %id, "request failed: {err}");
                    *slot = Some(err);
                }
                Ok(())
            }
        }
    }

    async fn commit_value(self: &Arc<Self>, id: FutureId, value: Value) -> Result<(), TaskError> {
        let serializer = self
            .futures
            .read()
            .await
            .get(&id)
            .map(|lf| lf.effective_output_serializer)
            .unwrap_or(SerializerName::Json);
        let blob = encode_blob(&value, serializer)?;
        self.blobs.write().await.insert(id.clone(), blob.clone());
        if let Some(lf) = self.futures.read().await.get(&id) {
            lf.public.resolve(value.clone()).await;
        }

        let mut current = id;
        loop {
            let consumer = self
                .futures
                .read()
                .await
                .get(&current)
                .and_then(|lf| lf.output_consumer.clone());
            match consumer {
                Some(next) => {
                    self.blobs.write().await.insert(next.clone(), blob.clone());
                    if let Some(lf) = self.futures.read().await.get(&next) {
                        lf.public.resolve(value.clone()).await;
                    }
                    current = next;
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn handle_tail_call(self: &Arc<Self>, id: FutureId, inner: Awaitable) -> Result<(), TaskError> {
        let caller_serializer = self
            .futures
            .read()
            .await
            .get(&id)
            .map(|lf| lf.effective_output_serializer)
            .unwrap_or(SerializerName::Json);

        let inner_future = self.submit(inner, Some(caller_serializer)).await?;
        let inner_id = inner_future.id().clone();
        if let Some(lf) = self.futures.write().await.get_mut(&inner_id) {
            lf.output_consumer = Some(id.clone());
        }

        if let Some(blob) = self.blobs.read().await.get(&inner_id).cloned() {
            self.blobs.write().await.insert(id.clone(), blob.clone());
            if let Some(lf) = self.futures.read().await.get(&id) {
                lf.public.resolve(decode_blob(&blob)?).await;
            }
        }
        Ok(())
    }

    /// Run the control loop (§4.3.2) to completion and decode the root's
    /// output.
    async fn run_to_completion(self: Arc<Self>, root: Awaitable) -> Result<Value, TaskError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let root_future = self.submit(root, None).await?;
        let root_id = root_future.id().clone();

        loop {
            let started = self.scan_and_start(&tx).await;

            if self.request_exception.read().await.is_some() {
                while !self.running.read().await.is_empty() {
                    let _ = timeout(Duration::from_millis(100), rx.recv()).await;
                    if let Ok(Some(completion)) = timeout(Duration::from_millis(0), rx.recv()).await {
                        let _ = self.process_completion(completion).await;
                    }
                    // even if nothing was received this tick, outstanding
                    // workers will eventually remove themselves from
                    // `running` when they observe the stop signal.
                    if self.running.read().await.is_empty() {
                        break;
                    }
                }
                break;
            }

            if self.running.read().await.is_empty() && started == 0 {
                break;
            }

            if let Ok(Some(completion)) = timeout(Duration::from_millis(100), rx.recv()).await {
                self.process_completion(completion).await?;
            }
        }

        if let Some(err) = self.request_exception.write().await.take() {
            return Err(err);
        }

        let blob = self
            .blobs
            .read()
            .await
            .get(&root_id)
            .cloned()
            .ok_or_else(|| TaskError::Internal("request finished without a root result".to_string()))?;
        decode_blob(&blob)
    }

    /// Submit more awaitables mid-request, returning their futures without
    /// blocking. Used by [`LocalHooks::start`] so that code executing inside
    /// a function body (an SDK call to `awaitable.run()`) can add work to the
    /// same runner it is itself running under.
    async fn start_more(self: &Arc<Self>, awaitables: Vec<Awaitable>) -> Result<Vec<taskgraph_core::Future>, TaskError> {
        let mut out = Vec::with_capacity(awaitables.len());
        for a in awaitables {
            out.push(self.submit(a, None).await?);
        }
        Ok(out)
    }
}

/// Binds a [`LocalRunner`] into the three [`taskgraph_hooks::RuntimeHooks`]
/// slots. A thin newtype over `Arc<LocalRunner>` because Rust's orphan rules
/// forbid implementing a foreign trait directly on `Arc<LocalRunner>`.
#[derive(Clone)]
pub struct LocalHooks(Arc<LocalRunner>);

impl LocalHooks {
    /// Wrap a runner so it can be bound into [`taskgraph_hooks::RuntimeHooks`].
    pub fn new(runner: Arc<LocalRunner>) -> Self {
        Self(runner)
    }
}

#[async_trait]
impl taskgraph_hooks::WaitFutures for LocalHooks {
    async fn wait(
        &self,
        futures: &[taskgraph_core::Future],
        timeout: Option<Duration>,
        mode: taskgraph_core::WaitMode,
    ) -> Result<(Vec<usize>, Vec<usize>), TaskError> {
        if let Some(err) = self.0.check_cancellation().await {
            return Err(err);
        }
        Ok(taskgraph_core::wait(futures, timeout, mode).await)
    }
}

#[async_trait]
impl taskgraph_hooks::StartFunctionCalls for LocalHooks {
    async fn start(&self, awaitables: Vec<Awaitable>) -> Result<Vec<taskgraph_core::Future>, TaskError> {
        if let Some(err) = self.0.check_cancellation().await {
            return Err(err);
        }
        self.0.start_more(awaitables).await
    }
}

#[async_trait]
impl taskgraph_hooks::StartAndWaitFunctionCalls for LocalHooks {
    async fn start_and_wait(
        &self,
        awaitables: Vec<Awaitable>,
    ) -> Result<Vec<Result<Value, TaskError>>, TaskError> {
        if let Some(err) = self.0.check_cancellation().await {
            return Err(err);
        }
        let futures = self.0.start_more(awaitables).await?;
        let mut out = Vec::with_capacity(futures.len());
        for f in &futures {
            out.push(f.result(None).await);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskgraph_registry::FunctionDescriptor;

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
            let a = args[0].clone();
            let b = args[1].clone();
            let (Value::Data(a), Value::Data(b)) = (a, b) else {
                return Err(TaskError::FunctionError("expected data values".to_string()));
            };
            Ok(Outcome::Value(Value::Data(serde_json::json!(
                a.as_i64().unwrap() + b.as_i64().unwrap()
            ))))
        }
    }

    struct Identity;
    #[async_trait]
    impl FunctionBody for Identity {
        async fn call(
            &self,
            _instance: Option<Arc<dyn Any + Send + Sync>>,
            mut args: Vec<Value>,
            _kwargs: BTreeMap<String, Value>,
            _hooks: &RuntimeHooks,
        ) -> Result<Outcome, TaskError> {
            Ok(Outcome::Value(args.remove(0)))
        }
    }

    struct Flaky(Arc<std::sync::atomic::AtomicU32>);
    #[async_trait]
    impl FunctionBody for Flaky {
        async fn call(
            &self,
            _instance: Option<Arc<dyn Any + Send + Sync>>,
            _args: Vec<Value>,
            _kwargs: BTreeMap<String, Value>,
            _hooks: &RuntimeHooks,
        ) -> Result<Outcome, TaskError> {
            let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n < 2 {
                Err(TaskError::FunctionError("not yet".to_string()))
            } else {
                Ok(Outcome::Value(Value::Data(serde_json::json!(42))))
            }
        }
    }

    fn test_runtime() -> Arc<LocalRuntime> {
        let registry = Arc::new(Registry::new());
        registry
            .register_function(FunctionDescriptor::new("add", "test.rs"))
            .unwrap();
        registry
            .register_function(FunctionDescriptor::new("identity", "test.rs"))
            .unwrap();
        Arc::new(LocalRuntime::new(registry))
    }

    async fn run_simple(runtime: &Arc<LocalRuntime>, root: Awaitable) -> Result<Value, TaskError> {
        runtime
            .run(
                root,
                RequestId::new("r0"),
                Arc::new(taskgraph_state::MemoryState::new()),
                Arc::new(taskgraph_state::ConsoleProgress),
                Arc::new(taskgraph_state::InMemoryMetrics::new()),
            )
            .await
    }

    #[tokio::test]
    async fn pure_call_evaluates_to_expected_result() {
        let runtime = test_runtime();
        runtime.register_body("add", Arc::new(Add)).await;
        let root = Awaitable::call(
            FutureId::new("root"),
            "add",
            vec![Arg::value(2), Arg::value(3)],
        );
        let result = run_simple(&runtime, root).await.unwrap();
        assert_eq!(result, Value::Data(serde_json::json!(5)));
    }

    #[tokio::test]
    async fn reduce_with_single_input_collapses_to_identity() {
        let runtime = test_runtime();
        runtime.register_body("identity", Arc::new(Identity)).await;
        let root = Awaitable::reduce(FutureId::new("root"), "identity", vec![Arg::value(7)]);
        let result = run_simple(&runtime, root).await.unwrap();
        assert_eq!(result, Value::Data(serde_json::json!(7)));
    }

    #[tokio::test]
    async fn reduce_over_four_inputs_left_folds() {
        let runtime = test_runtime();
        runtime.register_body("add", Arc::new(Add)).await;
        let root = Awaitable::reduce(
            FutureId::new("root"),
            "add",
            vec![Arg::value(1), Arg::value(2), Arg::value(3), Arg::value(4)],
        );
        let result = run_simple(&runtime, root).await.unwrap();
        assert_eq!(result, Value::Data(serde_json::json!(10)));
    }

    #[tokio::test]
    async fn retry_budget_succeeds_within_max_retries() {
        let registry = Arc::new(Registry::new());
        registry
            .register_function(
                FunctionDescriptor::new("flaky", "test.rs")
                    .with_retries(taskgraph_core::Retries::with_max_retries(2)),
            )
            .unwrap();
        let runtime = Arc::new(LocalRuntime::new(registry));
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        runtime.register_body("flaky", Arc::new(Flaky(calls.clone()))).await;
        let root = Awaitable::call(FutureId::new("root"), "flaky", vec![]);
        let result = run_simple(&runtime, root).await.unwrap();
        assert_eq!(result, Value::Data(serde_json::json!(42)));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    struct AssertPositive;
    #[async_trait]
    impl FunctionBody for AssertPositive {
        async fn call(
            &self,
            _instance: Option<Arc<dyn Any + Send + Sync>>,
            args: Vec<Value>,
            _kwargs: BTreeMap<String, Value>,
            _hooks: &RuntimeHooks,
        ) -> Result<Outcome, TaskError> {
            if let Value::Data(v) = &args[0] {
                if v.as_i64().unwrap_or(0) < 0 {
                    return Err(TaskError::RequestError("must be positive".to_string()));
                }
            }
            Ok(Outcome::Value(args[0].clone()))
        }
    }

    #[tokio::test]
    async fn request_error_fails_fast_without_retry() {
        let registry = Arc::new(Registry::new());
        registry
            .register_function(
                FunctionDescriptor::new("assert_positive", "test.rs")
                    .with_retries(taskgraph_core::Retries::with_max_retries(5)),
            )
            .unwrap();
        let runtime = Arc::new(LocalRuntime::new(registry));
        runtime
            .register_body("assert_positive", Arc::new(AssertPositive))
            .await;
        let root = Awaitable::call(FutureId::new("root"), "assert_positive", vec![Arg::value(-1)]);
        let err = run_simple(&runtime, root).await.unwrap_err();
        assert!(matches!(err, TaskError::RequestError(m) if m == "must be positive"));
    }
}
