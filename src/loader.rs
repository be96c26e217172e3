//! The loader engine.

use std::fmt;
use std::sync::{Arc, Weak};

use futures::task::{Spawn, SpawnExt};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::executor::{Executor, ExecutorBinding, ForceUpdate};
use crate::identity::{resolve_identity, CompiledRequest};
use crate::loadable::{Loadable, Suspension};
use crate::tracer::{ExecutionResult, NoopTracer, Tracer};
use crate::{LoaderError, Variables};

/// Callback invoked with each settled result.
pub type Listener<T> = Arc<dyn Fn(&Loadable<Arc<T>>) + Send + Sync>;

/// How a loader reports a pending execution from [`Loader::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoaderMode {
    /// Render-blocking: a pending execution is returned as
    /// `Err(LoaderError::Suspend)` so the caller suspends.
    #[default]
    Eager,
    /// Promise-returning: a pending execution is returned as `Ok(completion)`.
    Deferred,
}

/// Mutable state of one loader. Only the loader and the callbacks it registers
/// touch it.
struct LoaderState<X: Executor> {
    environment: Option<Arc<X::Environment>>,
    request: Option<Arc<CompiledRequest<X::Query>>>,
    options: X::Options,
    last_result: Option<Loadable<Arc<X::Output>>>,
    listener: Option<Listener<X::Output>>,
    disposed: bool,
}

/// Inputs of one execution, copied out so no lock is held while executing.
struct Snapshot<X: Executor> {
    environment: Arc<X::Environment>,
    request: Arc<CompiledRequest<X::Query>>,
    options: X::Options,
}

impl<X: Executor> LoaderState<X> {
    fn new() -> Self {
        Self {
            environment: None,
            request: None,
            options: X::Options::default(),
            last_result: None,
            listener: None,
            disposed: false,
        }
    }

    fn snapshot(&self) -> Option<Snapshot<X>> {
        if self.disposed {
            return None;
        }
        Some(Snapshot {
            environment: self.environment.clone()?,
            request: self.request.clone()?,
            options: self.options.clone(),
        })
    }
}

enum Recompute {
    Settled(Result<(), LoaderError>),
    Pending(Suspension),
    /// Nothing to execute: disposed, or no request compiled yet.
    Inert,
}

struct Engine<X: Executor> {
    state: Mutex<LoaderState<X>>,
    binding: ExecutorBinding<X>,
    mode: LoaderMode,
    tracer: Arc<dyn Tracer>,
    spawner: Option<Arc<dyn Spawn + Send + Sync>>,
}

impl<X: Executor> Engine<X> {
    /// Execute the current request and store the outcome.
    ///
    /// The state lock is released while the executor and the listener run, so
    /// both may call back into the loader.
    fn recompute(self: &Arc<Self>) -> Recompute {
        let Some(snapshot) = self.state.lock().snapshot() else {
            return Recompute::Inert;
        };
        let key = snapshot.request.key();
        let span_id = self.tracer.new_span_id();
        self.tracer.on_execute_start(span_id, key);

        let outcome =
            self.binding
                .execute(&snapshot.environment, &snapshot.request, &snapshot.options);

        let (traced, completion) = match &outcome {
            Loadable::Ready(_) => (ExecutionResult::Ready, Ok(())),
            Loadable::Pending(_) => (ExecutionResult::Suspended, Ok(())),
            Loadable::Failed(err) => (
                ExecutionResult::Failed {
                    message: err.to_string(),
                },
                Err(err.clone()),
            ),
        };
        self.tracer.on_execute_end(span_id, key, traced);

        if let Loadable::Pending(pending) = outcome {
            // Store the continuation rather than the executor's future: awaiting
            // it is what re-executes once the data has arrived.
            let continuation = Suspension::new(retry(Arc::downgrade(self), pending));
            self.state.lock().last_result = Some(Loadable::Pending(continuation.clone()));
            self.drive(&continuation);
            return Recompute::Pending(continuation);
        }

        let listener = {
            let mut state = self.state.lock();
            state.last_result = Some(outcome.clone());
            state.listener.clone()
        };
        if let Some(listener) = listener {
            listener(&outcome);
            self.tracer.on_listener_notified(key);
        }
        Recompute::Settled(completion)
    }

    /// Hand `continuation` to the spawner, if any, so the re-execution runs as
    /// soon as the pending work settles. Without a spawner it runs when
    /// someone awaits the continuation.
    fn drive(&self, continuation: &Suspension) {
        let Some(spawner) = &self.spawner else {
            return;
        };
        // A shut-down spawner leaves the continuation to whoever awaits it.
        let _ = spawner.spawn(continuation.clone().map(|_| ()));
    }

    fn force_update(self: &Arc<Self>) {
        let key = {
            let state = self.state.lock();
            if state.disposed {
                return;
            }
            state.request.as_ref().map(|r| r.key().clone())
        };
        self.tracer.on_force_update(key.as_ref());
        let _ = self.recompute();
    }

    /// Callback handed to the executor. Holds only a weak reference, so the
    /// executor never keeps a dropped loader alive.
    fn force_update_callback(self: &Arc<Self>) -> ForceUpdate {
        let engine = Arc::downgrade(self);
        Arc::new(move || {
            if let Some(engine) = engine.upgrade() {
                engine.force_update();
            }
        })
    }

    fn dispose(&self) {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.listener = None;
        }
        self.binding.dispose();
        self.tracer.on_dispose();
    }
}

/// Wait for `pending`, then execute again against whatever identity is current.
///
/// Resolves once that re-execution settles, following further pending
/// outcomes until one does.
async fn retry<X: Executor>(
    engine: Weak<Engine<X>>,
    pending: Suspension,
) -> Result<(), LoaderError> {
    pending.await?;
    let next = match engine.upgrade() {
        Some(engine) => engine.recompute(),
        None => return Ok(()),
    };
    match next {
        Recompute::Pending(continuation) => continuation.await,
        Recompute::Settled(result) => result,
        Recompute::Inert => Ok(()),
    }
}

/// A memoizing, suspense-compatible loader for a single query.
///
/// A loader remembers the last compiled request and the last execution
/// outcome. [`Loader::next`] points it at a query; [`Loader::get_value`] reads
/// the outcome, which is either a value or a [`Suspension`] to wait on. The
/// executor can ask the loader to re-execute at any time through the
/// [`ForceUpdate`] callback it receives.
///
/// # Example
///
/// ```ignore
/// let loader = Loader::deferred(MyExecutor::new());
///
/// let completion = loader.next(env, query, variables, QueryOptions::default())?;
/// match loader.get_value(None) {
///     Some(Loadable::Ready(data)) => render(&data),
///     Some(Loadable::Pending(pending)) => suspend_on(pending),
///     Some(Loadable::Failed(err)) => show_error(err),
///     None => {}
/// }
/// ```
pub struct Loader<X: Executor> {
    engine: Arc<Engine<X>>,
}

#[test]
fn test_send_sync() {
    struct Never;
    impl crate::QueryDescriptor for Never {
        type Request = ();
        fn compile(&self, _: &Variables) -> Result<(), LoaderError> {
            Ok(())
        }
    }
    struct NeverExecutor;
    impl Executor for NeverExecutor {
        type Environment = ();
        type Query = Never;
        type Options = ();
        type Output = ();
        fn execute(
            &mut self,
            _: &Arc<()>,
            _: &CompiledRequest<Never>,
            _: &(),
        ) -> Loadable<Arc<()>> {
            Loadable::Ready(Arc::new(()))
        }
        fn set_force_update(&mut self, _: ForceUpdate) {}
        fn dispose(&mut self) {}
    }

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<Loader<NeverExecutor>>();
    assert_sync::<Loader<NeverExecutor>>();
    assert_send::<Subscription<NeverExecutor>>();
}

impl<X: Executor> Loader<X> {
    /// Create a render-blocking loader: a pending execution makes
    /// [`Loader::next`] return `Err(LoaderError::Suspend)`.
    pub fn eager(executor: X) -> Self {
        Self::builder(executor).mode(LoaderMode::Eager).build()
    }

    /// Create a promise-returning loader: a pending execution makes
    /// [`Loader::next`] return the completion future.
    pub fn deferred(executor: X) -> Self {
        Self::builder(executor).mode(LoaderMode::Deferred).build()
    }

    /// Create a builder for customizing the loader.
    pub fn builder(executor: X) -> LoaderBuilder<X> {
        LoaderBuilder::new(executor)
    }

    /// The mode this loader was built with.
    pub fn mode(&self) -> LoaderMode {
        self.engine.mode
    }

    /// Point the loader at a query and execute it.
    ///
    /// `environment` and `options` always replace the stored ones. The query is
    /// recompiled only if `query` is a different `Arc` or `variables` differs
    /// structurally from the stored variables. Execution always runs.
    ///
    /// Returns a completion future that settles once the execution started here
    /// has settled, including the re-execution after a pending outcome. A
    /// failed execution yields a completion that settles with the failure.
    ///
    /// # Errors
    ///
    /// - `LoaderError::Suspend` - Execution is pending and this is an eager
    ///   loader. The carried future is the completion.
    /// - `LoaderError::Compile` - The query failed to compile; the previous
    ///   request is kept.
    /// - `LoaderError::Disposed` - The loader was disposed.
    pub fn next(
        &self,
        environment: Arc<X::Environment>,
        query: Arc<X::Query>,
        variables: Variables,
        options: X::Options,
    ) -> Result<Suspension, LoaderError> {
        let (key, reused) = {
            let mut state = self.engine.state.lock();
            if state.disposed {
                return Err(LoaderError::Disposed);
            }
            state.environment = Some(environment);
            state.options = options;
            let resolved = resolve_identity(state.request.as_ref(), &query, variables)?;
            let key = resolved.request.key().clone();
            if !resolved.reused {
                state.request = Some(resolved.request);
            }
            (key, resolved.reused)
        };
        self.engine.tracer.on_identity_resolved(&key, reused);

        // Re-registered on every call; the callback reads the identity that is
        // current when it fires.
        self.engine
            .binding
            .set_force_update(self.engine.force_update_callback());

        match self.engine.recompute() {
            Recompute::Pending(continuation) => match self.engine.mode {
                LoaderMode::Deferred => Ok(continuation),
                LoaderMode::Eager => Err(LoaderError::Suspend {
                    pending: continuation,
                }),
            },
            Recompute::Settled(Ok(())) | Recompute::Inert => Ok(Suspension::settled()),
            Recompute::Settled(Err(err)) => Ok(Suspension::failed(err)),
        }
    }

    /// [`Loader::next`] with no variables and default options.
    pub fn load(
        &self,
        environment: Arc<X::Environment>,
        query: Arc<X::Query>,
    ) -> Result<Suspension, LoaderError> {
        self.next(environment, query, Variables::new(), X::Options::default())
    }

    /// Read the last outcome.
    ///
    /// If `environment` is given and is not the stored environment, the stored
    /// query, variables, and options are first executed again under it.
    ///
    /// Returns `None` if nothing has been executed yet.
    pub fn get_value(
        &self,
        environment: Option<Arc<X::Environment>>,
    ) -> Option<Loadable<Arc<X::Output>>> {
        if let Some(environment) = environment {
            if let Err(err) = self.switch_environment(environment) {
                return Some(Loadable::Failed(err));
            }
        }
        self.engine.state.lock().last_result.clone()
    }

    /// [`Loader::get_value`] for `?`-style callers: pending becomes
    /// `Err(LoaderError::Suspend)`.
    pub fn read(
        &self,
        environment: Option<Arc<X::Environment>>,
    ) -> Result<Option<Arc<X::Output>>, LoaderError> {
        self.get_value(environment)
            .map(Loadable::suspend)
            .transpose()
    }

    /// Wait through pending executions until a settled outcome is available.
    ///
    /// Returns `None` if nothing has been executed yet, or if the loader was
    /// disposed while waiting.
    pub async fn value(&self) -> Option<Result<Arc<X::Output>, LoaderError>> {
        loop {
            match self.get_value(None)? {
                Loadable::Ready(value) => return Some(Ok(value)),
                Loadable::Failed(err) => return Some(Err(err)),
                Loadable::Pending(pending) => {
                    if let Err(err) = pending.clone().await {
                        return Some(Err(err));
                    }
                    // Still stored after settling means nothing ran after it:
                    // the loader was disposed.
                    let stale = matches!(
                        self.engine.state.lock().last_result.as_ref(),
                        Some(Loadable::Pending(current)) if current.ptr_eq(&pending)
                    );
                    if stale {
                        return None;
                    }
                }
            }
        }
    }

    fn switch_environment(&self, environment: Arc<X::Environment>) -> Result<(), LoaderError> {
        let (query, variables, options, key) = {
            let state = self.engine.state.lock();
            let unchanged = state
                .environment
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &environment));
            if unchanged {
                return Ok(());
            }
            let Some(request) = &state.request else {
                return Ok(());
            };
            (
                request.query().clone(),
                request.variables().clone(),
                state.options.clone(),
                request.key().clone(),
            )
        };
        self.engine.tracer.on_environment_switch(&key);
        match self.next(environment, query, variables, options) {
            // The pending outcome is already stored; get_value surfaces it.
            Err(LoaderError::Suspend { .. }) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    /// Register `callback` as the only listener, replacing any previous one.
    ///
    /// The listener is invoked synchronously with every settled outcome
    /// (ready or failed), whether it came from [`Loader::next`], a force
    /// update, or a re-execution after a pending outcome.
    ///
    /// A settled outcome that follows a pending one is only produced once the
    /// continuation runs. With [`LoaderBuilder::spawner`] that happens as soon
    /// as the pending work settles. Without a spawner someone has to await the
    /// completion from [`Loader::next`] or the stored [`Suspension`]; until
    /// then the listener is not called.
    ///
    /// Note that [`Subscription::unsubscribe`] disposes the whole loader, not
    /// just this listener. Existing callers depend on that, so it stays until
    /// they can be migrated.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Loadable<Arc<X::Output>>) + Send + Sync + 'static,
    ) -> Subscription<X> {
        let mut state = self.engine.state.lock();
        if !state.disposed {
            state.listener = Some(Arc::new(callback));
        }
        Subscription {
            engine: Arc::downgrade(&self.engine),
        }
    }

    /// Release the executor's resources and drop the listener.
    ///
    /// Idempotent. Afterwards force updates and pending re-executions do
    /// nothing, and [`Loader::next`] returns `LoaderError::Disposed`.
    pub fn dispose(&self) {
        self.engine.dispose();
    }

    /// Returns true once [`Loader::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.engine.state.lock().disposed
    }

    /// The request the loader currently executes, if one was compiled.
    pub fn compiled_request(&self) -> Option<Arc<CompiledRequest<X::Query>>> {
        self.engine.state.lock().request.clone()
    }

    /// The environment the loader currently executes against.
    pub fn environment(&self) -> Option<Arc<X::Environment>> {
        self.engine.state.lock().environment.clone()
    }
}

impl<X: Executor> fmt::Debug for Loader<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.engine.state.lock();
        f.debug_struct("Loader")
            .field("mode", &self.engine.mode)
            .field("request", &state.request)
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`Loader::subscribe`].
pub struct Subscription<X: Executor> {
    engine: Weak<Engine<X>>,
}

impl<X: Executor> Subscription<X> {
    /// Dispose the loader this subscription belongs to.
    ///
    /// This releases the executor too, exactly like [`Loader::dispose`].
    pub fn unsubscribe(self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.dispose();
        }
    }
}

impl<X: Executor> fmt::Debug for Subscription<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Builder for [`Loader`].
///
/// # Example
///
/// ```ignore
/// let collector = Arc::new(EventCollector::new());
/// let loader = Loader::builder(MyExecutor::new())
///     .mode(LoaderMode::Deferred)
///     .tracer(collector.clone())
///     .spawner(ThreadPool::new()?)
///     .build();
/// ```
pub struct LoaderBuilder<X: Executor> {
    executor: X,
    mode: LoaderMode,
    tracer: Arc<dyn Tracer>,
    spawner: Option<Arc<dyn Spawn + Send + Sync>>,
}

impl<X: Executor> LoaderBuilder<X> {
    /// Create a builder with eager mode, no tracing, and no spawner.
    pub fn new(executor: X) -> Self {
        Self {
            executor,
            mode: LoaderMode::default(),
            tracer: Arc::new(NoopTracer),
            spawner: None,
        }
    }

    /// Set how pending executions are reported by [`Loader::next`].
    pub fn mode(mut self, mode: LoaderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the tracer that observes this loader.
    pub fn tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Arc::new(tracer);
        self
    }

    /// Run pending re-executions on `spawner` instead of waiting for the
    /// completion to be awaited.
    pub fn spawner(mut self, spawner: impl Spawn + Send + Sync + 'static) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    /// Build the loader. The executor is bound for the loader's whole life.
    pub fn build(self) -> Loader<X> {
        Loader {
            engine: Arc::new(Engine {
                state: Mutex::new(LoaderState::new()),
                binding: ExecutorBinding::new(self.executor),
                mode: self.mode,
                tracer: self.tracer,
                spawner: self.spawner,
            }),
        }
    }
}
