//! The executor collaborator and the loader's binding to it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::identity::{CompiledRequest, QueryDescriptor};
use crate::loadable::Loadable;

/// Callback an executor invokes to make the loader re-execute now.
pub type ForceUpdate = Arc<dyn Fn() + Send + Sync>;

/// Executes compiled requests against a store.
///
/// The executor owns everything about how a request is fulfilled: network
/// transport, normalized cache lookups, store subscriptions. The loader only
/// asks it to execute, hands it a [`ForceUpdate`] callback, and tells it when to
/// release its resources.
///
/// # Sync by Design
///
/// `execute` is synchronous. When the result is not available yet, return
/// [`Loadable::Pending`] with a [`Suspension`](crate::Suspension) that settles
/// once the data has arrived; the loader executes again after that.
///
/// # Re-entrancy
///
/// The executor is locked while `execute`, `set_force_update`, or `dispose`
/// runs. Invoke the [`ForceUpdate`] callback from outside those methods, for
/// example from a store subscription or a completed fetch.
pub trait Executor: Send + 'static {
    /// Store context a request is executed against. Compared by identity.
    type Environment: Send + Sync + 'static;
    /// Query documents this executor understands.
    type Query: QueryDescriptor;
    /// Per-call configuration, forwarded verbatim by the loader.
    type Options: Clone + Default + Send + Sync + 'static;
    /// Value produced by a successful execution.
    type Output: Send + Sync + 'static;

    /// Execute `request` against `environment`.
    fn execute(
        &mut self,
        environment: &Arc<Self::Environment>,
        request: &CompiledRequest<Self::Query>,
        options: &Self::Options,
    ) -> Loadable<Arc<Self::Output>>;

    /// Register the callback to invoke when the store invalidates the current
    /// result. Replaces any previous callback.
    fn set_force_update(&mut self, callback: ForceUpdate);

    /// Release resources: cancel in-flight work and detach store subscriptions.
    fn dispose(&mut self);
}

/// Owns the single executor instance of a loader.
///
/// The executor is created with the loader and is never replaced.
pub(crate) struct ExecutorBinding<X: Executor> {
    executor: Mutex<X>,
}

impl<X: Executor> ExecutorBinding<X> {
    pub(crate) fn new(executor: X) -> Self {
        Self {
            executor: Mutex::new(executor),
        }
    }

    pub(crate) fn execute(
        &self,
        environment: &Arc<X::Environment>,
        request: &CompiledRequest<X::Query>,
        options: &X::Options,
    ) -> Loadable<Arc<X::Output>> {
        self.executor.lock().execute(environment, request, options)
    }

    pub(crate) fn set_force_update(&self, callback: ForceUpdate) {
        self.executor.lock().set_force_update(callback);
    }

    pub(crate) fn dispose(&self) {
        self.executor.lock().dispose();
    }
}
