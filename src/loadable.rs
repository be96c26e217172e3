//! Loading outcomes and pending futures.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture, FutureExt, Shared};

use crate::LoaderError;

/// A cloneable, not-yet-settled execution.
///
/// This is the value a rendering layer suspends on. All clones observe the same
/// underlying future, so any of them can be awaited, and awaiting one drives the
/// work for every holder.
///
/// The output is `Ok(())` once the awaited work settled successfully, or the
/// error it settled with.
#[derive(Clone)]
pub struct Suspension {
    inner: Shared<BoxFuture<'static, Result<(), LoaderError>>>,
}

impl Suspension {
    /// Wrap a future that settles when the pending work is done.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), LoaderError>> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// A suspension that has already settled successfully.
    pub fn settled() -> Self {
        Self::resolved(Ok(()))
    }

    /// A suspension that has already settled with `err`.
    pub fn failed(err: LoaderError) -> Self {
        Self::resolved(Err(err))
    }

    fn resolved(result: Result<(), LoaderError>) -> Self {
        let suspension = Self::new(future::ready(result));
        // Poll once so `is_settled` reports the stored output.
        let _ = suspension.inner.clone().now_or_never();
        suspension
    }

    /// Returns `true` once the future has completed and its output is stored.
    ///
    /// A future that could complete but has never been polled still reports
    /// `false`.
    pub fn is_settled(&self) -> bool {
        self.inner.peek().is_some()
    }

    /// The settled output, if any.
    pub fn outcome(&self) -> Option<Result<(), LoaderError>> {
        self.inner.peek().cloned()
    }

    /// Returns `true` if both handles observe the same future.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl Future for Suspension {
    type Output = Result<(), LoaderError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.peek() {
            None => write!(f, "Suspension::Pending"),
            Some(Ok(())) => write!(f, "Suspension::Settled"),
            Some(Err(e)) => write!(f, "Suspension::Failed({})", e),
        }
    }
}

/// Outcome of an execution.
///
/// Executors return this instead of signalling "not ready" through control
/// flow, and the loader hands it back from
/// [`Loader::get_value`](crate::Loader::get_value). Callers pattern-match on it,
/// or use [`Loadable::suspend`] to turn a pending outcome into
/// [`LoaderError::Suspend`] and propagate it with `?`.
///
/// # Example
///
/// ```
/// use query_loader::{Loadable, LoaderError, Suspension};
///
/// fn render(state: Loadable<String>) -> Result<String, LoaderError> {
///     let name = state.suspend()?;
///     Ok(format!("Hello, {name}"))
/// }
///
/// assert_eq!(render(Loadable::Ready("Ada".into())).unwrap(), "Hello, Ada");
/// assert!(render(Loadable::Pending(Suspension::settled()))
///     .unwrap_err()
///     .is_suspend());
/// ```
#[derive(Debug, Clone)]
pub enum Loadable<T> {
    /// The value is available.
    Ready(T),
    /// Execution is in flight; wait on the suspension and ask again.
    Pending(Suspension),
    /// Execution failed.
    Failed(LoaderError),
}

impl<T> Loadable<T> {
    /// Check if the value is available.
    pub fn is_ready(&self) -> bool {
        matches!(self, Loadable::Ready(_))
    }

    /// Check if execution is still in flight.
    pub fn is_pending(&self) -> bool {
        matches!(self, Loadable::Pending(_))
    }

    /// Check if execution failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Loadable::Failed(_))
    }

    /// Get the value if ready.
    pub fn ready(&self) -> Option<&T> {
        match self {
            Loadable::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Get the value if ready (consuming version).
    pub fn into_ready(self) -> Option<T> {
        match self {
            Loadable::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Get the in-flight future if pending.
    pub fn pending(&self) -> Option<&Suspension> {
        match self {
            Loadable::Pending(suspension) => Some(suspension),
            _ => None,
        }
    }

    /// Map the ready value, keeping pending and failed outcomes as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loadable<U> {
        match self {
            Loadable::Ready(value) => Loadable::Ready(f(value)),
            Loadable::Pending(suspension) => Loadable::Pending(suspension),
            Loadable::Failed(err) => Loadable::Failed(err),
        }
    }

    /// Convert to `Result`. Pending becomes `Err(LoaderError::Suspend)`.
    pub fn suspend(self) -> Result<T, LoaderError> {
        match self {
            Loadable::Ready(value) => Ok(value),
            Loadable::Pending(pending) => Err(LoaderError::Suspend { pending }),
            Loadable::Failed(err) => Err(err),
        }
    }
}

impl<T> From<Result<T, LoaderError>> for Loadable<T> {
    fn from(result: Result<T, LoaderError>) -> Self {
        match result {
            Ok(value) => Loadable::Ready(value),
            Err(LoaderError::Suspend { pending }) => Loadable::Pending(pending),
            Err(err) => Loadable::Failed(err),
        }
    }
}
