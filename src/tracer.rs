//! Tracer trait for observing loader execution.
//!
//! This module defines the [`Tracer`] trait and related types for observing what
//! a [`Loader`](crate::Loader) does. The default [`NoopTracer`] discards
//! everything. [`EventCollector`](crate::EventCollector) records events for
//! tests, and with the `tracing` feature [`TracingTracer`] forwards them to the
//! `tracing` crate.
//!
//! # Example
//!
//! ```ignore
//! use query_loader::{ExecutionResult, Loader, RequestKey, SpanId, Tracer};
//!
//! struct PrintTracer;
//!
//! impl Tracer for PrintTracer {
//!     fn new_span_id(&self) -> SpanId {
//!         SpanId(1)
//!     }
//!
//!     fn on_execute_end(&self, _span_id: SpanId, key: &RequestKey, result: ExecutionResult) {
//!         println!("{key}: {result:?}");
//!     }
//! }
//!
//! let loader = Loader::builder(executor).tracer(PrintTracer).build();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::identity::RequestKey;

/// Unique identifier for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(pub u64);

/// Execution result classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The executor produced a value.
    Ready,
    /// The executor is waiting for data. Not an error.
    Suspended,
    /// The executor failed.
    Failed {
        /// Display form of the error.
        message: String,
    },
}

/// Tracer trait for observing loader execution.
///
/// All methods except [`Tracer::new_span_id`] have empty default
/// implementations, so only the events of interest need overriding.
///
/// Implementations must be `Send + Sync`: force updates and continuations may
/// run on whatever thread settles the pending work.
pub trait Tracer: Send + Sync + 'static {
    /// Generate a new unique span ID. Called at the start of each execution.
    fn new_span_id(&self) -> SpanId;

    /// Called when `next` has decided whether to reuse the compiled request.
    #[inline]
    fn on_identity_resolved(&self, _key: &RequestKey, _reused: bool) {}

    /// Called right before the executor runs.
    #[inline]
    fn on_execute_start(&self, _span_id: SpanId, _key: &RequestKey) {}

    /// Called after the executor returned.
    #[inline]
    fn on_execute_end(&self, _span_id: SpanId, _key: &RequestKey, _result: ExecutionResult) {}

    /// Called when the executor asks the loader to re-execute.
    #[inline]
    fn on_force_update(&self, _key: Option<&RequestKey>) {}

    /// Called when `get_value` re-runs the query under a different environment.
    #[inline]
    fn on_environment_switch(&self, _key: &RequestKey) {}

    /// Called after the listener has been invoked with a settled result.
    #[inline]
    fn on_listener_notified(&self, _key: &RequestKey) {}

    /// Called when the loader is disposed.
    #[inline]
    fn on_dispose(&self) {}
}

/// Zero-cost tracer that discards all events.
///
/// This is the default tracer for [`Loader`](crate::Loader).
pub struct NoopTracer;

/// Global span counter for NoopTracer.
static NOOP_SPAN_COUNTER: AtomicU64 = AtomicU64::new(1);

impl Tracer for NoopTracer {
    #[inline(always)]
    fn new_span_id(&self) -> SpanId {
        SpanId(NOOP_SPAN_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl<T: Tracer + ?Sized> Tracer for std::sync::Arc<T> {
    fn new_span_id(&self) -> SpanId {
        (**self).new_span_id()
    }

    fn on_identity_resolved(&self, key: &RequestKey, reused: bool) {
        (**self).on_identity_resolved(key, reused)
    }

    fn on_execute_start(&self, span_id: SpanId, key: &RequestKey) {
        (**self).on_execute_start(span_id, key)
    }

    fn on_execute_end(&self, span_id: SpanId, key: &RequestKey, result: ExecutionResult) {
        (**self).on_execute_end(span_id, key, result)
    }

    fn on_force_update(&self, key: Option<&RequestKey>) {
        (**self).on_force_update(key)
    }

    fn on_environment_switch(&self, key: &RequestKey) {
        (**self).on_environment_switch(key)
    }

    fn on_listener_notified(&self, key: &RequestKey) {
        (**self).on_listener_notified(key)
    }

    fn on_dispose(&self) {
        (**self).on_dispose()
    }
}

/// Tracer that forwards loader events to the `tracing` crate.
///
/// Normal flow is logged at `debug`/`trace`. Suspension is logged at `trace`
/// since it is a normal control value; only failures reach `warn`.
#[cfg(feature = "tracing")]
#[derive(Debug, Default)]
pub struct TracingTracer {
    next_span: AtomicU64,
}

#[cfg(feature = "tracing")]
impl TracingTracer {
    /// Create a new tracing tracer.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "tracing")]
impl Tracer for TracingTracer {
    fn new_span_id(&self) -> SpanId {
        SpanId(self.next_span.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn on_identity_resolved(&self, key: &RequestKey, reused: bool) {
        tracing::trace!(request = %key, reused, "resolved request identity");
    }

    fn on_execute_start(&self, span_id: SpanId, key: &RequestKey) {
        tracing::debug!(span = span_id.0, request = %key, "executing request");
    }

    fn on_execute_end(&self, span_id: SpanId, key: &RequestKey, result: ExecutionResult) {
        match result {
            ExecutionResult::Ready => {
                tracing::debug!(span = span_id.0, request = %key, "request ready");
            }
            ExecutionResult::Suspended => {
                tracing::trace!(span = span_id.0, request = %key, "request pending");
            }
            ExecutionResult::Failed { message } => {
                tracing::warn!(span = span_id.0, request = %key, error = %message, "request failed");
            }
        }
    }

    fn on_force_update(&self, key: Option<&RequestKey>) {
        tracing::debug!(request = ?key.map(RequestKey::as_str), "force update");
    }

    fn on_environment_switch(&self, key: &RequestKey) {
        tracing::debug!(request = %key, "environment switched");
    }

    fn on_listener_notified(&self, key: &RequestKey) {
        tracing::trace!(request = %key, "listener notified");
    }

    fn on_dispose(&self) {
        tracing::debug!("loader disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct CountingTracer {
        start_count: AtomicUsize,
        end_count: AtomicUsize,
    }

    impl CountingTracer {
        fn new() -> Self {
            Self {
                start_count: AtomicUsize::new(0),
                end_count: AtomicUsize::new(0),
            }
        }
    }

    impl Tracer for CountingTracer {
        fn new_span_id(&self) -> SpanId {
            SpanId(1)
        }

        fn on_execute_start(&self, _span_id: SpanId, _key: &RequestKey) {
            self.start_count.fetch_add(1, Ordering::Relaxed);
        }

        fn on_execute_end(&self, _span_id: SpanId, _key: &RequestKey, _result: ExecutionResult) {
            self.end_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_noop_tracer_span_id() {
        let tracer = NoopTracer;
        let id1 = tracer.new_span_id();
        let id2 = tracer.new_span_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_counting_tracer() {
        let tracer = CountingTracer::new();
        let key = RequestKey::new("TestQuery", &crate::Variables::new());

        tracer.on_execute_start(SpanId(1), &key);
        tracer.on_execute_start(SpanId(2), &key);
        tracer.on_execute_end(SpanId(1), &key, ExecutionResult::Ready);

        assert_eq!(tracer.start_count.load(Ordering::Relaxed), 2);
        assert_eq!(tracer.end_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_tracer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopTracer>();
        assert_send_sync::<Arc<CountingTracer>>();
    }
}
