//! Event collector for testing.
//!
//! `EventCollector` implements [`Tracer`] by accumulating [`LoaderEvent`]s for
//! later inspection and assertion.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::identity::RequestKey;
use crate::tracer::{ExecutionResult, SpanId, Tracer};

/// An event observed by an [`EventCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    /// `next` resolved the request identity.
    IdentityResolved {
        /// Key of the request that will be executed.
        key: RequestKey,
        /// Whether the previous compiled request was kept.
        reused: bool,
    },
    /// The executor is about to run.
    ExecuteStart {
        /// Span of this execution.
        span_id: SpanId,
        /// Key of the executed request.
        key: RequestKey,
    },
    /// The executor returned.
    ExecuteEnd {
        /// Span of this execution.
        span_id: SpanId,
        /// Key of the executed request.
        key: RequestKey,
        /// How the execution ended.
        result: ExecutionResult,
    },
    /// The executor requested a re-execution.
    ForceUpdate {
        /// Key of the current request, if one was compiled.
        key: Option<RequestKey>,
    },
    /// `get_value` switched to another environment.
    EnvironmentSwitch {
        /// Key of the re-executed request.
        key: RequestKey,
    },
    /// The listener was invoked.
    ListenerNotified {
        /// Key of the request whose result was delivered.
        key: RequestKey,
    },
    /// The loader was disposed.
    Disposed,
}

/// Event collector for testing - accumulates events for assertions.
///
/// # Example
///
/// ```ignore
/// use query_loader::{EventCollector, Loader, LoaderEvent};
/// use std::sync::Arc;
///
/// let collector = Arc::new(EventCollector::new());
/// let loader = Loader::builder(executor).tracer(collector.clone()).build();
///
/// loader.load(environment, query)?;
///
/// assert!(collector
///     .events()
///     .iter()
///     .any(|e| matches!(e, LoaderEvent::ExecuteEnd { .. })));
/// ```
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<LoaderEvent>>,
    next_span: AtomicU64,
}

impl EventCollector {
    /// Create a new empty event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get collected events as a vector.
    pub fn events(&self) -> Vec<LoaderEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Take collected events, clearing the collector.
    pub fn take(&self) -> Vec<LoaderEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Get the number of collected events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if no events have been collected.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Execution results in the order they were observed.
    pub fn execution_results(&self) -> Vec<ExecutionResult> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                LoaderEvent::ExecuteEnd { result, .. } => Some(result.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: LoaderEvent) {
        self.events.lock().push(event);
    }
}

impl Tracer for EventCollector {
    fn new_span_id(&self) -> SpanId {
        SpanId(self.next_span.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn on_identity_resolved(&self, key: &RequestKey, reused: bool) {
        self.push(LoaderEvent::IdentityResolved {
            key: key.clone(),
            reused,
        });
    }

    fn on_execute_start(&self, span_id: SpanId, key: &RequestKey) {
        self.push(LoaderEvent::ExecuteStart {
            span_id,
            key: key.clone(),
        });
    }

    fn on_execute_end(&self, span_id: SpanId, key: &RequestKey, result: ExecutionResult) {
        self.push(LoaderEvent::ExecuteEnd {
            span_id,
            key: key.clone(),
            result,
        });
    }

    fn on_force_update(&self, key: Option<&RequestKey>) {
        self.push(LoaderEvent::ForceUpdate {
            key: key.cloned(),
        });
    }

    fn on_environment_switch(&self, key: &RequestKey) {
        self.push(LoaderEvent::EnvironmentSwitch { key: key.clone() });
    }

    fn on_listener_notified(&self, key: &RequestKey) {
        self.push(LoaderEvent::ListenerNotified { key: key.clone() });
    }

    fn on_dispose(&self) {
        self.push(LoaderEvent::Disposed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Variables;

    #[test]
    fn test_collect_events() {
        let collector = EventCollector::new();
        assert!(collector.is_empty());

        let key = RequestKey::new("Q", &Variables::new());
        let span = collector.new_span_id();
        collector.on_execute_start(span, &key);
        collector.on_execute_end(span, &key, ExecutionResult::Suspended);

        assert_eq!(collector.len(), 2);
        assert_eq!(collector.execution_results(), vec![ExecutionResult::Suspended]);
    }

    #[test]
    fn test_take_clears() {
        let collector = EventCollector::new();
        collector.on_dispose();
        assert_eq!(collector.take(), vec![LoaderEvent::Disposed]);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_span_ids_are_unique() {
        let collector = EventCollector::new();
        assert_ne!(collector.new_span_id(), collector.new_span_id());
    }
}
