//! EventSink の実装
//!
//! - RecordingEventSink: テストでトレースを検証するために溜めておく
//! - TracingEventSink: `tracing::debug!` に流すだけ

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::LifecycleEvent;
use crate::ports::EventSink;

#[derive(Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.lock().clone()
    }

    /// Event names in order, e.g. `["launched", "assertion_acquired", ...]`.
    pub fn names(&self) -> Vec<&'static str> {
        self.lock().iter().map(LifecycleEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LifecycleEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: LifecycleEvent) {
        self.lock().push(event);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: LifecycleEvent) {
        tracing::debug!(event = event.name(), detail = ?event, "lifecycle event");
    }
}
