//! EventSink port - lifecycle イベントの記録
//!
//! - NoopEventSink: 何もしない（デフォルト）
//! - TracingEventSink / RecordingEventSink は impls に置く

use crate::domain::LifecycleEvent;

/// EventSink は lifecycle イベントを受け取る
///
/// driver のコンテキストから同期的に呼ばれるので、重い処理はしないこと。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: LifecycleEvent) {}
}
