//! InMemoryHost - 開発・テスト用のホスト環境
//!
//! background / foreground の切り替えを手で行う。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

use crate::ports::{BackgroundEntered, HostEnvironment};

/// Signals are rare; a small buffer is plenty.
const SIGNAL_CAPACITY: usize = 16;

#[derive(Clone)]
pub struct InMemoryHost {
    backgrounded: Arc<AtomicBool>,
    entries: broadcast::Sender<BackgroundEntered>,
}

impl InMemoryHost {
    /// Starts in the foreground.
    pub fn new() -> Self {
        let (entries, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            backgrounded: Arc::new(AtomicBool::new(false)),
            entries,
        }
    }

    /// Move to the background and notify subscribers.
    pub fn enter_background(&self) {
        self.backgrounded.store(true, Ordering::SeqCst);
        // ignore send error: no subscriber is fine
        let _ = self.entries.send(BackgroundEntered);
    }

    pub fn enter_foreground(&self) {
        self.backgrounded.store(false, Ordering::SeqCst);
    }

    /// Change the reported mode without firing the signal.
    pub fn set_backgrounded(&self, value: bool) {
        self.backgrounded.store(value, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.entries.receiver_count()
    }
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEnvironment for InMemoryHost {
    fn is_backgrounded(&self) -> bool {
        self.backgrounded.load(Ordering::SeqCst)
    }

    fn background_entries(&self) -> broadcast::Receiver<BackgroundEntered> {
        self.entries.subscribe()
    }
}
