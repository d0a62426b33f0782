//! HostEnvironment port - 実行モードの通知と問い合わせ
//!
//! - background 突入シグナル（payload なし）
//! - 「いま background か？」の問い合わせ（completion 時の再提出判定に使う）

use tokio::sync::broadcast;

/// Fired when the host process transitions into background execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundEntered;

pub trait HostEnvironment: Send + Sync {
    fn is_backgrounded(&self) -> bool;

    /// Subscribe to background-entry signals.
    ///
    /// Dropping the receiver unsubscribes.
    fn background_entries(&self) -> broadcast::Receiver<BackgroundEntered>;
}
