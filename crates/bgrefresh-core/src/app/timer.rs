//! AutoCompleteTimer - 一度だけ発火する、キャンセル可能な遅延コールバック
//!
//! tokio task で sleep してからコールバックを呼ぶ。`cancel` か drop で
//! task を abort する。abort と発火がすれ違うことはあり得るので、
//! 発火を受け取る側（driver）は古い発火を無視できるようにしておくこと。

use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct AutoCompleteTimer {
    delay: Duration,
    join: JoinHandle<()>,
}

impl AutoCompleteTimer {
    /// Run `on_fire` once after `delay`. Must be called within a tokio runtime.
    pub fn arm<F>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });
        Self { delay, join }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Has the callback run (or the task been aborted)?
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the timer. A callback that already ran is not undone.
    pub fn cancel(self) {
        // Drop does the abort.
    }
}

impl Drop for AutoCompleteTimer {
    fn drop(&mut self) {
        self.join.abort();
    }
}
