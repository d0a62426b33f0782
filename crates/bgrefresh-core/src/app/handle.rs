//! RefreshHandle / RefreshManager - 呼び出し側の窓口
//!
//! - `RefreshHandle`: clone できる。action にも `&RefreshHandle` が渡る。
//!   操作はすべて driver へのコマンド送信なので、action の中から呼んでも
//!   再入しない。
//! - `RefreshManager`: driver task を所有する。drop か `shutdown()` で止まる。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::app::status::RefreshStatus;
use crate::config::RefreshConfig;
use crate::domain::{LaunchId, RefreshError, TaskIdentifier};
use crate::ports::TaskHandle;

/// Code to run when the scheduler launches the task.
///
/// Set processing to `true` to claim more time than the auto-complete delay,
/// and back to `false` when the work is done.
pub type Action = Arc<dyn Fn(&RefreshHandle) + Send + Sync>;

/// Everything that mutates manager state goes through here.
pub(crate) enum Command {
    Launch(Box<dyn TaskHandle>),
    SetProcessing(bool),
    SetAction(Option<Action>),
    TimerFired { launch: LaunchId },
    AssertionExpired { launch: LaunchId },
    Status(oneshot::Sender<RefreshStatus>),
    Shutdown,
}

struct HandleInner {
    identifier: TaskIdentifier,
    auto_complete_delay: Duration,
    background_fetch_delay: Duration,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<RefreshStatus>,
    /// Last value passed to `set_processing`.
    processing: AtomicBool,
    /// `Some` while the driver is running the action; sends land here and
    /// are handled before anything else in the channel.
    inline: Mutex<Option<Vec<Command>>>,
}

#[derive(Clone)]
pub struct RefreshHandle {
    inner: Arc<HandleInner>,
}

impl RefreshHandle {
    pub(crate) fn new(
        config: &RefreshConfig,
        commands: mpsc::UnboundedSender<Command>,
        status: watch::Receiver<RefreshStatus>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                identifier: config.identifier.clone(),
                auto_complete_delay: config.auto_complete_delay,
                background_fetch_delay: config.background_fetch_delay,
                commands,
                status,
                processing: AtomicBool::new(false),
                inline: Mutex::new(None),
            }),
        }
    }

    pub fn identifier(&self) -> &TaskIdentifier {
        &self.inner.identifier
    }

    /// Fixed at build time.
    pub fn auto_complete_delay(&self) -> Duration {
        self.inner.auto_complete_delay
    }

    /// Fixed at build time.
    pub fn background_fetch_delay(&self) -> Duration {
        self.inner.background_fetch_delay
    }

    /// Claim (`true`) or give back (`false`) processing time.
    ///
    /// A `true` -> `false` change completes the in-flight task. Without a task
    /// in flight it is a no-op.
    pub fn set_processing(&self, value: bool) -> Result<(), RefreshError> {
        self.send(Command::SetProcessing(value))?;
        self.inner.processing.store(value, Ordering::SeqCst);
        Ok(())
    }

    /// Last value given to `set_processing`, from any clone of this handle.
    ///
    /// Up to date immediately, also inside the action. The driver applies
    /// the change in order with its other commands.
    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::SeqCst)
    }

    /// Is a launch cycle in flight (as of the last published status)?
    pub fn has_current_task(&self) -> bool {
        self.inner.status.borrow().has_current_task()
    }

    pub fn set_action<F>(&self, action: F) -> Result<(), RefreshError>
    where
        F: Fn(&RefreshHandle) + Send + Sync + 'static,
    {
        self.send(Command::SetAction(Some(Arc::new(action))))
    }

    pub fn clear_action(&self) -> Result<(), RefreshError> {
        self.send(Command::SetAction(None))
    }

    /// Status after every command sent before this call has been handled.
    pub async fn status(&self) -> Result<RefreshStatus, RefreshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Status(reply_tx))?;
        reply_rx.await.map_err(|_| self.gone())
    }

    /// Follow status changes.
    pub fn subscribe(&self) -> watch::Receiver<RefreshStatus> {
        self.inner.status.clone()
    }

    pub(crate) fn send(&self, command: Command) -> Result<(), RefreshError> {
        {
            let mut inline = self.inline();
            if let Some(queue) = inline.as_mut() {
                queue.push(command);
                return Ok(());
            }
        }
        self.inner.commands.send(command).map_err(|_| self.gone())
    }

    /// Start collecting sends instead of queueing them on the channel.
    pub(crate) fn begin_inline(&self) {
        *self.inline() = Some(Vec::new());
    }

    /// Stop collecting and hand back what was sent meanwhile.
    pub(crate) fn end_inline(&self) -> Vec<Command> {
        self.inline().take().unwrap_or_default()
    }

    fn inline(&self) -> MutexGuard<'_, Option<Vec<Command>>> {
        self.inner.inline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gone(&self) -> RefreshError {
        RefreshError::DriverGone(self.inner.identifier.clone())
    }
}

impl std::fmt::Debug for RefreshHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshHandle")
            .field("identifier", &self.inner.identifier)
            .finish_non_exhaustive()
    }
}

/// Owns the driver task for one task identifier.
///
/// Create it once at startup (see `RefreshBuilder`) and pass the handle to
/// whatever needs it.
pub struct RefreshManager {
    handle: RefreshHandle,
    join: Option<JoinHandle<Result<(), RefreshError>>>,
}

impl RefreshManager {
    pub(crate) fn new(handle: RefreshHandle, join: JoinHandle<Result<(), RefreshError>>) -> Self {
        Self {
            handle,
            join: Some(join),
        }
    }

    pub fn handle(&self) -> &RefreshHandle {
        &self.handle
    }

    /// Has the driver stopped (shutdown or fatal error)?
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the driver and wait for it.
    ///
    /// A task still in flight is marked completed; no new request is submitted.
    pub async fn shutdown(mut self) -> Result<(), RefreshError> {
        // ignore send error: the driver may already be gone
        let _ = self.handle.send(Command::Shutdown);
        self.wait().await
    }

    /// Wait for the driver to stop on its own.
    ///
    /// Resolves with the fatal submission error that stopped it, if any.
    pub async fn join(mut self) -> Result<(), RefreshError> {
        self.wait().await
    }

    async fn wait(&mut self) -> Result<(), RefreshError> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        match join.await {
            Ok(result) => result,
            Err(_) => Err(RefreshError::DriverGone(self.handle.identifier().clone())),
        }
    }
}

impl Drop for RefreshManager {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.handle.send(Command::Shutdown);
        }
    }
}
