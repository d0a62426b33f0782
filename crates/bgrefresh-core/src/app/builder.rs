//! RefreshBuilder - manager の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - port が足りなければ `RefreshError::MissingPort`
//! - tokio runtime の外なら `RefreshError::NoRuntime`（登録より先に確認する）
//! - スケジューラが identifier を拒否したら `RefreshError::Registration`
//!   （リトライはしない）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::app::assertion::AssertionSlot;
use crate::app::handle::{Action, Command, RefreshHandle, RefreshManager};
use crate::app::lifecycle::{Driver, DriverParts, Ports};
use crate::app::status::RefreshStatus;
use crate::config::RefreshConfig;
use crate::domain::{LifecycleEvent, RefreshError, TaskIdentifier};
use crate::impls::TracingEventSink;
use crate::ports::{
    AssertionHolder, Clock, EventSink, HostEnvironment, IdGenerator, Scheduler, SystemClock,
    UlidGenerator,
};

/// Builds a `RefreshManager`.
///
/// # 使用例
/// ```ignore
/// let manager = RefreshBuilder::new(TaskIdentifier::new("com.example.refresh")?)
///     .auto_complete_delay(Duration::from_secs(2))
///     .scheduler(Arc::new(scheduler))
///     .assertions(Arc::new(assertions))
///     .host(Arc::new(host))
///     .action(|refresh| {
///         let _ = refresh.set_processing(true);
///         // ... later: refresh.set_processing(false)
///     })
///     .build()?;
/// ```
pub struct RefreshBuilder {
    config: RefreshConfig,
    action: Option<Action>,
    scheduler: Option<Arc<dyn Scheduler>>,
    assertions: Option<Arc<dyn AssertionHolder>>,
    host: Option<Arc<dyn HostEnvironment>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    events: Option<Arc<dyn EventSink>>,
}

impl RefreshBuilder {
    pub fn new(identifier: TaskIdentifier) -> Self {
        Self::from_config(RefreshConfig::new(identifier))
    }

    pub fn from_config(config: RefreshConfig) -> Self {
        Self {
            config,
            action: None,
            scheduler: None,
            assertions: None,
            host: None,
            clock: None,
            ids: None,
            events: None,
        }
    }

    pub fn auto_complete_delay(mut self, delay: Duration) -> Self {
        self.config.auto_complete_delay = delay;
        self
    }

    pub fn background_fetch_delay(mut self, delay: Duration) -> Self {
        self.config.background_fetch_delay = delay;
        self
    }

    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&RefreshHandle) + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn assertions(mut self, assertions: Arc<dyn AssertionHolder>) -> Self {
        self.assertions = Some(assertions);
        self
    }

    pub fn host(mut self, host: Arc<dyn HostEnvironment>) -> Self {
        self.host = Some(host);
        self
    }

    /// Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to ULIDs stamped with the configured clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Defaults to `TracingEventSink`.
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Register with the scheduler, subscribe to background entry and start
    /// the driver.
    pub fn build(self) -> Result<RefreshManager, RefreshError> {
        let scheduler = self.scheduler.ok_or(RefreshError::MissingPort("scheduler"))?;
        let assertions = self.assertions.ok_or(RefreshError::MissingPort("assertions"))?;
        let host = self.host.ok_or(RefreshError::MissingPort("host"))?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RefreshError::NoRuntime)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let events = self.events.unwrap_or_else(|| Arc::new(TracingEventSink));
        let identifier = self.config.identifier.clone();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RefreshStatus::initial(identifier.clone()));

        scheduler.register(&identifier, launch_handler(identifier.clone(), commands_tx.clone()))?;
        info!(
            task = %identifier,
            auto_complete_delay_ms = self.config.auto_complete_delay.as_millis() as u64,
            background_fetch_delay_ms = self.config.background_fetch_delay.as_millis() as u64,
            "registered background refresh task"
        );
        events.emit(LifecycleEvent::Registered {
            task: identifier.clone(),
        });

        let background = host.background_entries();
        let handle = RefreshHandle::new(&self.config, commands_tx, status_rx);
        let driver = Driver::new(DriverParts {
            identifier,
            auto_complete_delay: self.config.auto_complete_delay,
            background_fetch_delay: self.config.background_fetch_delay,
            action: self.action,
            assertion: AssertionSlot::new(assertions),
            ports: Ports {
                scheduler,
                host,
                clock,
                ids,
                events,
            },
            handle: handle.clone(),
            commands: commands_rx,
            background,
            status: status_tx,
        });

        let join = runtime.spawn(driver.run());
        Ok(RefreshManager::new(handle, join))
    }
}

/// Forward launches into the driver. Once the driver has stopped, complete
/// the handle on the spot so the scheduler is not left waiting.
fn launch_handler(
    identifier: TaskIdentifier,
    commands: mpsc::UnboundedSender<Command>,
) -> crate::ports::LaunchHandler {
    Box::new(move |task| {
        if let Err(SendError(Command::Launch(task))) = commands.send(Command::Launch(task)) {
            warn!(task = %identifier, "refresh driver has stopped; completing launch immediately");
            task.mark_completed(true);
        }
    })
}
