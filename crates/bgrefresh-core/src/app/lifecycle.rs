//! Lifecycle driver - launch cycle の状態機械
//!
//! manager の状態はすべてこの driver task の中にあり、コマンドを 1 件ずつ
//! 処理する。これで single-flight と「completion はちょうど 1 回」が
//! ロックなしで守られる。
//!
//! # フロー
//! 1. background 突入 → request を提出
//! 2. launch → assertion 取得 → timer 起動 → action 呼び出し
//! 3. timer 発火（processing でなければ）か processing の true→false で completion。
//!    timer 発火時は processing 中でも force-end する
//! 4. completion: task を外す → background なら再提出 → 完了通知 → force-end
//! 5. force-end: timer キャンセル + assertion 解放（何度呼んでもよい）

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::app::assertion::AssertionSlot;
use crate::app::handle::{Action, Command, RefreshHandle};
use crate::app::status::RefreshStatus;
use crate::app::timer::AutoCompleteTimer;
use crate::domain::{
    CyclePhase, ErrorKind, LaunchId, LifecycleEvent, ProcessingEdge, RefreshError,
    RefreshRequest, SubmissionError, TaskIdentifier,
};
use crate::ports::{BackgroundEntered, Clock, EventSink, HostEnvironment, IdGenerator, Scheduler, TaskHandle};

/// External collaborators the driver talks to.
pub(crate) struct Ports {
    pub scheduler: Arc<dyn Scheduler>,
    pub host: Arc<dyn HostEnvironment>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub events: Arc<dyn EventSink>,
}

/// The task the scheduler handed us for the current cycle.
struct ActiveLaunch {
    id: LaunchId,
    task: Box<dyn TaskHandle>,
}

/// What to do after a command has been handled.
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Driver {
    identifier: TaskIdentifier,
    auto_complete_delay: Duration,
    background_fetch_delay: Duration,
    action: Option<Action>,
    is_processing: bool,
    current: Option<ActiveLaunch>,
    assertion: AssertionSlot,
    timer: Option<(LaunchId, AutoCompleteTimer)>,
    completed_cycles: u64,
    submissions: u64,
    ports: Ports,
    /// Given to the action; also the source of sender clones for callbacks.
    handle: RefreshHandle,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Sent by the action while it ran; handled before the channel.
    inline: VecDeque<Command>,
    background: Option<broadcast::Receiver<BackgroundEntered>>,
    status: watch::Sender<RefreshStatus>,
}

pub(crate) struct DriverParts {
    pub identifier: TaskIdentifier,
    pub auto_complete_delay: Duration,
    pub background_fetch_delay: Duration,
    pub action: Option<Action>,
    pub assertion: AssertionSlot,
    pub ports: Ports,
    pub handle: RefreshHandle,
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub background: broadcast::Receiver<BackgroundEntered>,
    pub status: watch::Sender<RefreshStatus>,
}

impl Driver {
    pub(crate) fn new(parts: DriverParts) -> Self {
        Self {
            identifier: parts.identifier,
            auto_complete_delay: parts.auto_complete_delay,
            background_fetch_delay: parts.background_fetch_delay,
            action: parts.action,
            is_processing: false,
            current: None,
            assertion: parts.assertion,
            timer: None,
            completed_cycles: 0,
            submissions: 0,
            ports: parts.ports,
            handle: parts.handle,
            commands: parts.commands,
            inline: VecDeque::new(),
            background: Some(parts.background),
            status: parts.status,
        }
    }

    /// Process commands until shutdown or a fatal submission error.
    pub(crate) async fn run(mut self) -> Result<(), RefreshError> {
        debug!(task = %self.identifier, "refresh driver started");
        self.publish();

        let result = loop {
            if let Some(command) = self.inline.pop_front() {
                let flow = self.handle_command(command).await;
                self.publish();
                match flow {
                    Ok(Flow::Continue) => continue,
                    Ok(Flow::Stop) => break Ok(()),
                    Err(err) => break Err(RefreshError::from(err)),
                }
            }

            // signal first: a command sent after entering background sees the submission
            let flow = tokio::select! {
                biased;
                signal = next_background_entry(&mut self.background) => match signal {
                    Some(()) => self.on_background_entered().await.map(|_| Flow::Continue),
                    None => {
                        debug!(task = %self.identifier, "background signal closed; no longer observing");
                        self.background = None;
                        Ok(Flow::Continue)
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => Ok(Flow::Stop),
                },
            };

            self.publish();
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break Ok(()),
                Err(err) => break Err(RefreshError::from(err)),
            }
        };

        self.teardown();
        result
    }

    async fn handle_command(&mut self, command: Command) -> Result<Flow, SubmissionError> {
        match command {
            Command::Launch(task) => self.on_launch(task),
            Command::SetProcessing(value) => self.set_processing(value).await?,
            Command::SetAction(action) => self.action = action,
            Command::TimerFired { launch } => self.on_timer_fired(launch).await?,
            Command::AssertionExpired { launch } => self.on_assertion_expired(launch),
            Command::Status(reply) => {
                // ignore send error: the caller stopped waiting
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }

    async fn on_background_entered(&mut self) -> Result<bool, SubmissionError> {
        debug!(task = %self.identifier, "entered background");
        self.submit_request().await
    }

    /// Submit the next request. `Ok(false)` when scheduling is unavailable here.
    async fn submit_request(&mut self) -> Result<bool, SubmissionError> {
        let request = RefreshRequest::new(
            self.identifier.clone(),
            self.ports.clock.now(),
            self.background_fetch_delay,
        );
        let earliest_start = request.earliest_start;

        match self.ports.scheduler.submit(request).await {
            Ok(()) => {
                self.submissions += 1;
                info!(task = %self.identifier, ?earliest_start, "submitted background refresh request");
                self.emit(LifecycleEvent::Submitted {
                    task: self.identifier.clone(),
                    earliest_start,
                });
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::Expected => {
                info!(task = %self.identifier, %err, "background refresh unavailable; request skipped");
                self.emit(LifecycleEvent::SubmissionSkipped {
                    task: self.identifier.clone(),
                });
                Ok(false)
            }
            Err(err) => {
                error!(task = %self.identifier, %err, "failed submitting background refresh request");
                Err(err)
            }
        }
    }

    fn on_launch(&mut self, task: Box<dyn TaskHandle>) {
        if let Some(active) = &self.current {
            warn!(
                task = %self.identifier,
                active = %active.id,
                "launch while a cycle is in flight; completing the new one immediately"
            );
            self.emit(LifecycleEvent::DuplicateLaunch { active: active.id });
            task.mark_completed(true);
            return;
        }

        let launch = self.ports.ids.generate_launch_id();
        info!(
            task = %self.identifier,
            handle = %task.identifier(),
            %launch,
            processing = self.is_processing,
            "background refresh launched"
        );
        self.current = Some(ActiveLaunch { id: launch, task });
        self.emit(LifecycleEvent::Launched { launch });

        let expire_handle = self.handle.clone();
        let (token, previous) = self.assertion.acquire(
            launch,
            Box::new(move || {
                // ignore send error: nothing left to release
                let _ = expire_handle.send(Command::AssertionExpired { launch });
            }),
        );
        if let Some(previous) = previous {
            self.emit(LifecycleEvent::AssertionReleased { token: previous });
        }
        self.emit(LifecycleEvent::AssertionAcquired { token });

        // a stale timer cannot still be armed here, but never keep two
        self.cancel_timer();
        let fire_handle = self.handle.clone();
        let timer = AutoCompleteTimer::arm(self.auto_complete_delay, move || {
            let _ = fire_handle.send(Command::TimerFired { launch });
        });
        self.timer = Some((launch, timer));
        self.emit(LifecycleEvent::TimerArmed {
            delay: self.auto_complete_delay,
        });

        if let Some(action) = self.action.clone() {
            self.emit(LifecycleEvent::ActionInvoked { launch });
            self.handle.begin_inline();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| action(&self.handle)));
            self.inline.extend(self.handle.end_inline());

            // the timer still governs completion
            if let Err(payload) = outcome {
                let message = panic_message(&*payload);
                error!(task = %self.identifier, %launch, %message, "refresh action panicked");
                self.emit(LifecycleEvent::ActionPanicked { launch, message });
            }
        }
    }

    async fn set_processing(&mut self, value: bool) -> Result<(), SubmissionError> {
        let previous = self.is_processing;
        self.is_processing = value;

        match ProcessingEdge::between(previous, value) {
            ProcessingEdge::Falling => {
                self.emit(LifecycleEvent::ProcessingChanged { value });
                if self.current.is_some() {
                    return self.complete().await;
                }
                debug!(task = %self.identifier, "processing cleared with no task in flight");
            }
            ProcessingEdge::Rising => {
                self.emit(LifecycleEvent::ProcessingChanged { value });
                debug!(task = %self.identifier, "processing claimed");
            }
            ProcessingEdge::Unchanged => {}
        }
        Ok(())
    }

    async fn on_timer_fired(&mut self, launch: LaunchId) -> Result<(), SubmissionError> {
        match &self.timer {
            Some((owner, _)) if *owner == launch => {}
            _ => {
                debug!(task = %self.identifier, %launch, "ignoring stale timer");
                return Ok(());
            }
        }
        // fired: the slot is cleared without a cancel
        self.timer = None;
        self.emit(LifecycleEvent::TimerFired {
            processing: self.is_processing,
        });

        let result = if self.is_processing {
            // the caller completes by clearing processing
            debug!(task = %self.identifier, %launch, "timer fired while processing; releasing assertion only");
            Ok(())
        } else {
            debug!(task = %self.identifier, %launch, "auto-completing background refresh");
            self.complete().await
        };
        self.force_end();
        result
    }

    fn on_assertion_expired(&mut self, launch: LaunchId) {
        let Some(token) = self.assertion.held_for(launch) else {
            debug!(task = %self.identifier, %launch, "ignoring stale assertion expiration");
            return;
        };
        warn!(task = %self.identifier, %launch, "execution assertion expiring; ending background work");
        self.emit(LifecycleEvent::AssertionExpired { token });
        self.force_end();
    }

    /// Mark the in-flight task completed. Exactly once per cycle: the task is
    /// taken out of `current` before anything else happens.
    async fn complete(&mut self) -> Result<(), SubmissionError> {
        let Some(active) = self.current.take() else {
            return Ok(());
        };

        let mut result = Ok(());
        let rescheduled = if self.ports.host.is_backgrounded() {
            match self.submit_request().await {
                Ok(submitted) => submitted,
                Err(err) => {
                    result = Err(err);
                    false
                }
            }
        } else {
            false
        };

        active.task.mark_completed(true);
        self.completed_cycles += 1;
        info!(task = %self.identifier, launch = %active.id, rescheduled, "background refresh completed");
        self.emit(LifecycleEvent::Completed {
            launch: active.id,
            rescheduled,
        });

        self.force_end();
        result
    }

    /// Cancel the timer and release the assertion. Idempotent.
    fn force_end(&mut self) {
        self.cancel_timer();
        if let Some(token) = self.assertion.release() {
            debug!(task = %self.identifier, %token, "execution assertion released");
            self.emit(LifecycleEvent::AssertionReleased { token });
        }
    }

    fn cancel_timer(&mut self) {
        if let Some((_, timer)) = self.timer.take() {
            timer.cancel();
            self.emit(LifecycleEvent::TimerCanceled);
        }
    }

    /// Stop observing, finish whatever is in flight, and drain the queue so no
    /// task handle is dropped without being completed.
    fn teardown(&mut self) {
        self.background = None;

        if let Some(active) = self.current.take() {
            info!(task = %self.identifier, launch = %active.id, "completing in-flight task on shutdown");
            active.task.mark_completed(true);
            self.completed_cycles += 1;
            self.emit(LifecycleEvent::Completed {
                launch: active.id,
                rescheduled: false,
            });
        }
        self.force_end();

        self.commands.close();
        let mut leftover = std::mem::take(&mut self.inline);
        while let Some(command) = leftover.pop_front().or_else(|| self.commands.try_recv().ok()) {
            match command {
                Command::Launch(task) => {
                    warn!(task = %self.identifier, "launch arrived during shutdown; completing immediately");
                    task.mark_completed(true);
                }
                Command::Status(reply) => {
                    let _ = reply.send(self.stopped_snapshot());
                }
                _ => {}
            }
        }

        let stopped = self.stopped_snapshot();
        self.status.send_replace(stopped);
        debug!(task = %self.identifier, "refresh driver stopped");
    }

    fn snapshot(&self) -> RefreshStatus {
        let current_launch = self.current.as_ref().map(|active| active.id);
        RefreshStatus {
            identifier: self.identifier.clone(),
            phase: CyclePhase::from_flags(current_launch.is_some(), self.is_processing),
            is_processing: self.is_processing,
            current_launch,
            assertion_held: self.assertion.is_held(),
            timer_armed: self.timer.is_some(),
            has_action: self.action.is_some(),
            completed_cycles: self.completed_cycles,
            submissions: self.submissions,
            stopped: false,
        }
    }

    fn stopped_snapshot(&self) -> RefreshStatus {
        RefreshStatus {
            stopped: true,
            ..self.snapshot()
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.snapshot());
    }

    fn emit(&self, event: LifecycleEvent) {
        self.ports.events.emit(event);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Next background-entry signal, or `None` once the sender is gone.
/// Pending forever when not observing.
async fn next_background_entry(
    rx: &mut Option<broadcast::Receiver<BackgroundEntered>>,
) -> Option<()> {
    let Some(rx) = rx.as_mut() else {
        return std::future::pending().await;
    };
    match rx.recv().await {
        Ok(BackgroundEntered) => Some(()),
        // 取りこぼしても「background に入った」ことに変わりはない
        Err(RecvError::Lagged(_)) => Some(()),
        Err(RecvError::Closed) => None,
    }
}
