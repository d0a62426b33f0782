//! InMemoryScheduler - 開発・テスト用のスケジューラ
//!
//! # 実装詳細
//! - 許可リスト（`permit`）に無い identifier の登録は拒否
//! - identifier ごとに pending request は 1 件（新しい提出で上書き）
//! - `launch` / `launch_due` で launch handler を手動で呼ぶ
//! - handler は lock の外で呼ぶ（handler から submit されても deadlock しない）

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{RefreshRequest, RegistrationError, SubmissionError, TaskIdentifier};
use crate::ports::{LaunchHandler, Scheduler, TaskHandle};

/// What happened to a handle the scheduler gave out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub identifier: TaskIdentifier,
    /// 1-based launch number within this scheduler.
    pub launch: u64,
    /// `None` when the handle was dropped without being completed.
    pub success: Option<bool>,
}

#[derive(Default)]
struct SchedulerState {
    /// `None` permits every identifier.
    permitted: Option<HashSet<TaskIdentifier>>,
    unavailable: bool,
    reject_with: Option<SubmissionError>,
    handlers: HashMap<TaskIdentifier, Arc<LaunchHandler>>,
    registrations: Vec<TaskIdentifier>,
    pending: HashMap<TaskIdentifier, RefreshRequest>,
    submissions: Vec<RefreshRequest>,
    completions: Vec<CompletionRecord>,
    launches: u64,
}

/// In-memory `Scheduler`.
#[derive(Clone, Default)]
pub struct InMemoryScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict registration and submission to the given identifiers.
    pub fn permit(self, identifier: TaskIdentifier) -> Self {
        self.lock()
            .permitted
            .get_or_insert_with(HashSet::new)
            .insert(identifier);
        self
    }

    /// Behave like a sandbox: every submission reports `Unavailable`.
    pub fn unavailable(self) -> Self {
        self.lock().unavailable = true;
        self
    }

    /// Reject every submission with `err`.
    pub fn reject_submissions_with(&self, err: SubmissionError) {
        self.lock().reject_with = Some(err);
    }

    pub fn registrations(&self) -> Vec<TaskIdentifier> {
        self.lock().registrations.clone()
    }

    pub fn submissions(&self) -> Vec<RefreshRequest> {
        self.lock().submissions.clone()
    }

    pub fn pending(&self, identifier: &TaskIdentifier) -> Option<RefreshRequest> {
        self.lock().pending.get(identifier).cloned()
    }

    pub fn completions(&self) -> Vec<CompletionRecord> {
        self.lock().completions.clone()
    }

    /// Invoke the launch handler for `identifier`, as the host would.
    ///
    /// Returns the launch number, or `None` if nothing is registered.
    /// Any pending request for the identifier is consumed.
    pub fn launch(&self, identifier: &TaskIdentifier) -> Option<u64> {
        let (handler, launch) = {
            let mut state = self.lock();
            let handler = Arc::clone(state.handlers.get(identifier)?);
            state.pending.remove(identifier);
            state.launches += 1;
            (handler, state.launches)
        };

        let handle = InMemoryTaskHandle {
            identifier: identifier.clone(),
            launch,
            state: Arc::clone(&self.state),
            completed: false,
        };
        handler(Box::new(handle));
        Some(launch)
    }

    /// Launch every pending request whose earliest start is at or before `now`.
    pub fn launch_due(&self, now: DateTime<Utc>) -> Vec<u64> {
        let due: Vec<TaskIdentifier> = {
            let state = self.lock();
            state
                .pending
                .values()
                .filter(|req| req.earliest_start.is_none_or(|at| at <= now))
                .map(|req| req.identifier.clone())
                .collect()
        };
        due.iter().filter_map(|id| self.launch(id)).collect()
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SchedulerState {
    fn is_permitted(&self, identifier: &TaskIdentifier) -> bool {
        self.permitted
            .as_ref()
            .is_none_or(|permitted| permitted.contains(identifier))
    }
}

#[async_trait]
impl Scheduler for InMemoryScheduler {
    fn register(
        &self,
        identifier: &TaskIdentifier,
        handler: LaunchHandler,
    ) -> Result<(), RegistrationError> {
        let mut state = self.lock();
        if !state.is_permitted(identifier) {
            return Err(RegistrationError::NotPermitted(identifier.clone()));
        }
        if state.handlers.contains_key(identifier) {
            return Err(RegistrationError::AlreadyRegistered(identifier.clone()));
        }
        state.handlers.insert(identifier.clone(), Arc::new(handler));
        state.registrations.push(identifier.clone());
        Ok(())
    }

    async fn submit(&self, request: RefreshRequest) -> Result<(), SubmissionError> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(SubmissionError::Unavailable);
        }
        if let Some(err) = &state.reject_with {
            return Err(err.clone());
        }
        if !state.is_permitted(&request.identifier) {
            return Err(SubmissionError::NotPermitted(request.identifier.clone()));
        }
        state.submissions.push(request.clone());
        state.pending.insert(request.identifier.clone(), request);
        Ok(())
    }
}

/// Handle given to launch handlers by `InMemoryScheduler`.
struct InMemoryTaskHandle {
    identifier: TaskIdentifier,
    launch: u64,
    state: Arc<Mutex<SchedulerState>>,
    completed: bool,
}

impl InMemoryTaskHandle {
    fn record(&self, success: Option<bool>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.completions.push(CompletionRecord {
            identifier: self.identifier.clone(),
            launch: self.launch,
            success,
        });
    }
}

impl TaskHandle for InMemoryTaskHandle {
    fn identifier(&self) -> &TaskIdentifier {
        &self.identifier
    }

    fn mark_completed(mut self: Box<Self>, success: bool) {
        self.completed = true;
        self.record(Some(success));
    }
}

impl Drop for InMemoryTaskHandle {
    fn drop(&mut self) {
        if !self.completed {
            self.record(None);
        }
    }
}
