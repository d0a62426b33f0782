//! Status - manager の状態のスナップショット
//!
//! driver がコマンドを 1 件処理するたびに watch channel へ流す。

use serde::Serialize;

use crate::domain::{CyclePhase, LaunchId, TaskIdentifier};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshStatus {
    pub identifier: TaskIdentifier,
    pub phase: CyclePhase,
    pub is_processing: bool,
    pub current_launch: Option<LaunchId>,
    pub assertion_held: bool,
    pub timer_armed: bool,
    /// An action is set and will run on the next launch.
    pub has_action: bool,
    /// Launch cycles marked completed so far.
    pub completed_cycles: u64,
    /// Requests accepted by the scheduler so far.
    pub submissions: u64,
    /// The driver has stopped; the handle no longer accepts commands.
    pub stopped: bool,
}

impl RefreshStatus {
    pub(crate) fn initial(identifier: TaskIdentifier) -> Self {
        Self {
            identifier,
            phase: CyclePhase::Idle,
            is_processing: false,
            current_launch: None,
            assertion_held: false,
            timer_armed: false,
            has_action: false,
            completed_cycles: 0,
            submissions: 0,
            stopped: false,
        }
    }

    pub fn has_current_task(&self) -> bool {
        self.current_launch.is_some()
    }
}
