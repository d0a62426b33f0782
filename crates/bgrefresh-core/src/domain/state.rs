//! State - launch cycle の状態
//!
//! ```text
//! Idle ──launch──► Running ──processing=true──► Processing
//!   ▲                 │                             │
//!   │       timer (not processing)          processing=false
//!   │                 ▼                             ▼
//!   └──────────── Completed ◄───────────────────────┘
//! ```
//!
//! `Completed` is transient: the driver returns to `Idle` as soon as the
//! completion unit finishes, so it only shows up in events.

use serde::{Deserialize, Serialize};

/// Phase of the current launch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    /// No task in flight.
    Idle,

    /// A task is in flight and the auto-complete timer governs completion.
    Running,

    /// A task is in flight and the caller has claimed processing time.
    Processing,
}

impl CyclePhase {
    /// Derive the phase from the two pieces of state that define it.
    pub fn from_flags(has_task: bool, is_processing: bool) -> Self {
        match (has_task, is_processing) {
            (false, _) => CyclePhase::Idle,
            (true, false) => CyclePhase::Running,
            (true, true) => CyclePhase::Processing,
        }
    }
}

/// What a change of the processing flag asks the driver to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingEdge {
    /// true -> false: complete the task if one is in flight.
    Falling,
    /// false -> true: the timer loses its authority.
    Rising,
    /// Same value assigned again.
    Unchanged,
}

impl ProcessingEdge {
    pub fn between(previous: bool, next: bool) -> Self {
        match (previous, next) {
            (true, false) => ProcessingEdge::Falling,
            (false, true) => ProcessingEdge::Rising,
            _ => ProcessingEdge::Unchanged,
        }
    }
}
