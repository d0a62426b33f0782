//! Events - launch cycle で発生するイベント
//!
//! `EventSink` port に流され、テストではトレースの検証に使う。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ids::{AssertionToken, LaunchId, TaskIdentifier};

/// A step of the lifecycle, in the order the driver performed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Registered {
        task: TaskIdentifier,
    },
    Submitted {
        task: TaskIdentifier,
        earliest_start: Option<DateTime<Utc>>,
    },
    /// Scheduling is unavailable here; the request was dropped on purpose.
    SubmissionSkipped {
        task: TaskIdentifier,
    },
    Launched {
        launch: LaunchId,
    },
    /// A launch arrived while another cycle was still in flight.
    DuplicateLaunch {
        active: LaunchId,
    },
    AssertionAcquired {
        token: AssertionToken,
    },
    TimerArmed {
        #[serde(with = "duration_millis")]
        delay: Duration,
    },
    ActionInvoked {
        launch: LaunchId,
    },
    /// The action panicked; the timer decides completion.
    ActionPanicked {
        launch: LaunchId,
        message: String,
    },
    ProcessingChanged {
        value: bool,
    },
    TimerFired {
        processing: bool,
    },
    Completed {
        launch: LaunchId,
        rescheduled: bool,
    },
    TimerCanceled,
    AssertionReleased {
        token: AssertionToken,
    },
    AssertionExpired {
        token: AssertionToken,
    },
}

impl LifecycleEvent {
    /// Short name, handy for comparing traces.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Registered { .. } => "registered",
            LifecycleEvent::Submitted { .. } => "submitted",
            LifecycleEvent::SubmissionSkipped { .. } => "submission_skipped",
            LifecycleEvent::Launched { .. } => "launched",
            LifecycleEvent::DuplicateLaunch { .. } => "duplicate_launch",
            LifecycleEvent::AssertionAcquired { .. } => "assertion_acquired",
            LifecycleEvent::TimerArmed { .. } => "timer_armed",
            LifecycleEvent::ActionInvoked { .. } => "action_invoked",
            LifecycleEvent::ActionPanicked { .. } => "action_panicked",
            LifecycleEvent::ProcessingChanged { .. } => "processing_changed",
            LifecycleEvent::TimerFired { .. } => "timer_fired",
            LifecycleEvent::Completed { .. } => "completed",
            LifecycleEvent::TimerCanceled => "timer_canceled",
            LifecycleEvent::AssertionReleased { .. } => "assertion_released",
            LifecycleEvent::AssertionExpired { .. } => "assertion_expired",
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
