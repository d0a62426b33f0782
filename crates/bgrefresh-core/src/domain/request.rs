//! RefreshRequest - スケジューラへの提出単位
//!
//! `BGAppRefreshTaskRequest` に相当する。earliest start は
//! `background_fetch_delay > 0` のときだけ付く。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskIdentifier;

/// A request asking the scheduler to launch `identifier` at some future time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub identifier: TaskIdentifier,

    /// The scheduler must not launch before this instant. `None` means
    /// "as soon as the scheduler sees fit".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_start: Option<DateTime<Utc>>,
}

impl RefreshRequest {
    /// Build a request relative to `now`.
    ///
    /// A zero delay leaves `earliest_start` unset.
    pub fn new(identifier: TaskIdentifier, now: DateTime<Utc>, delay: Duration) -> Self {
        let earliest_start = if delay.is_zero() {
            None
        } else {
            // Durations beyond chrono's range saturate to the far future.
            let offset = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
            Some(now.checked_add_signed(offset).unwrap_or(DateTime::<Utc>::MAX_UTC))
        };
        Self {
            identifier,
            earliest_start,
        }
    }
}
