//! Refresh configuration.
//!
//! JSON で読めるように秒数は浮動小数で持つ:
//!
//! ```json
//! { "identifier": "com.example.refresh",
//!   "auto_complete_delay_secs": 1.0,
//!   "background_fetch_delay_secs": 900 }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, TaskIdentifier};

/// Default time the timer waits before completing on its own.
pub const DEFAULT_AUTO_COMPLETE_DELAY: Duration = Duration::from_secs(1);

/// Default earliest-start offset for submitted requests.
pub const DEFAULT_BACKGROUND_FETCH_DELAY: Duration = Duration::ZERO;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Must match the identifier the host scheduler permits.
    pub identifier: TaskIdentifier,

    /// Wait before marking the task completed, unless processing is claimed.
    #[serde(
        rename = "auto_complete_delay_secs",
        default = "default_auto_complete_delay",
        serialize_with = "secs_f64::serialize",
        deserialize_with = "secs_f64::auto_complete_delay"
    )]
    pub auto_complete_delay: Duration,

    /// Earliest-start offset for the next request (the scheduler may wait longer).
    #[serde(
        rename = "background_fetch_delay_secs",
        default = "default_background_fetch_delay",
        serialize_with = "secs_f64::serialize",
        deserialize_with = "secs_f64::background_fetch_delay"
    )]
    pub background_fetch_delay: Duration,
}

fn default_auto_complete_delay() -> Duration {
    DEFAULT_AUTO_COMPLETE_DELAY
}

fn default_background_fetch_delay() -> Duration {
    DEFAULT_BACKGROUND_FETCH_DELAY
}

impl RefreshConfig {
    pub fn new(identifier: TaskIdentifier) -> Self {
        Self {
            identifier,
            auto_complete_delay: DEFAULT_AUTO_COMPLETE_DELAY,
            background_fetch_delay: DEFAULT_BACKGROUND_FETCH_DELAY,
        }
    }

    /// Parse from JSON. Identifier and delays are validated while parsing.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Convert a seconds value, rejecting negatives, NaN and infinity.
    pub fn delay_from_secs(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(ConfigError::InvalidDelay { field, value: secs });
        }
        Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDelay { field, value: secs })
    }
}

mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::RefreshConfig;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn auto_complete_delay<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        field("auto_complete_delay_secs", deserializer)
    }

    pub fn background_fetch_delay<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        field("background_fetch_delay_secs", deserializer)
    }

    fn field<'de, D: Deserializer<'de>>(name: &'static str, deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        RefreshConfig::delay_from_secs(name, secs).map_err(serde::de::Error::custom)
    }
}
