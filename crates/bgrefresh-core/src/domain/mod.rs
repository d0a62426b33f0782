//! Domain model (identifiers, requests, cycle state, events, errors).
//!
//! ここには外部システムも tokio も出てこない。純粋な値とルールだけ。

pub mod errors;
pub mod events;
pub mod ids;
pub mod request;
pub mod state;

pub use self::errors::{ConfigError, ErrorKind, RefreshError, RegistrationError, SubmissionError};
pub use self::events::LifecycleEvent;
pub use self::ids::{AssertionToken, LaunchId, TaskIdentifier};
pub use self::request::RefreshRequest;
pub use self::state::{CyclePhase, ProcessingEdge};
