//! Errors - エラー型と分類
//!
//! - `RegistrationError`: 構築時の致命的エラー（リトライしない）
//! - `SubmissionError`: sandbox では no-op、それ以外は設定不備として致命的
//! - `ConfigError`: 設定値の検証エラー
//! - `RefreshError`: 埋め込み側に返す総称エラー
//!
//! launch〜completion の経路（4.3〜4.6）ではエラーを返さない。
//! 順序のおかしい呼び出しは no-op として扱う。

use thiserror::Error;

use super::ids::TaskIdentifier;

/// ErrorKind は運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Expected in this environment; logged and ignored.
    Expected,
    /// Setup defect; surfaced to the embedding application, never retried.
    Fatal,
}

/// The scheduler refused to register a launch handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("task identifier '{0}' is not permitted by the host configuration")]
    NotPermitted(TaskIdentifier),

    #[error("a launch handler for '{0}' is already registered")]
    AlreadyRegistered(TaskIdentifier),
}

/// The scheduler rejected or cannot accept a submission request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    /// Background scheduling does not exist here (sandbox, simulator, ...).
    #[error("background scheduling is unavailable in this environment")]
    Unavailable,

    #[error("task identifier '{0}' is not permitted by the host configuration")]
    NotPermitted(TaskIdentifier),

    #[error("too many pending requests for '{0}'")]
    TooManyPendingRequests(TaskIdentifier),

    #[error("scheduler rejected the request: {0}")]
    Rejected(String),
}

impl SubmissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmissionError::Unavailable => ErrorKind::Expected,
            SubmissionError::NotPermitted(_)
            | SubmissionError::TooManyPendingRequests(_)
            | SubmissionError::Rejected(_) => ErrorKind::Fatal,
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("task identifier must not be empty")]
    EmptyIdentifier,

    #[error("{field} must be a finite, non-negative number of seconds (got {value})")]
    InvalidDelay { field: &'static str, value: f64 },

    #[error("invalid configuration: {0}")]
    Parse(String),
}

/// Errors surfaced by the refresh manager to the embedding application.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error("fatal submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("refresh driver for '{0}' has stopped")]
    DriverGone(TaskIdentifier),

    #[error("missing port: {0}. Call the matching builder method before build().")]
    MissingPort(&'static str),

    #[error("no tokio runtime is running; build() must be called from within one")]
    NoRuntime,
}
