//! Scheduler port - 外部スケジューラ（BGTaskScheduler 相当）
//!
//! スケジューラ自身のキューイングや公平性はこちらの関心外。
//! ここでは登録・提出・launch handler の形だけを決める。

use async_trait::async_trait;

use crate::domain::{RefreshRequest, RegistrationError, SubmissionError, TaskIdentifier};

/// The in-flight task the scheduler hands to a launch handler.
///
/// `mark_completed` consumes the handle, so one handle can only ever be
/// completed once.
pub trait TaskHandle: Send {
    fn identifier(&self) -> &TaskIdentifier;

    /// Tell the scheduler this launch is finished.
    fn mark_completed(self: Box<Self>, success: bool);
}

/// Called by the scheduler when it decides to run a registered task.
///
/// The scheduler may call this from any thread; implementations forward the
/// handle into their own execution context.
pub type LaunchHandler = Box<dyn Fn(Box<dyn TaskHandle>) + Send + Sync>;

/// Scheduler port (interface).
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Register the launch handler for `identifier`.
    ///
    /// Fails when the host configuration does not permit the identifier.
    fn register(
        &self,
        identifier: &TaskIdentifier,
        handler: LaunchHandler,
    ) -> Result<(), RegistrationError>;

    /// Ask for a future launch.
    async fn submit(&self, request: RefreshRequest) -> Result<(), SubmissionError>;
}
