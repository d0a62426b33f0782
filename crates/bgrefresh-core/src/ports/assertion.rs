//! AssertionHolder port - プロセスを background で生かしておく仕組み
//!
//! `beginBackgroundTask` / `endBackgroundTask` に相当する。

use crate::domain::AssertionToken;

/// Invoked by the host shortly before it suspends the process while an
/// assertion is still held.
pub type ExpirationHandler = Box<dyn FnOnce() + Send>;

/// Keeps background execution alive while a token is held.
pub trait AssertionHolder: Send + Sync {
    fn acquire(&self, on_expire: ExpirationHandler) -> AssertionToken;

    /// Releasing an unknown or already released token is a no-op.
    fn release(&self, token: AssertionToken);
}
