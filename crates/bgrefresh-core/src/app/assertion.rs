//! AssertionSlot - Execution Assertion Holder のラッパー
//!
//! 「どの launch cycle が取ったトークンか」を一緒に覚えておく。
//! 古い cycle の expiration 通知で新しい cycle のトークンを
//! 手放してしまわないようにするため。

use std::sync::Arc;

use crate::domain::{AssertionToken, LaunchId};
use crate::ports::{AssertionHolder, ExpirationHandler};

pub(crate) struct AssertionSlot {
    holder: Arc<dyn AssertionHolder>,
    held: Option<(LaunchId, AssertionToken)>,
}

impl AssertionSlot {
    pub(crate) fn new(holder: Arc<dyn AssertionHolder>) -> Self {
        Self { holder, held: None }
    }

    /// Acquire a token for `launch`. A token still held from an earlier
    /// cycle is released first.
    pub(crate) fn acquire(
        &mut self,
        launch: LaunchId,
        on_expire: ExpirationHandler,
    ) -> (AssertionToken, Option<AssertionToken>) {
        let previous = self.release();
        let token = self.holder.acquire(on_expire);
        self.held = Some((launch, token));
        (token, previous)
    }

    /// Release the held token, if any. Idempotent.
    pub(crate) fn release(&mut self) -> Option<AssertionToken> {
        let (_, token) = self.held.take()?;
        self.holder.release(token);
        Some(token)
    }

    pub(crate) fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Token held on behalf of `launch`.
    pub(crate) fn held_for(&self, launch: LaunchId) -> Option<AssertionToken> {
        match self.held {
            Some((owner, token)) if owner == launch => Some(token),
            _ => None,
        }
    }
}
