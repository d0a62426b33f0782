//! InMemoryAssertions - 開発・テスト用の assertion holder
//!
//! `expire_all` でホストの「もうすぐ suspend する」通知を再現する。
//! expiration handler は lock の外で呼ぶ。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::AssertionToken;
use crate::ports::{AssertionHolder, ExpirationHandler};

#[derive(Default)]
struct AssertionState {
    next: u64,
    /// Held tokens. The handler is taken once it has been fired.
    active: HashMap<AssertionToken, Option<ExpirationHandler>>,
    acquired: u64,
    released: u64,
}

#[derive(Clone, Default)]
pub struct InMemoryAssertions {
    state: Arc<Mutex<AssertionState>>,
}

impl InMemoryAssertions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired(&self) -> u64 {
        self.lock().acquired
    }

    pub fn released(&self) -> u64 {
        self.lock().released
    }

    /// Number of tokens currently held.
    pub fn held(&self) -> usize {
        self.lock().active.len()
    }

    /// Fire the expiration handler of every held token.
    ///
    /// Tokens stay held until their owner releases them.
    pub fn expire_all(&self) -> usize {
        let handlers: Vec<ExpirationHandler> = {
            let mut state = self.lock();
            state.active.values_mut().filter_map(Option::take).collect()
        };
        let fired = handlers.len();
        for handler in handlers {
            handler();
        }
        fired
    }

    fn lock(&self) -> MutexGuard<'_, AssertionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AssertionHolder for InMemoryAssertions {
    fn acquire(&self, on_expire: ExpirationHandler) -> AssertionToken {
        let mut state = self.lock();
        state.next += 1;
        let token = AssertionToken::new(state.next);
        state.active.insert(token, Some(on_expire));
        state.acquired += 1;
        token
    }

    fn release(&self, token: AssertionToken) {
        let mut state = self.lock();
        if state.active.remove(&token).is_some() {
            state.released += 1;
        }
    }
}
