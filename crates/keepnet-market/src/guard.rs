//! Re-entrancy guard around every mutating market entry point.
//!
//! The guard serializes mutating operations and remembers which thread is inside
//! one. A second entry from that same thread (a payout sink calling back into the
//! market, say) is rejected with [`MarketError::Reentrancy`]; entries from other
//! threads wait for the running operation to finish. The returned token releases
//! the guard on drop, so early returns and `?` release it too.

use crate::error::{MarketError, Result};
use parking_lot::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use tracing::warn;

#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    holder: Mutex<Option<ThreadId>>,
    gate: Mutex<()>,
}

/// Proof that the guard is held; releasing happens on drop.
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct GuardToken<'a> {
    guard: &'a ReentrancyGuard,
    _gate: MutexGuard<'a, ()>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, operation: &'static str) -> Result<GuardToken<'_>> {
        let me = thread::current().id();
        if *self.holder.lock() == Some(me) {
            warn!(operation, "🚫 Re-entrant call rejected");
            return Err(MarketError::Reentrancy(operation));
        }

        let gate = self.gate.lock();
        *self.holder.lock() = Some(me);
        Ok(GuardToken {
            guard: self,
            _gate: gate,
        })
    }

    pub fn is_held(&self) -> bool {
        self.holder.lock().is_some()
    }
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        *self.guard.holder.lock() = None;
    }
}
