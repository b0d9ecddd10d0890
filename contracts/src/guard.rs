//! Reentrancy guard for state-changing entry points.
//!
//! The engine calls out to custody, the ledger and contract code while an
//! origination is in flight. Any of them may try to call back in. The guard
//! is held for the whole operation and released when the token drops, on
//! every exit path.
//!
//! Operations are serialized: a caller on another thread waits its turn. Only
//! a call made from inside a running operation, on the thread that holds the
//! guard, is turned away.

use std::cell::Cell;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("reentrant call")]
pub struct ReentrantCall;

#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    /// `true` while an operation is running under the lock.
    lock: ReentrantMutex<Cell<bool>>,
}

/// Proof that the guard is held. Releases on drop.
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct Entered<'a> {
    token: ReentrantMutexGuard<'a, Cell<bool>>,
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.token.set(false);
    }
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard, waiting for any operation running on another thread.
    ///
    /// Fails without blocking when the current thread is already inside an
    /// operation.
    pub fn enter(&self) -> Result<Entered<'_>, ReentrantCall> {
        let token = self.lock.lock();
        if token.get() {
            return Err(ReentrantCall);
        }
        token.set(true);
        Ok(Entered { token })
    }

    #[cfg(test)]
    fn is_entered(&self) -> bool {
        self.lock.is_locked()
    }
}
