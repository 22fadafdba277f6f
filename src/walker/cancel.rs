//! Cancellation token and caller context
//!
//! One token per traversal carries the reason it stopped. The first
//! `cancel` wins; later calls are no-ops. Idle workers sleep on the token's
//! condition variable, so a broadcast wakes them without waiting out their
//! backoff.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a traversal stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CancelReason {
    /// Outstanding-task counter reached zero
    Completed = 1,
    /// A goal heuristic fired
    GoalReached = 2,
    /// A visitor error with cancel-on-error, or a worker panic
    Error = 3,
    /// The caller cancelled
    External = 4,
    /// The caller's deadline passed
    DeadlineExceeded = 5,
}

impl CancelReason {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Completed),
            2 => Some(Self::GoalReached),
            3 => Some(Self::Error),
            4 => Some(Self::External),
            5 => Some(Self::DeadlineExceeded),
            _ => None,
        }
    }

    /// Whether work already handed off should still be finished
    pub fn drains(self) -> bool {
        matches!(self, Self::Completed | Self::GoalReached)
    }
}

#[derive(Debug, Default)]
struct Inner {
    reason: AtomicU8,
    lock: Mutex<()>,
    cond: Condvar,
}

/// Shared, first-wins cancellation signal
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Create a token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel with a reason; returns false if already cancelled
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let won = self
            .inner
            .reason
            .compare_exchange(0, reason as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            let _guard = self.inner.lock.lock();
            self.inner.cond.notify_all();
        }
        won
    }

    /// Check if the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.load(Ordering::Acquire) != 0
    }

    /// Reason recorded by the winning `cancel`
    pub fn reason(&self) -> Option<CancelReason> {
        CancelReason::from_u8(self.inner.reason.load(Ordering::Acquire))
    }

    /// Sleep up to `timeout`, returning early on cancellation
    ///
    /// Returns true if the token is cancelled on return.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if !self.is_cancelled() {
            self.inner.cond.wait_for(&mut guard, timeout);
        }
        self.is_cancelled()
    }
}

/// Caller-side cancellation and deadline for one traversal
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancelToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancelToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Cancel every traversal running under this context
    pub fn cancel(&self) {
        self.token.cancel(CancelReason::External);
    }

    /// Check if the caller cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check if the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// First reason this context asks a traversal to stop, if any
    pub fn stop_reason(&self) -> Option<CancelReason> {
        if self.is_cancelled() {
            Some(CancelReason::External)
        } else if self.is_expired() {
            Some(CancelReason::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Handle that can cancel this context from another thread
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }
}
