//! Single-flight gate for access-token refresh.
//!
//! The first caller to [`RefreshGate::enter`] becomes the leader and performs
//! the refresh; everyone arriving while it is in flight is queued and gets the
//! leader's outcome. The queue only exists between refresh start and settle.
//!
//! Leaders settle explicitly. If a leader is dropped unsettled (its future was
//! cancelled, or it returned early), the guard clears the in-flight flag and
//! releases the queue with `RefreshAbandoned`.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::errors::ApiError;

pub type RefreshOutcome = Result<String, ApiError>;

#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Per-client refresh coordination state.
#[derive(Default)]
pub struct RefreshGate {
    state: Mutex<RefreshState>,
}

pub enum Ticket<'a> {
    Leader(LeaderGuard<'a>),
    Follower(oneshot::Receiver<RefreshOutcome>),
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> Ticket<'_> {
        let mut state = self.lock();
        if state.in_progress {
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            Ticket::Follower(rx)
        } else {
            state.in_progress = true;
            Ticket::Leader(LeaderGuard {
                gate: self,
                settled: false,
            })
        }
    }

    pub fn in_progress(&self) -> bool {
        self.lock().in_progress
    }

    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, outcome: RefreshOutcome) -> usize {
        let waiters = {
            let mut state = self.lock();
            state.in_progress = false;
            std::mem::take(&mut state.waiters)
        };
        let count = waiters.len();
        for waiter in waiters {
            // Receiver gone means that waiter timed out on its own.
            let _ = waiter.send(outcome.clone());
        }
        count
    }
}

pub struct LeaderGuard<'a> {
    gate: &'a RefreshGate,
    settled: bool,
}

impl LeaderGuard<'_> {
    /// Clear the in-flight flag and hand `outcome` to every queued waiter.
    /// Returns how many waiters were released.
    pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        self.gate.release(outcome)
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let released = self.gate.release(Err(ApiError::RefreshAbandoned));
            tracing::warn!(released, "token refresh abandoned, queued requests failed");
        }
    }
}

/// Wait for the leader's outcome, bounded by `timeout`.
pub async fn wait_for(rx: oneshot::Receiver<RefreshOutcome>, timeout: Duration) -> RefreshOutcome {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(ApiError::RefreshAbandoned),
        Err(_) => Err(ApiError::RefreshTimeout(timeout)),
    }
}
