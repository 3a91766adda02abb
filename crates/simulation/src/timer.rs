//! Manually fired round timer.

use hotstuff_core::{RoundTimer, TimerTicket};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Remembers the armed ticket; the runner decides when it fires.
#[derive(Debug, Clone, Default)]
pub struct SimTimer {
    armed: Arc<Mutex<Option<TimerTicket>>>,
    arms: Arc<Mutex<u64>>,
}

impl SimTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the armed ticket, leaving the timer disarmed.
    pub fn take(&self) -> Option<TimerTicket> {
        self.armed.lock().take()
    }

    pub fn armed(&self) -> Option<TimerTicket> {
        *self.armed.lock()
    }

    /// How many times the timer has been armed.
    pub fn arm_count(&self) -> u64 {
        *self.arms.lock()
    }
}

impl RoundTimer for SimTimer {
    fn arm(&mut self, ticket: TimerTicket, _timeout: Duration) {
        *self.armed.lock() = Some(ticket);
        *self.arms.lock() += 1;
    }

    fn cancel(&mut self) {
        self.armed.lock().take();
    }
}
