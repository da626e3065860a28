//! Idle strategies for duty-cycle loops such as the [`Forwarder`](super::Forwarder).
//!
//! A loop reports how much work its last cycle did; the strategy decides what to do
//! when that was nothing.

use std::thread;
use std::time::Duration;

use crossbeam_utils::Backoff;

pub trait IdleStrategy {
    /// Called after every duty cycle with the amount of work it performed.
    fn idle(&mut self, work_count: usize);

    /// Forget any accumulated backoff state.
    fn reset(&mut self) {}
}

/// Yield the processor after a cycle that did nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldingIdleStrategy;

impl IdleStrategy for YieldingIdleStrategy {
    fn idle(&mut self, work_count: usize) {
        if work_count > 0 {
            return;
        }
        thread::yield_now();
    }
}

/// Spin with a CPU hint. Lowest latency, burns a core.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinIdleStrategy;

impl IdleStrategy for BusySpinIdleStrategy {
    fn idle(&mut self, work_count: usize) {
        if work_count == 0 {
            std::hint::spin_loop();
        }
    }
}

/// Return immediately; the caller owns the pacing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpIdleStrategy;

impl IdleStrategy for NoOpIdleStrategy {
    fn idle(&mut self, _work_count: usize) {}
}

/// Spin, then yield, then park for `max_park` per idle cycle until work shows up.
#[derive(Debug)]
pub struct BackoffIdleStrategy {
    backoff: Backoff,
    max_park: Duration,
}

impl BackoffIdleStrategy {
    pub fn new(max_park: Duration) -> Self {
        Self {
            backoff: Backoff::new(),
            max_park,
        }
    }
}

impl Default for BackoffIdleStrategy {
    fn default() -> Self {
        Self::new(Duration::from_micros(100))
    }
}

impl IdleStrategy for BackoffIdleStrategy {
    fn idle(&mut self, work_count: usize) {
        if work_count > 0 {
            self.backoff.reset();
        } else if self.backoff.is_completed() {
            thread::park_timeout(self.max_park);
        } else {
            self.backoff.snooze();
        }
    }

    fn reset(&mut self) {
        self.backoff.reset();
    }
}
