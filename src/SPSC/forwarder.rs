// Forwarding loop: drains one ring buffer and republishes every message onto another

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace, warn};

use super::idle::{IdleStrategy, YieldingIdleStrategy};
use super::{ControlledAction, RingBuffer};
use crate::error::{ForwardError, RingBufferError};

/// Messages taken from the inbound buffer per duty cycle unless configured otherwise.
pub const DEFAULT_READ_LIMIT: usize = 1;

/// What to do when the outbound buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackPressurePolicy {
    /// Stop the loop. The refused message stays in the inbound buffer.
    #[default]
    FailFast,
    /// Retry the write up to `max_attempts` more times, then stop as `FailFast` does.
    Retry { max_attempts: usize },
    /// Discard the message and carry on.
    Drop,
}

/// Counters accumulated by a [`Forwarder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub cycles: u64,
}

/// Copies `(type_id, payload)` verbatim from `inbound` to `outbound`.
///
/// The forwarder is the consumer of `inbound` and the producer of `outbound`; no other
/// thread may take either role while it runs.
pub struct Forwarder<'a, I = YieldingIdleStrategy> {
    inbound: &'a RingBuffer,
    outbound: &'a RingBuffer,
    idle: I,
    policy: BackPressurePolicy,
    read_limit: usize,
    stats: ForwarderStats,
}

impl<'a> Forwarder<'a> {
    pub fn new(inbound: &'a RingBuffer, outbound: &'a RingBuffer) -> Self {
        Self {
            inbound,
            outbound,
            idle: YieldingIdleStrategy,
            policy: BackPressurePolicy::default(),
            read_limit: DEFAULT_READ_LIMIT,
            stats: ForwarderStats::default(),
        }
    }
}

impl<'a, I: IdleStrategy> Forwarder<'a, I> {
    pub fn with_idle_strategy<J: IdleStrategy>(self, idle: J) -> Forwarder<'a, J> {
        Forwarder {
            inbound: self.inbound,
            outbound: self.outbound,
            idle,
            policy: self.policy,
            read_limit: self.read_limit,
            stats: self.stats,
        }
    }

    pub fn with_back_pressure_policy(mut self, policy: BackPressurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Messages drained per duty cycle, at least 1.
    pub fn with_read_limit(mut self, read_limit: usize) -> Self {
        self.read_limit = read_limit.max(1);
        self
    }

    pub fn stats(&self) -> ForwarderStats {
        self.stats
    }

    /// Run one duty cycle. Returns how many messages were taken off the inbound buffer.
    pub fn do_work(&mut self) -> Result<usize, ForwardError> {
        let outbound = self.outbound;
        let policy = self.policy;
        let mut failure: Option<RingBufferError> = None;
        let mut dropped = 0usize;

        let handled = self.inbound.controlled_read(
            |type_id, payload| {
                trace!(type_id, length = payload.len(), "forwarding message");
                let mut attempts = 0;
                loop {
                    let err = match outbound.write(type_id, payload) {
                        Ok(()) => return ControlledAction::Continue,
                        Err(err) => err,
                    };

                    match policy {
                        BackPressurePolicy::Retry { max_attempts }
                            if err.is_retryable() && attempts < max_attempts =>
                        {
                            attempts += 1;
                            std::hint::spin_loop();
                        }
                        BackPressurePolicy::Drop if err.is_retryable() => {
                            dropped += 1;
                            return ControlledAction::Continue;
                        }
                        _ => {
                            failure = Some(err);
                            return ControlledAction::Abort;
                        }
                    }
                }
            },
            self.read_limit,
        );

        self.stats.cycles += 1;
        self.stats.forwarded += (handled - dropped) as u64;
        self.stats.dropped += dropped as u64;
        if dropped > 0 {
            warn!(dropped, "outbound back-pressured, messages dropped");
        }

        match failure {
            Some(err) => {
                warn!(error = %err, "could not write to outbound");
                Err(ForwardError::Outbound(err))
            }
            None => Ok(handled),
        }
    }

    /// Run duty cycles until `running` is cleared or an outbound write fails.
    ///
    /// Cycles that move nothing hand control to the idle strategy.
    pub fn run(&mut self, running: &AtomicBool) -> Result<ForwarderStats, ForwardError> {
        debug!(read_limit = self.read_limit, policy = ?self.policy, "forwarder started");
        self.idle.reset();

        while running.load(Ordering::Acquire) {
            let work_count = self.do_work()?;
            self.idle.idle(work_count);
        }

        debug!(stats = ?self.stats, "forwarder stopped");
        Ok(self.stats)
    }
}
