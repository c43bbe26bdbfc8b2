//! Fixed-interval reconnect timing.
//!
//! The node has no operator to escalate to, so it never gives up: every failed attempt
//! schedules the next one a fixed interval later. No jitter, no growth.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    interval: Duration,
    next_attempt: Option<Instant>,
    attempts: u64,
}

impl ReconnectPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_attempt: None,
            attempts: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Consecutive failed attempts since the last time the session became ready.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn next_attempt(&self) -> Option<Instant> {
        self.next_attempt
    }

    /// Whether an attempt may start at `now`. With nothing scheduled the answer is yes.
    pub fn due(&self, now: Instant) -> bool {
        match self.next_attempt {
            Some(at) => now >= at,
            None => true,
        }
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.attempts += 1;
        self.next_attempt = Some(now + self.interval);
        warn!(
            "Connect attempt {} failed, trying again in {} sec.",
            self.attempts,
            self.interval.as_secs_f32()
        );
    }

    pub fn record_success(&mut self) {
        if self.attempts > 0 {
            info!("Connected after {} failed attempts", self.attempts);
        }
        self.attempts = 0;
        self.next_attempt = None;
    }

    /// A live session dropped: retry on the very next tick.
    pub fn connection_lost(&mut self, now: Instant) {
        self.next_attempt = Some(now);
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
