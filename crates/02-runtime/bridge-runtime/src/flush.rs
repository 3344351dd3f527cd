//! Push-flush timing.
//!
//! Pull flushes happen whenever the host asks; this scheduler only decides when
//! the encoder may push the queue to the host on its own. A push is allowed once
//! `interval` has elapsed since the last handoff or dispatcher turn.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct FlushScheduler {
    interval: Duration,
    last_handoff: Duration,
    push_enabled: bool,
}

impl FlushScheduler {
    pub fn new(interval: Duration, now: Duration, push_enabled: bool) -> Self {
        Self {
            interval,
            last_handoff: now,
            push_enabled,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn push_enabled(&self) -> bool {
        self.push_enabled
    }

    /// Restarts the interval without handing anything off.
    pub fn restart(&mut self, now: Duration) {
        self.last_handoff = now;
    }

    /// Returns true and restarts the interval when a push is due.
    pub fn should_push(&mut self, now: Duration) -> bool {
        if !self.push_enabled || now.saturating_sub(self.last_handoff) < self.interval {
            return false;
        }
        self.last_handoff = now;
        true
    }
}
