//! Cooldown tracking for remediation attempts.
//!
//! An action that has been attempted against an interface may not be
//! attempted again on that interface until the window has elapsed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_COOLDOWN_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct CooldownTracker {
    window: Duration,
    last_attempt: HashMap<(String, String), Instant>,
}

impl CooldownTracker {
    /// A zero window disables the cooldown
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_attempt: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Time left before `action` may run on `interface` again, if any
    pub fn remaining_at(&self, action: &str, interface: &str, now: Instant) -> Option<Duration> {
        if self.window.is_zero() {
            return None;
        }
        let last = self
            .last_attempt
            .get(&(action.to_string(), interface.to_string()))?;
        let elapsed = now.saturating_duration_since(*last);
        if elapsed < self.window {
            Some(self.window - elapsed)
        } else {
            None
        }
    }

    pub fn remaining(&self, action: &str, interface: &str) -> Option<Duration> {
        self.remaining_at(action, interface, Instant::now())
    }

    /// Record an attempt at `now`. Entries whose window has passed are dropped.
    pub fn record_at(&mut self, action: &str, interface: &str, now: Instant) {
        if self.window.is_zero() {
            return;
        }
        let window = self.window;
        self.last_attempt
            .retain(|_, last| now.saturating_duration_since(*last) < window);
        self.last_attempt
            .insert((action.to_string(), interface.to_string()), now);
    }

    /// Number of (action, interface) pairs currently tracked
    pub fn tracked(&self) -> usize {
        self.last_attempt.len()
    }

    /// Record an attempt starting now
    pub fn record(&mut self, action: &str, interface: &str) {
        self.record_at(action, interface, Instant::now());
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }
}
