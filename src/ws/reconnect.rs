//! Reconnect delay scheduling.

use std::time::Duration;

use backoff::backoff::Backoff;
use rand::Rng as _;

/// Upper bound on the reconnect delay, in seconds.
const MAX_BACKOFF_SECS: u64 = 30;

/// Delay before reconnect `attempt`: `min(2^attempt - 1, 30)` seconds.
///
/// The sequence for attempts `1, 2, 3, ...` is `1s, 3s, 7s, 15s, 30s, 30s, ...`.
#[must_use]
pub fn reconnect_delay(attempt: u32) -> Duration {
    let secs = 1_u64
        .checked_shl(attempt)
        .map_or(MAX_BACKOFF_SECS, |power| (power - 1).min(MAX_BACKOFF_SECS));
    Duration::from_secs(secs)
}

/// Attempt counter plus budget for one connection manager.
///
/// The counter starts at 1 for the initial connection, is [`reset`](Backoff::reset) to 1 whenever
/// a socket opens and is [`advance`](Self::advance)d each time a scheduled reconnect fires.
/// [`next_backoff`](Backoff::next_backoff) returns `None` once the counter reaches the budget.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    attempt: u32,
    max_attempts: u32,
    jitter: bool,
}

impl ReconnectBackoff {
    #[must_use]
    pub fn new(max_attempts: u32, jitter: bool) -> Self {
        Self {
            attempt: 1,
            max_attempts,
            jitter,
        }
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Move on to the next attempt. Called when a scheduled reconnect fires.
    pub fn advance(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
    }
}

impl Backoff for ReconnectBackoff {
    fn reset(&mut self) {
        self.attempt = 1;
    }

    /// Delay for the current attempt. Does not advance the counter.
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let delay = reconnect_delay(self.attempt);
        if !self.jitter {
            return Some(delay);
        }

        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Some(Duration::from_millis(rand::rng().random_range(0..=millis)))
    }
}
