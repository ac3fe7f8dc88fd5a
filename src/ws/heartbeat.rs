//! Application-level heartbeat accounting.
//!
//! Transport pings cannot tell a half-open connection from a healthy one when an intermediary
//! answers them, so the peer is expected to echo a configured sentinel payload. Every interval
//! the monitor counts one more unanswered heartbeat; an echo resets the count.

use std::time::Duration;

use tokio::sync::mpsc;

use super::config::Config;
use super::timer::Timer;
use super::types::Payload;

/// Outcome of one heartbeat tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Beat {
    /// Send this payload to the peer
    Send(Payload),
    /// The peer missed too many heartbeats
    TimedOut { missed: u32 },
}

#[derive(Debug)]
pub(crate) struct HeartbeatMonitor {
    message: Option<Payload>,
    interval: Duration,
    max_missed: u32,
    missed: u32,
    timer: Option<Timer>,
}

impl HeartbeatMonitor {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            message: config.heartbeat_message.clone(),
            interval: config.heartbeat_interval,
            max_missed: config.max_missed_heartbeats,
            missed: 0,
            timer: None,
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    #[cfg(test)]
    pub(crate) fn missed(&self) -> u32 {
        self.missed
    }

    /// Start ticking, unless heartbeats are disabled or already armed.
    ///
    /// Returns whether a new timer was started.
    pub(crate) fn arm<E, F>(&mut self, tx: mpsc::UnboundedSender<E>, make_tick: F) -> bool
    where
        E: Send + 'static,
        F: Fn() -> E + Send + 'static,
    {
        if self.message.is_none() || self.is_armed() {
            return false;
        }

        self.missed = 0;
        self.timer = Some(Timer::every(self.interval, tx, make_tick));
        true
    }

    pub(crate) fn disarm(&mut self) {
        self.timer = None;
    }

    /// Whether `payload` is the peer echoing our heartbeat.
    pub(crate) fn is_echo(&self, payload: &Payload) -> bool {
        self.message.as_ref() == Some(payload)
    }

    pub(crate) fn record_echo(&mut self) {
        self.missed = 0;
    }

    /// Account for one more heartbeat.
    ///
    /// Exactly `max_missed` payloads are handed out between echoes; the tick after that
    /// reports a timeout.
    pub(crate) fn beat(&mut self) -> Option<Beat> {
        let message = self.message.as_ref()?;

        self.missed = self.missed.saturating_add(1);
        if self.missed > self.max_missed {
            return Some(Beat::TimedOut {
                missed: self.missed - 1,
            });
        }

        Some(Beat::Send(message.clone()))
    }
}
