#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;
use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};

use super::types::Payload;
use crate::Result;
use crate::error::Error;

pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 50;
pub(crate) const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_MAX_MISSED_HEARTBEATS: u32 = 5;

/// Configuration for a [`ConnectionManager`](super::ConnectionManager).
///
/// Fixed once the manager is constructed. Build it in code with [`Config::builder`] or load it
/// from JSON with [`Config::from_json`], whose keys follow the `camelCase` names below.
///
/// ```
/// use std::time::Duration;
/// use ws_lifeline::ws::config::Config;
///
/// let config = Config::builder()
///     .uri("wss://push.example.com/ws/updates")
///     .heartbeat_message("--heartbeat--")
///     .heartbeat_interval(Duration::from_secs(10))
///     .build();
///
/// assert!(config.auto_connect);
/// assert_eq!(config.max_attempts, 50);
/// ```
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Builder, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// WebSocket endpoint, e.g. `wss://example.com/ws/foo`
    #[builder(into)]
    pub uri: String,
    /// Open the connection as soon as the manager is constructed
    #[builder(default = true)]
    #[serde(default = "enabled")]
    pub auto_connect: bool,
    /// Reconnect after abnormal closes
    #[builder(default = true)]
    #[serde(default = "enabled")]
    pub must_reconnect: bool,
    /// Attempt counter value at which reconnecting stops
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Sentinel payload echoed by the peer. Heartbeats are disabled when absent.
    #[builder(into)]
    #[serde(default)]
    pub heartbeat_message: Option<Payload>,
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    #[serde(
        rename = "heartbeatIntervalMs",
        default = "default_heartbeat_interval"
    )]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub heartbeat_interval: Duration,
    /// Heartbeats that may go unanswered before the connection is considered dead
    #[builder(default = DEFAULT_MAX_MISSED_HEARTBEATS)]
    #[serde(default = "default_max_missed_heartbeats")]
    pub max_missed_heartbeats: u32,
    /// Scale each reconnect delay uniformly into `[0, delay]`
    #[builder(default)]
    #[serde(default)]
    pub jitter: bool,
}

const fn enabled() -> bool {
    true
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_heartbeat_interval() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL_DURATION
}

const fn default_max_missed_heartbeats() -> u32 {
    DEFAULT_MAX_MISSED_HEARTBEATS
}

impl Config {
    /// Parse a configuration document such as
    /// `{"uri": "wss://example.com/ws", "heartbeatMessage": "--heartbeat--"}`.
    ///
    /// A document without `uri` is rejected as a validation error.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::validation(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Whether heartbeats will be sent on open connections.
    #[must_use]
    pub fn heartbeats_enabled(&self) -> bool {
        self.heartbeat_message.is_some()
    }

    /// Reject configurations the manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(Error::validation("missing WebSocket URI"));
        }
        if self.max_attempts == 0 {
            return Err(Error::validation("maxAttempts must be at least 1"));
        }
        if self.heartbeats_enabled() {
            if self.heartbeat_interval.is_zero() {
                return Err(Error::validation(
                    "heartbeatIntervalMs must be positive when heartbeats are enabled",
                ));
            }
            if self.max_missed_heartbeats == 0 {
                return Err(Error::validation(
                    "maxMissedHeartbeats must be at least 1 when heartbeats are enabled",
                ));
            }
        }
        Ok(())
    }
}
