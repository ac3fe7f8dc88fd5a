//! Lifecycle callbacks.

use std::time::Duration;

use super::error::WsError;
use super::types::{Cause, CloseEvent, Payload};

/// Receives lifecycle notifications from a [`ConnectionManager`](super::ConnectionManager).
///
/// Every method has a default, so implementors override only the events they care about.
/// With the `tracing` feature the defaults log the event; without it they do nothing.
///
/// All methods are invoked from the manager's single event loop, one at a time and in order.
/// They must not block: long work belongs on a spawned task or behind a channel.
///
/// # Example
///
/// ```
/// use ws_lifeline::ws::{Handler, Payload};
///
/// struct Printer;
///
/// impl Handler for Printer {
///     fn on_message(&self, payload: Payload) {
///         println!("received {payload}");
///     }
/// }
/// ```
#[cfg_attr(
    not(feature = "tracing"),
    expect(
        unused_variables,
        reason = "Default bodies only read their arguments when logging"
    )
)]
pub trait Handler: Send + 'static {
    /// A new socket is about to be created.
    fn on_connecting(&self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Connecting");
    }

    /// The current socket opened.
    fn on_connected(&self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Connected");
    }

    /// A reconnect was scheduled for `attempt` after `delay`.
    fn on_reconnecting(&self, attempt: u32, delay: Duration, cause: &Cause) {
        #[cfg(feature = "tracing")]
        tracing::info!(attempt, ?delay, %cause, "Reconnecting");
    }

    /// An application payload arrived. Heartbeat echoes never reach this method.
    fn on_message(&self, payload: Payload) {
        #[cfg(feature = "tracing")]
        tracing::trace!(%payload, "Received message");
    }

    /// The transport reported an error. A close notification normally follows.
    fn on_error(&self, error: &WsError) {
        #[cfg(feature = "tracing")]
        tracing::error!(%error, "WebSocket connection is broken");
    }

    /// Too many heartbeats went unanswered and the socket is being closed.
    fn on_heartbeat_timeout(&self, error: &WsError) {
        #[cfg(feature = "tracing")]
        tracing::warn!(%error, "Closing connection");
    }

    /// The current socket closed.
    fn on_disconnected(&self, event: &CloseEvent) {
        #[cfg(feature = "tracing")]
        tracing::debug!(%event, "Connection closed");
    }

    /// The reconnect budget ran out; no further attempts will be made on their own.
    fn on_exhausted(&self, attempt: u32, cause: &Cause) {
        #[cfg(feature = "tracing")]
        tracing::warn!(attempt, %cause, "Giving up on reconnecting");
    }
}

/// [`Handler`] that keeps every default.
///
/// ```
/// use ws_lifeline::ws::{Handler as _, LogHandler};
///
/// LogHandler.on_connected();
/// ```
#[expect(
    clippy::exhaustive_structs,
    reason = "Unit struct callers construct by name"
)]
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHandler;

impl Handler for LogHandler {}
