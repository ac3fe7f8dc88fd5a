#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each test binary uses a different subset of these helpers"
)]

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use ws_lifeline::ws::{Cause, CloseEvent, Handler, Payload, WsError};

/// One callback invocation, as seen by [`Recorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connecting,
    Connected,
    Reconnecting { attempt: u32, delay: Duration },
    Message(Payload),
    Error(String),
    HeartbeatTimeout,
    Disconnected(u16),
    Exhausted(u32),
}

/// [`Handler`] that forwards every callback to a channel.
pub struct Recorder(mpsc::UnboundedSender<Call>);

impl Recorder {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Call>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    fn record(&self, call: Call) {
        _ = self.0.send(call);
    }
}

impl Handler for Recorder {
    fn on_connecting(&self) {
        self.record(Call::Connecting);
    }

    fn on_connected(&self) {
        self.record(Call::Connected);
    }

    fn on_reconnecting(&self, attempt: u32, delay: Duration, _cause: &Cause) {
        self.record(Call::Reconnecting { attempt, delay });
    }

    fn on_message(&self, payload: Payload) {
        self.record(Call::Message(payload));
    }

    fn on_error(&self, error: &WsError) {
        self.record(Call::Error(error.to_string()));
    }

    fn on_heartbeat_timeout(&self, _error: &WsError) {
        self.record(Call::HeartbeatTimeout);
    }

    fn on_disconnected(&self, event: &CloseEvent) {
        self.record(Call::Disconnected(event.code));
    }

    fn on_exhausted(&self, attempt: u32, _cause: &Cause) {
        self.record(Call::Exhausted(attempt));
    }
}

/// Skip callbacks until one matches `predicate`.
pub async fn wait_for_call<F>(
    calls: &mut mpsc::UnboundedReceiver<Call>,
    within: Duration,
    predicate: F,
) -> Call
where
    F: Fn(&Call) -> bool,
{
    timeout(within, async {
        loop {
            let call = calls.recv().await.unwrap();
            if predicate(&call) {
                return call;
            }
        }
    })
    .await
    .expect("expected callback did not arrive in time")
}
