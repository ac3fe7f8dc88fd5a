use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::error::WsError;

/// An opaque message exchanged with the peer.
///
/// Payloads are passed through unchanged in both directions. The only payload the
/// manager ever looks at is the configured heartbeat, which it compares for equality.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
}

impl Payload {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Readiness of a single socket, as reported by the transport.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    /// Whether the socket is on its way out or already gone.
    #[must_use]
    pub const fn is_terminating(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// Lifecycle of the manager itself, independent of any one socket.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Constructed, no connection attempted yet
    Idle,
    /// A socket has been created and is handshaking
    Connecting,
    /// The current socket is open
    Connected,
    /// The last socket closed and no reconnect is pending
    Disconnected,
    /// Waiting out the backoff delay before the next attempt
    Reconnecting {
        /// Attempt the pending reconnect was scheduled for
        attempt: u32,
        /// Delay before the reconnect fires
        delay: Duration,
    },
    /// The reconnect budget ran out
    Exhausted,
    /// Closed by the caller. Terminal.
    Closed,
}

/// Snapshot of the manager published after every handled event.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub state: ManagerState,
    /// Readiness of the current socket, `None` when no socket exists
    pub ready_state: Option<ReadyState>,
    /// Reconnect attempt counter. 1 while connected.
    pub attempt: u32,
}

impl Status {
    pub(crate) const fn idle() -> Self {
        Self {
            state: ManagerState::Idle,
            ready_state: None,
            attempt: 1,
        }
    }
}

/// Close code used when a connection ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Details of a socket closing.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    /// `true` when the closing handshake completed
    pub was_clean: bool,
}

impl CloseEvent {
    #[must_use]
    pub fn new<S: Into<String>>(code: u16, reason: S, was_clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean,
        }
    }

    /// A close without a closing handshake, e.g. a dropped TCP connection.
    #[must_use]
    pub fn abnormal() -> Self {
        Self::new(ABNORMAL_CLOSURE, "", false)
    }
}

impl fmt::Display for CloseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}", self.code)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        if !self.was_clean {
            f.write_str(", unclean")?;
        }
        Ok(())
    }
}

/// Why a reconnect is being considered.
#[non_exhaustive]
#[derive(Debug)]
pub enum Cause {
    /// The socket closed
    Closed(CloseEvent),
    /// The socket could not even be created
    Failed(WsError),
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(event) => write!(f, "connection closed with {event}"),
            Self::Failed(error) => write!(f, "connection failed: {error}"),
        }
    }
}
