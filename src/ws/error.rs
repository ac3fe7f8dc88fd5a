#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

use super::types::ReadyState;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// WebSocket connection was closed, or the manager has shut down
    ConnectionClosed,
    /// The socket is not open, so the payload cannot be written
    InvalidState(Option<ReadyState>),
    /// The peer stopped echoing heartbeats
    HeartbeatTimeout {
        /// Consecutive heartbeats sent without an echo
        missed: u32,
    },
    /// The reconnect budget ran out
    ReconnectExhausted {
        /// Attempt counter at the moment the scheduler gave up
        attempts: u32,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::InvalidState(Some(state)) => {
                write!(f, "WebSocket is not open (currently {state:?})")
            }
            Self::InvalidState(None) => write!(f, "WebSocket has not been created yet"),
            Self::HeartbeatTimeout { missed } => {
                write!(f, "Heartbeat timeout: {missed} heartbeats went unanswered")
            }
            Self::ReconnectExhausted { attempts } => {
                write!(f, "Gave up reconnecting after {attempts} attempts")
            }
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
