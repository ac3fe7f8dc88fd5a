//! Resilient WebSocket connection management.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: handle to the supervisor task that owns the socket, reconnects with
//!   exponential backoff and runs the heartbeat
//! - [`Handler`]: lifecycle callbacks invoked by the supervisor
//! - [`Transport`] / [`Socket`]: seam to the network, implemented by [`TungsteniteTransport`]
//!
//! # Example
//!
//! ```ignore
//! struct Billboard;
//!
//! impl Handler for Billboard {
//!     fn on_message(&self, payload: Payload) { /* ... */ }
//! }
//!
//! let config = Config::builder().uri("ws://localhost:8000/ws/foobar").build();
//! let manager = ConnectionManager::new(config, Billboard)?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub(crate) mod heartbeat;
pub mod reconnect;
pub(crate) mod timer;
pub mod transport;
pub mod types;

pub use connection::ConnectionManager;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use handler::{Handler, LogHandler};
pub use transport::{Socket, SocketEvent, SocketEvents, Transport, TungsteniteTransport};
pub use types::*;
