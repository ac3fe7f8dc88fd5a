//! Keep a connection to an echo endpoint alive and print what comes back.
//!
//! Sends a message every few seconds. Stop the server to watch the reconnect backoff, or point
//! it at a server that does not echo to see the heartbeat timeout.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=debug cargo run --example echo --features tracing -- ws://localhost:8000/ws/foobar
//! ```
//!
//! The connection can also be configured from a JSON file:
//! ```sh
//! CONFIG_FILE=echo.json cargo run --example echo --features tracing
//! ```

use std::time::Duration;

use tracing::{info, warn};
use ws_lifeline::ws::config::Config;
use ws_lifeline::ws::{
    Cause, CloseEvent, ConnectionManager, Handler, Payload, ReadyState, WsError,
};

const DEFAULT_URI: &str = "ws://localhost:8000/ws/foobar?subscribe-broadcast&publish-broadcast";

struct Echo;

impl Handler for Echo {
    fn on_connected(&self) {
        info!("connected");
    }

    fn on_reconnecting(&self, attempt: u32, delay: Duration, cause: &Cause) {
        warn!(attempt, ?delay, %cause, "reconnecting");
    }

    fn on_message(&self, payload: Payload) {
        info!(%payload, "received");
    }

    fn on_heartbeat_timeout(&self, error: &WsError) {
        warn!(%error, "server stopped answering heartbeats");
    }

    fn on_disconnected(&self, event: &CloseEvent) {
        warn!(%event, "disconnected");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = if let Ok(path) = std::env::var("CONFIG_FILE") {
        Config::from_json(&std::fs::read_to_string(path)?)?
    } else {
        let uri = std::env::args()
            .nth(1)
            .unwrap_or_else(|| DEFAULT_URI.to_owned());
        Config::builder()
            .uri(uri)
            .heartbeat_message("--heartbeat--")
            .build()
    };

    let manager = ConnectionManager::new(config, Echo)?;
    manager.connected().await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(3));
    for n in 0_u32..20 {
        ticker.tick().await;
        if let Err(e) = manager.send_message(format!("hello #{n}")).await {
            warn!(error = %e, "not sent");
        }
    }

    manager.close()?;
    let mut status = manager.state_receiver();
    status
        .wait_for(|status| {
            status
                .ready_state
                .is_none_or(|ready| ready == ReadyState::Closed)
        })
        .await?;

    Ok(())
}
