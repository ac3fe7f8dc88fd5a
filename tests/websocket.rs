#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use common::{Call, Recorder, wait_for_call};
use futures_util::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use ws_lifeline::ws::config::Config;
use ws_lifeline::ws::{
    ConnectionManager, LogHandler, ManagerState, Payload, TungsteniteTransport,
};

const HEARTBEAT: &str = "--heartbeat--";

/// Mock WebSocket server that echoes every message back to its sender.
struct EchoServer {
    addr: SocketAddr,
    /// Text messages received from clients, heartbeats included
    received_rx: mpsc::UnboundedReceiver<String>,
    /// Number of WebSocket handshakes accepted so far
    connections: Arc<AtomicUsize>,
    /// Drops every open connection without a closing handshake
    kick_tx: broadcast::Sender<()>,
    /// Whether messages are echoed back
    echo: Arc<AtomicBool>,
}

impl EchoServer {
    /// Start a mock WebSocket server on a random port.
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (received_tx, received_rx) = mpsc::unbounded_channel::<String>();
        let (kick_tx, _) = broadcast::channel::<()>(16);
        let connections = Arc::new(AtomicUsize::new(0));
        let echo = Arc::new(AtomicBool::new(true));

        let accept_kick_tx = kick_tx.clone();
        let accept_connections = Arc::clone(&connections);
        let accept_echo = Arc::clone(&echo);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                accept_connections.fetch_add(1, Ordering::SeqCst);

                let (mut write, mut read) = ws_stream.split();
                let received_tx = received_tx.clone();
                let mut kick_rx = accept_kick_tx.subscribe();
                let echo = Arc::clone(&accept_echo);

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                let reply = match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        _ = received_tx.send(text.to_string());
                                        Message::Text(text)
                                    }
                                    Some(Ok(Message::Binary(bytes))) => Message::Binary(bytes),
                                    Some(Ok(_)) => continue,
                                    _ => break,
                                };
                                if echo.load(Ordering::SeqCst) && write.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            _ = kick_rx.recv() => break,
                        }
                    }
                });
            }
        });

        Self {
            addr,
            received_rx,
            connections,
            kick_tx,
            echo,
        }
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Drop all open connections abruptly.
    fn kick(&self) {
        _ = self.kick_tx.send(());
    }

    fn mute(&self) {
        self.echo.store(false, Ordering::SeqCst);
    }

    /// Receive the next text message a client sent.
    async fn recv(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

const WITHIN: Duration = Duration::from_secs(5);

#[tokio::test]
async fn sends_and_receives_messages() {
    let mut server = EchoServer::start().await;
    let (recorder, mut calls) = Recorder::channel();

    let config = Config::builder().uri(server.ws_url("/ws/foobar")).build();
    let manager = ConnectionManager::new(config, recorder).unwrap();
    manager.connected().await.unwrap();
    assert!(manager.is_connected());

    manager.send_message("Hello, world").await.unwrap();
    assert_eq!(server.recv().await.as_deref(), Some("Hello, world"));
    wait_for_call(&mut calls, WITHIN, |call| {
        *call == Call::Message(Payload::from("Hello, world"))
    })
    .await;

    manager.send_message(vec![1_u8, 2, 3]).await.unwrap();
    wait_for_call(&mut calls, WITHIN, |call| {
        *call == Call::Message(Payload::Binary(vec![1, 2, 3]))
    })
    .await;
}

#[tokio::test]
async fn heartbeat_echoes_are_not_delivered() {
    let mut server = EchoServer::start().await;
    let (recorder, mut calls) = Recorder::channel();

    let config = Config::builder()
        .uri(server.ws_url("/ws/foobar"))
        .heartbeat_message(HEARTBEAT)
        .heartbeat_interval(Duration::from_millis(50))
        .max_missed_heartbeats(2)
        .build();
    let manager = ConnectionManager::new(config, recorder).unwrap();
    manager.connected().await.unwrap();

    for _ in 0..3 {
        assert_eq!(server.recv().await.as_deref(), Some(HEARTBEAT));
    }
    sleep(Duration::from_millis(300)).await;

    manager.send_message("after heartbeats").await.unwrap();
    let call = wait_for_call(&mut calls, WITHIN, |call| matches!(call, Call::Message(_))).await;
    assert_eq!(call, Call::Message(Payload::from("after heartbeats")));

    assert!(manager.is_connected(), "echoed heartbeats keep the connection");
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn silent_server_triggers_heartbeat_timeout() {
    let server = EchoServer::start().await;
    server.mute();
    let (recorder, mut calls) = Recorder::channel();

    let config = Config::builder()
        .uri(server.ws_url("/ws/foobar"))
        .heartbeat_message(HEARTBEAT)
        .heartbeat_interval(Duration::from_millis(50))
        .max_missed_heartbeats(2)
        .build();
    let _manager = ConnectionManager::new(config, recorder).unwrap();

    wait_for_call(&mut calls, WITHIN, |call| *call == Call::HeartbeatTimeout).await;
    wait_for_call(&mut calls, WITHIN, |call| matches!(call, Call::Disconnected(_))).await;
    let call = wait_for_call(&mut calls, WITHIN, |call| {
        matches!(call, Call::Reconnecting { .. })
    })
    .await;
    assert_eq!(
        call,
        Call::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(1)
        }
    );

    wait_for_call(&mut calls, WITHIN, |call| *call == Call::Connected).await;
    assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn reconnects_after_server_drops_connection() {
    let server = EchoServer::start().await;
    let (recorder, mut calls) = Recorder::channel();

    let config = Config::builder().uri(server.ws_url("/ws/foobar")).build();
    let manager = ConnectionManager::new(config, recorder).unwrap();
    manager.connected().await.unwrap();

    server.kick();

    assert_eq!(
        wait_for_call(&mut calls, WITHIN, |call| matches!(call, Call::Disconnected(_))).await,
        Call::Disconnected(1006)
    );
    wait_for_call(&mut calls, WITHIN, |call| matches!(call, Call::Reconnecting { .. })).await;
    wait_for_call(&mut calls, WITHIN, |call| *call == Call::Connected).await;

    assert!(manager.is_connected());
    assert_eq!(manager.status().attempt, 1);
    assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn close_performs_closing_handshake() {
    let server = EchoServer::start().await;
    let (recorder, mut calls) = Recorder::channel();

    let config = Config::builder().uri(server.ws_url("/ws/foobar")).build();
    let manager = ConnectionManager::new(config, recorder).unwrap();
    manager.connected().await.unwrap();

    manager.close().unwrap();

    assert_eq!(
        wait_for_call(&mut calls, WITHIN, |call| matches!(call, Call::Disconnected(_))).await,
        Call::Disconnected(1000)
    );
    assert!(
        timeout(Duration::from_millis(1500), calls.recv()).await.is_err(),
        "nothing happens after close"
    );
    assert!(manager.is_closed());
    assert_eq!(manager.state(), ManagerState::Closed);
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn unreachable_server_gives_up_after_budget() {
    // Reserve a port, then free it so nothing listens there
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (recorder, mut calls) = Recorder::channel();
    let mut config = Config::builder().uri(format!("ws://{addr}/ws/foobar")).build();
    config.max_attempts = 2;
    let manager = ConnectionManager::new(config, recorder).unwrap();

    wait_for_call(&mut calls, WITHIN, |call| matches!(call, Call::Error(_))).await;
    assert_eq!(
        wait_for_call(&mut calls, WITHIN, |call| matches!(call, Call::Disconnected(_))).await,
        Call::Disconnected(1006)
    );
    wait_for_call(&mut calls, WITHIN, |call| matches!(call, Call::Reconnecting { .. })).await;
    assert_eq!(
        wait_for_call(&mut calls, WITHIN, |call| matches!(call, Call::Exhausted(_))).await,
        Call::Exhausted(2)
    );

    manager.connected().await.unwrap_err();
    assert_eq!(manager.state(), ManagerState::Exhausted);
}

#[tokio::test]
async fn malformed_uri_is_reported_to_the_handler() {
    let (recorder, mut calls) = Recorder::channel();
    let mut config = Config::builder().uri("not a websocket uri").build();
    config.max_attempts = 1;

    let manager = ConnectionManager::new(config, recorder).unwrap();

    assert_eq!(
        timeout(WITHIN, calls.recv()).await.unwrap(),
        Some(Call::Connecting)
    );
    assert!(matches!(
        timeout(WITHIN, calls.recv()).await.unwrap(),
        Some(Call::Error(_))
    ));
    assert_eq!(
        timeout(WITHIN, calls.recv()).await.unwrap(),
        Some(Call::Exhausted(1))
    );
    assert_eq!(manager.ready_state(), None);
}

#[tokio::test]
async fn ready_made_handler_and_transport_connect() {
    let server = EchoServer::start().await;
    let config = Config::builder().uri(server.ws_url("/ws/foobar")).build();

    let manager =
        ConnectionManager::with_transport(config, LogHandler, TungsteniteTransport).unwrap();
    manager.connected().await.unwrap();

    manager.send_message("hello").await.unwrap();
    assert!(manager.is_connected());
    assert_eq!(server.connections(), 1);
}
