//! The socket seam between the supervisor and the network.
//!
//! A [`Transport`] creates sockets; each [`Socket`] reports what happens to it through the
//! [`SocketEvents`] it was created with. The default transport speaks WebSocket through
//! `tokio-tungstenite`.

use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::connection::Event;
use super::error::WsError;
use super::types::{CloseEvent, Payload};

/// How long to wait for the peer to finish the closing handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code for a close frame that carried no status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Identifies one socket for the lifetime of its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SocketId(pub(crate) u64);

/// Something that happened to a socket.
#[non_exhaustive]
#[derive(Debug)]
pub enum SocketEvent {
    Open,
    Message(Payload),
    Error(WsError),
    Close(CloseEvent),
}

/// Event sink bound to a single socket.
///
/// Everything reported here is tagged with the socket it was created for, so events from a
/// socket that has since been replaced are recognised and dropped by the manager.
#[derive(Debug, Clone)]
pub struct SocketEvents {
    id: SocketId,
    tx: mpsc::UnboundedSender<Event>,
}

impl SocketEvents {
    pub(crate) fn new(id: SocketId, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { id, tx }
    }

    fn emit(&self, event: SocketEvent) {
        // The manager has shut down; nobody is listening any more
        _ = self.tx.send(Event::Socket { id: self.id, event });
    }

    pub fn opened(&self) {
        self.emit(SocketEvent::Open);
    }

    pub fn message(&self, payload: Payload) {
        self.emit(SocketEvent::Message(payload));
    }

    pub fn error(&self, error: WsError) {
        self.emit(SocketEvent::Error(error));
    }

    pub fn closed(&self, event: CloseEvent) {
        self.emit(SocketEvent::Close(event));
    }
}

/// A live socket as seen by the manager.
pub trait Socket: Send + 'static {
    /// Queue `payload` for the peer.
    fn send(&self, payload: Payload) -> Result<(), WsError>;

    /// Begin closing. A [`SocketEvents::closed`] notification must eventually follow.
    fn close(&self);
}

/// Creates sockets for a [`ConnectionManager`](super::ConnectionManager).
pub trait Transport: Send + 'static {
    /// Create a socket for `uri` and start opening it.
    ///
    /// Returning `Err` means no socket exists and no events will be reported for it.
    /// Otherwise the socket must report `opened` or `closed` through `events`.
    fn open(&self, uri: &str, events: SocketEvents) -> Result<Box<dyn Socket>, WsError>;
}

/// [`Transport`] backed by `tokio-tungstenite`.
#[expect(
    clippy::exhaustive_structs,
    reason = "Unit struct callers construct by name"
)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl Transport for TungsteniteTransport {
    fn open(&self, uri: &str, events: SocketEvents) -> Result<Box<dyn Socket>, WsError> {
        let request = uri.into_client_request().map_err(WsError::Connection)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(drive(request, command_rx, events));

        Ok(Box::new(TungsteniteSocket { command_tx }))
    }
}

#[derive(Debug)]
enum SocketCommand {
    Send(Message),
    Close,
}

#[derive(Debug)]
struct TungsteniteSocket {
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl Socket for TungsteniteSocket {
    fn send(&self, payload: Payload) -> Result<(), WsError> {
        let message = match payload {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(bytes) => Message::Binary(bytes.into()),
        };
        self.command_tx
            .send(SocketCommand::Send(message))
            .map_err(|_e| WsError::ConnectionClosed)
    }

    fn close(&self) {
        _ = self.command_tx.send(SocketCommand::Close);
    }
}

fn close_event(frame: Option<&CloseFrame>) -> CloseEvent {
    match frame {
        Some(frame) => CloseEvent::new(u16::from(frame.code), frame.reason.as_str(), true),
        None => CloseEvent::new(NO_STATUS_RECEIVED, "", true),
    }
}

/// Run one socket from handshake to close.
///
/// Dropping the [`TungsteniteSocket`] is treated like a close request.
async fn drive(
    request: Request,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
    events: SocketEvents,
) {
    let handshake = connect_async(request);
    tokio::pin!(handshake);

    let ws_stream = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok((ws_stream, _)) => break ws_stream,
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Unable to connect: {e:?}");
                    events.error(WsError::Connection(e));
                    events.closed(CloseEvent::abnormal());
                    return;
                }
            },
            command = commands.recv() => match command {
                Some(SocketCommand::Send(_)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Dropping message queued before the socket opened");
                }
                Some(SocketCommand::Close) | None => {
                    events.closed(CloseEvent::new(
                        CloseEvent::abnormal().code,
                        "closed before the connection was established",
                        false,
                    ));
                    return;
                }
            },
        }
    };

    events.opened();

    let (mut write, mut read) = ws_stream.split();
    let mut closing = false;
    let mut received_close: Option<CloseEvent> = None;
    let close_deadline = sleep(CLOSE_TIMEOUT);
    tokio::pin!(close_deadline);

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    events.message(Payload::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    events.message(Payload::Binary(bytes.to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    // Wait for the stream to end so the close reply gets flushed
                    received_close = Some(close_event(frame.as_ref()));
                }
                Some(Ok(_)) => {
                    // Ping and pong frames are answered by tungstenite itself.
                }
                Some(Err(e)) => {
                    if let Some(event) = received_close {
                        events.closed(event);
                    } else {
                        events.error(WsError::Connection(e));
                        events.closed(CloseEvent::abnormal());
                    }
                    return;
                }
                None => {
                    events.closed(received_close.unwrap_or_else(CloseEvent::abnormal));
                    return;
                }
            },

            command = commands.recv(), if !closing => match command {
                Some(SocketCommand::Send(message)) => {
                    if let Err(e) = write.send(message).await {
                        events.error(WsError::Connection(e));
                        events.closed(CloseEvent::abnormal());
                        return;
                    }
                }
                Some(SocketCommand::Close) | None => {
                    closing = true;
                    close_deadline.as_mut().reset(Instant::now() + CLOSE_TIMEOUT);
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    };
                    if write.send(Message::Close(Some(frame))).await.is_err() {
                        events.closed(CloseEvent::abnormal());
                        return;
                    }
                }
            },

            () = &mut close_deadline, if closing => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Peer did not complete the closing handshake in time");
                events.closed(CloseEvent::abnormal());
                return;
            }
        }
    }
}
