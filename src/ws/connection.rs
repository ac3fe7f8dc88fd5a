#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use backoff::backoff::Backoff as _;
use tokio::sync::{mpsc, oneshot, watch};

use super::config::Config;
use super::error::WsError;
use super::handler::Handler;
use super::heartbeat::{Beat, HeartbeatMonitor};
use super::reconnect::ReconnectBackoff;
use super::timer::Timer;
use super::transport::{
    Socket, SocketEvent, SocketEvents, SocketId, Transport, TungsteniteTransport,
};
use super::types::{Cause, CloseEvent, ManagerState, Payload, ReadyState, Status};
use crate::Result;
use crate::error::Error;

/// Everything the supervisor reacts to besides caller commands.
#[derive(Debug)]
pub(crate) enum Event {
    Socket { id: SocketId, event: SocketEvent },
    HeartbeatTick { id: SocketId },
    ReconnectDue { generation: u64 },
}

#[derive(Debug)]
enum Command {
    Connect,
    Close,
    Send {
        payload: Payload,
        reply: oneshot::Sender<std::result::Result<(), WsError>>,
    },
}

/// Keeps a WebSocket connection alive: reconnects with exponential backoff after abnormal
/// closes and detects dead peers through application-level heartbeats.
///
/// The manager itself is a cheap handle to a background task that owns the socket. Clones share
/// the same connection. Dropping the last clone closes the connection.
///
/// Lifecycle notifications are delivered to the [`Handler`] passed at construction, in the order
/// they happen. The same information is available as [`Status`] snapshots through
/// [`Self::state_receiver`].
///
/// # Example
///
/// ```rust, no_run
/// use ws_lifeline::ws::config::Config;
/// use ws_lifeline::ws::{ConnectionManager, LogHandler};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::builder()
///         .uri("wss://push.example.com/ws/updates")
///         .heartbeat_message("--heartbeat--")
///         .build();
///     let manager = ConnectionManager::new(config, LogHandler)?;
///
///     manager.connected().await?;
///     manager.send_message("hello").await?;
///
///     manager.close()?;
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionManager {
    /// Commands for the supervisor task
    command_tx: mpsc::UnboundedSender<Command>,
    /// Latest status published by the supervisor
    status_rx: watch::Receiver<Status>,
}

impl ConnectionManager {
    /// Create a manager that connects through `tokio-tungstenite`.
    ///
    /// Must be called from within a tokio runtime. Fails only when `config` is invalid; connection
    /// problems are reported to `handler`.
    pub fn new<H: Handler>(config: Config, handler: H) -> Result<Self> {
        Self::with_transport(config, handler, TungsteniteTransport)
    }

    /// Create a manager that opens its sockets through `transport`.
    pub fn with_transport<H: Handler, T: Transport>(
        config: Config,
        handler: H,
        transport: T,
    ) -> Result<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Status::idle());

        let supervisor = Supervisor::new(config, handler, transport, event_tx, status_tx);
        tokio::spawn(supervisor.run(command_rx, event_rx));

        Ok(Self {
            command_tx,
            status_rx,
        })
    }

    fn command(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Open a connection unless one is already connecting or open.
    ///
    /// Only needed when `autoConnect` is disabled, or to retry by hand after the reconnect budget
    /// ran out. Has no effect after [`Self::close`].
    pub fn connect(&self) -> Result<()> {
        self.command(Command::Connect)
    }

    /// Close the connection for good. No reconnect happens afterwards.
    pub fn close(&self) -> Result<()> {
        self.command(Command::Close)
    }

    /// Send `payload` over the current socket.
    ///
    /// Fails with [`WsError::InvalidState`] when the socket is not open, and with
    /// [`WsError::ConnectionClosed`] when the socket went away underneath.
    pub async fn send_message<P: Into<Payload>>(&self, payload: P) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.command(Command::Send {
            payload: payload.into(),
            reply,
        })?;

        let sent = reply_rx.await.map_err(|_e| WsError::ConnectionClosed)?;
        sent.map_err(Error::from)
    }

    /// Wait until the manager is connected.
    ///
    /// Fails when the manager instead settles in [`ManagerState::Disconnected`],
    /// [`ManagerState::Exhausted`] or [`ManagerState::Closed`].
    pub async fn connected(&self) -> Result<()> {
        let mut status_rx = self.status_rx.clone();
        let status = *status_rx
            .wait_for(|status| {
                matches!(
                    status.state,
                    ManagerState::Connected
                        | ManagerState::Disconnected
                        | ManagerState::Exhausted
                        | ManagerState::Closed
                )
            })
            .await
            .map_err(|_e| WsError::ConnectionClosed)?;

        match status.state {
            ManagerState::Connected => Ok(()),
            ManagerState::Exhausted => Err(WsError::ReconnectExhausted {
                attempts: status.attempt,
            }
            .into()),
            _ => Err(WsError::ConnectionClosed.into()),
        }
    }

    /// The latest published [`Status`].
    #[must_use]
    pub fn status(&self) -> Status {
        *self.status_rx.borrow()
    }

    /// Lifecycle state of the manager, e.g. [`ManagerState::Reconnecting`] while a backoff delay
    /// is running.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.status().state
    }

    /// Readiness of the current socket, `None` before the first socket is created.
    #[must_use]
    pub fn ready_state(&self) -> Option<ReadyState> {
        self.status().ready_state
    }

    /// Whether the current socket is handshaking. `false` before the first socket exists.
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.ready_state() == Some(ReadyState::Connecting)
    }

    /// Whether the current socket is open. `false` before the first socket exists.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.ready_state() == Some(ReadyState::Open)
    }

    /// Whether the current socket is closing. `false` before the first socket exists.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.ready_state() == Some(ReadyState::Closing)
    }

    /// Whether the current socket has closed. `false` before the first socket exists.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.ready_state() == Some(ReadyState::Closed)
    }

    /// Subscribe to status changes.
    ///
    /// Useful for awaiting a particular transition instead of polling the `is_*` queries.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }
}

/// The socket currently owned by the supervisor.
struct Current {
    id: SocketId,
    ready: ReadyState,
    socket: Box<dyn Socket>,
}

/// A scheduled reconnect. Dropping it cancels the timer.
#[derive(Debug)]
struct PendingReconnect {
    /// Matches the [`Event::ReconnectDue`] this timer posts
    generation: u64,
    _timer: Timer,
}

/// Owns all connection state. Runs as a single task, so every handler below executes to
/// completion before the next event is looked at.
struct Supervisor<H, T> {
    config: Config,
    handler: H,
    transport: T,
    /// Handed to sockets and timers so their events come back here
    event_tx: mpsc::UnboundedSender<Event>,
    status_tx: watch::Sender<Status>,
    socket: Option<Current>,
    next_id: u64,
    backoff: ReconnectBackoff,
    heartbeat: HeartbeatMonitor,
    /// Pending reconnect, at most one
    reconnect_timer: Option<PendingReconnect>,
    next_generation: u64,
    /// Set by an explicit close; never cleared
    forced_close: bool,
    state: ManagerState,
}

impl<H: Handler, T: Transport> Supervisor<H, T> {
    fn new(
        config: Config,
        handler: H,
        transport: T,
        event_tx: mpsc::UnboundedSender<Event>,
        status_tx: watch::Sender<Status>,
    ) -> Self {
        Self {
            backoff: ReconnectBackoff::new(config.max_attempts, config.jitter),
            heartbeat: HeartbeatMonitor::new(&config),
            config,
            handler,
            transport,
            event_tx,
            status_tx,
            socket: None,
            next_id: 0,
            reconnect_timer: None,
            next_generation: 0,
            forced_close: false,
            state: ManagerState::Idle,
        }
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut event_rx: mpsc::UnboundedReceiver<Event>,
    ) {
        if self.config.auto_connect {
            self.connect();
            self.publish();
        }

        loop {
            tokio::select! {
                // Commands first, so a close() wins over a close event that arrived alongside it
                biased;

                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("All connection manager handles dropped, shutting down");
                        self.close();
                        break;
                    }
                },

                Some(event) = event_rx.recv() => self.handle_event(event),
            }

            self.publish();
        }
    }

    fn publish(&self) {
        let next = Status {
            state: self.state,
            ready_state: self.socket.as_ref().map(|current| current.ready),
            attempt: self.backoff.attempt(),
        };
        self.status_tx.send_if_modified(|status| {
            if *status == next {
                false
            } else {
                *status = next;
                true
            }
        });
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Close => self.close(),
            Command::Send { payload, reply } => {
                _ = reply.send(self.send_message(payload));
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Socket { id, event } => {
                if self.socket.as_ref().is_none_or(|current| current.id != id) {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(?id, ?event, "Ignoring event from a replaced socket");
                    return;
                }
                match event {
                    SocketEvent::Open => self.on_open(),
                    SocketEvent::Message(payload) => self.on_message(payload),
                    SocketEvent::Error(error) => self.handler.on_error(&error),
                    SocketEvent::Close(close) => self.on_close(close),
                }
            }
            Event::HeartbeatTick { id } => self.send_heartbeat(id),
            Event::ReconnectDue { generation } => {
                // Cancelled timers may still have queued their event
                if self.forced_close
                    || self
                        .reconnect_timer
                        .as_ref()
                        .is_none_or(|pending| pending.generation != generation)
                {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(generation, "Ignoring a cancelled reconnect");
                    return;
                }
                self.reconnect_timer = None;
                self.backoff.advance();
                self.connect();
            }
        }
    }

    fn connect(&mut self) {
        if self.forced_close {
            #[cfg(feature = "tracing")]
            tracing::warn!("Ignoring connect(): the connection manager has been closed");
            return;
        }
        if let Some(current) = &self.socket
            && matches!(current.ready, ReadyState::Connecting | ReadyState::Open)
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(ready_state = ?current.ready, "Ignoring connect(): socket is already active");
            return;
        }

        // An explicit connect supersedes a pending reconnect
        self.reconnect_timer = None;

        #[cfg(feature = "tracing")]
        tracing::debug!(uri = %self.config.uri, attempt = self.backoff.attempt(), "Connecting");
        self.state = ManagerState::Connecting;
        self.handler.on_connecting();

        let id = SocketId(self.next_id);
        self.next_id += 1;
        // The previous socket is closing or closed; its late events no longer match any id
        self.socket = None;

        match self
            .transport
            .open(&self.config.uri, SocketEvents::new(id, self.event_tx.clone()))
        {
            Ok(socket) => {
                self.socket = Some(Current {
                    id,
                    ready: ReadyState::Connecting,
                    socket,
                });
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Unable to create socket: {error:?}");
                self.handler.on_error(&error);
                self.state = ManagerState::Disconnected;
                self.schedule_reconnect(Cause::Failed(error));
            }
        }
    }

    fn on_open(&mut self) {
        let Some(current) = self
            .socket
            .as_mut()
            .filter(|current| current.ready == ReadyState::Connecting)
        else {
            return;
        };
        current.ready = ReadyState::Open;
        let id = current.id;

        self.backoff.reset();
        let event_tx = self.event_tx.clone();
        self.heartbeat
            .arm(event_tx, move || Event::HeartbeatTick { id });

        #[cfg(feature = "tracing")]
        tracing::debug!("Connected");
        self.state = ManagerState::Connected;
        self.handler.on_connected();
    }

    fn on_message(&mut self, payload: Payload) {
        if self.heartbeat.is_echo(&payload) {
            self.heartbeat.record_echo();
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(%payload, "Received WebSocket message");
        self.handler.on_message(payload);
    }

    fn on_close(&mut self, close: CloseEvent) {
        if let Some(current) = self.socket.as_mut() {
            current.ready = ReadyState::Closed;
        }
        self.heartbeat.disarm();

        if self.forced_close {
            #[cfg(feature = "tracing")]
            tracing::debug!(%close, "Connection closed");
            self.handler.on_disconnected(&close);
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(%close, "Connection closed");
        self.state = ManagerState::Disconnected;
        self.handler.on_disconnected(&close);
        self.schedule_reconnect(Cause::Closed(close));
    }

    fn schedule_reconnect(&mut self, cause: Cause) {
        if self.forced_close || !self.config.must_reconnect || self.reconnect_timer.is_some() {
            return;
        }

        let attempt = self.backoff.attempt();
        let Some(delay) = self.backoff.next_backoff() else {
            #[cfg(feature = "tracing")]
            tracing::warn!(attempt, "Reconnect budget exhausted");
            self.state = ManagerState::Exhausted;
            self.handler.on_exhausted(attempt, &cause);
            return;
        };

        self.state = ManagerState::Reconnecting { attempt, delay };
        self.handler.on_reconnecting(attempt, delay, &cause);
        let generation = self.next_generation;
        self.next_generation += 1;
        self.reconnect_timer = Some(PendingReconnect {
            generation,
            _timer: Timer::once(
                delay,
                self.event_tx.clone(),
                Event::ReconnectDue { generation },
            ),
        });
    }

    fn send_heartbeat(&mut self, id: SocketId) {
        if !self.heartbeat.is_armed() || self.socket.as_ref().is_none_or(|current| current.id != id)
        {
            return;
        }
        let Some(beat) = self.heartbeat.beat() else {
            return;
        };

        match beat {
            Beat::Send(payload) => {
                if let Some(current) = &self.socket
                    && let Err(error) = current.socket.send(payload)
                {
                    self.handler.on_error(&error);
                }
            }
            Beat::TimedOut { missed } => {
                self.heartbeat.disarm();
                let Some(current) = self
                    .socket
                    .as_mut()
                    .filter(|current| !current.ready.is_terminating())
                else {
                    return;
                };

                #[cfg(feature = "tracing")]
                tracing::warn!(missed, "Too many missed heartbeats, closing connection");
                self.handler
                    .on_heartbeat_timeout(&WsError::HeartbeatTimeout { missed });
                // forced_close stays unset so the close event reconnects as usual
                current.ready = ReadyState::Closing;
                current.socket.close();
            }
        }
    }

    fn close(&mut self) {
        self.forced_close = true;
        self.heartbeat.disarm();
        self.reconnect_timer = None;
        self.state = ManagerState::Closed;

        if let Some(current) = self.socket.as_mut()
            && !current.ready.is_terminating()
        {
            #[cfg(feature = "tracing")]
            tracing::debug!(ready_state = ?current.ready, "Closing connection");
            current.ready = ReadyState::Closing;
            current.socket.close();
        }
    }

    fn send_message(&self, payload: Payload) -> std::result::Result<(), WsError> {
        match &self.socket {
            Some(current) if current.ready == ReadyState::Open => current.socket.send(payload),
            Some(current) => Err(WsError::InvalidState(Some(current.ready))),
            None => Err(WsError::InvalidState(None)),
        }
    }
}
