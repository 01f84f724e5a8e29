//! Server connection: the single object the application talks to.
//!
//! [`ServerConnection`] owns the live transport, the receive buffer and the
//! state machine, and publishes [`ConnectionEvent`]s in order on an unbounded
//! channel. It is a reactor: every public operation and every transport or
//! watchdog notification is applied through `&mut self`, one at a time. Drive
//! it by awaiting [`ServerConnection::pump`] in a loop, or run it on its own
//! task with [`crate::handle::spawn`].
//!
//! Each connection attempt gets a new generation number. Transport events
//! and watchdog expiries carry the generation they belong to; anything from an
//! earlier attempt is dropped, so a torn-down transport can never affect the
//! current one.

use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::framing::UnitBuffer;
use crate::packet::Packet;
use crate::server::ServerDescriptor;
use crate::state::{ConnectionState, DEFAULT_CONNECT_TIMEOUT, StateMachine};
use crate::transport::{
    TransportEvent, TransportEventKind, TransportKind, TransportOptions, TransportSlot,
};

/// Tunables for a [`ServerConnection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long an attempt may stay in [`ConnectionState::Connecting`].
    pub connect_timeout: Duration,
    /// How long a graceful close may take before the transport is aborted.
    pub close_grace: Duration,
    /// Set `TCP_NODELAY` on stream sockets.
    pub tcp_nodelay: bool,
    /// Size of the stream read buffer.
    pub read_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let transport = TransportOptions::default();
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_grace: transport.close_grace,
            tcp_nodelay: transport.tcp_nodelay,
            read_buffer_size: transport.read_buffer_size,
        }
    }
}

impl ConnectionConfig {
    fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            close_grace: self.close_grace,
            tcp_nodelay: self.tcp_nodelay,
            read_buffer_size: self.read_buffer_size,
        }
    }
}

/// Notification published to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection state genuinely changed.
    StateChanged(ConnectionState),
    /// One complete packet arrived.
    PacketReceived(Packet),
    /// The transport reported an error. Human-readable.
    SocketError(String),
}

/// Receiving end of a connection's event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Something the reactor has to apply.
#[derive(Debug)]
pub enum InternalEvent {
    /// A transport task reported in.
    Transport(TransportEvent),
    /// The connect watchdog of the given attempt expired.
    ConnectTimeout(u64),
}

/// Client-side connection to one server at a time.
pub struct ServerConnection {
    config: ConnectionConfig,
    server: Option<ServerDescriptor>,
    transport: TransportSlot,
    generation: u64,
    machine: StateMachine,
    buffer: UnitBuffer,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    timeout_rx: mpsc::UnboundedReceiver<u64>,
}

impl ServerConnection {
    /// Create a disconnected connection and the channel its events are
    /// published on.
    pub fn new(config: ConnectionConfig) -> (Self, EventReceiver) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();

        let connection = Self {
            transport: TransportSlot::new(config.transport_options()),
            machine: StateMachine::new(config.connect_timeout, timeout_tx),
            config,
            server: None,
            generation: 0,
            buffer: UnitBuffer::new(),
            events,
            transport_tx,
            transport_rx,
            timeout_rx,
        };
        (connection, event_rx)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.machine.subscribe()
    }

    /// Server of the current attempt, if any.
    pub fn server(&self) -> Option<&ServerDescriptor> {
        self.server.as_ref()
    }

    /// Kind of the live transport, if any.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.transport.kind()
    }

    /// Whether a transport is live and reports itself connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Tear down any current connection and start connecting to `server`.
    ///
    /// Returns immediately; progress is published as
    /// [`ConnectionEvent::StateChanged`].
    pub fn connect(&mut self, server: ServerDescriptor) {
        self.disconnect();

        let kind = server.transport_kind();
        let port = server.active_port();
        self.generation = self.generation.wrapping_add(1);
        match kind {
            TransportKind::Stream => {
                tracing::info!("Connecting to {} over TCP", server.to_address());
            }
            TransportKind::Message => {
                tracing::info!("Connecting to {} over WebSocket", server.ws_url());
            }
        }

        self.transport.open(
            kind,
            &server.address,
            port,
            self.generation,
            self.transport_tx.clone(),
        );
        self.server = Some(server);
    }

    /// Close the live transport, if any, and settle at
    /// [`ConnectionState::NotConnected`]. Safe to call at any time.
    pub fn disconnect(&mut self) {
        // Invalidate everything the old transport still has in flight.
        self.generation = self.generation.wrapping_add(1);

        if self.transport.close() {
            tracing::debug!("Disconnected from server{}", self.server_tag());
        }
        if let Some(state) = self.machine.reset() {
            self.publish(ConnectionEvent::StateChanged(state));
        }
        self.buffer.clear();
        self.server = None;
    }

    /// Encode `packet` and write it to the live transport.
    ///
    /// Dropped with an informational log line when not connected.
    pub fn send(&self, packet: &Packet) {
        if !self.is_connected() {
            tracing::info!(
                "Failed to send packet; not connected to server{}",
                self.server_tag()
            );
            return;
        }

        tracing::trace!(%packet, "sending");
        if !self.transport.send(packet.encode().into_bytes()) {
            tracing::debug!("transport task is gone; packet dropped");
        }
    }

    /// Wait for the next transport or watchdog notification.
    pub async fn next_internal(&mut self) -> InternalEvent {
        // Both senders are owned by `self`, so neither channel can close.
        // Transport reports go first: a queued `Connected` must be applied
        // before a watchdog expiry that raced it.
        tokio::select! {
            biased;
            Some(event) = self.transport_rx.recv() => InternalEvent::Transport(event),
            Some(generation) = self.timeout_rx.recv() => InternalEvent::ConnectTimeout(generation),
        }
    }

    /// Apply one notification.
    pub fn handle(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::Transport(event) => self.on_transport_event(event),
            InternalEvent::ConnectTimeout(generation) => self.on_connect_timeout(generation),
        }
    }

    /// Wait for and apply the next notification.
    pub async fn pump(&mut self) {
        let event = self.next_internal().await;
        self.handle(event);
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        if event.generation != self.generation {
            tracing::trace!(
                generation = event.generation,
                current = self.generation,
                "dropping event from a previous transport"
            );
            return;
        }

        match event.kind {
            TransportEventKind::State(socket) => {
                if let Some(state) = self.machine.apply(socket, event.generation) {
                    tracing::debug!("Connection state changed: {state}");
                    self.publish(ConnectionEvent::StateChanged(state));
                }
            }
            TransportEventKind::Data(bytes) => {
                for packet in self.buffer.push(&bytes) {
                    tracing::trace!(%packet, "received");
                    self.publish(ConnectionEvent::PacketReceived(packet));
                }
            }
            TransportEventKind::Error(error) => {
                let message = format!("Server{} error: {error}", self.server_tag());
                tracing::warn!("{message}");
                self.publish(ConnectionEvent::SocketError(message));
            }
        }
    }

    fn on_connect_timeout(&mut self, generation: u64) {
        if generation != self.generation
            || self.state() != ConnectionState::Connecting
            || self.transport.is_connected()
        {
            return;
        }
        tracing::warn!(
            "Connection to server{} timed out after {:?}",
            self.server_tag(),
            self.config.connect_timeout
        );
        self.disconnect();
    }

    /// `<info>` for the current server, or nothing.
    fn server_tag(&self) -> String {
        match self.server.as_ref().map(ServerDescriptor::to_info) {
            Some(info) if !info.is_empty() => format!("<{info}>"),
            _ => String::new(),
        }
    }

    fn publish(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }
}
