//! Transport abstraction over a TCP byte stream and a WebSocket.
//!
//! Each live transport is a background task plus a small handle. The task
//! reports socket-state changes, inbound bytes and errors as
//! [`TransportEvent`]s tagged with the connection attempt that opened it, so
//! the owner can discard anything a torn-down transport still had in flight.
//! [`TransportSlot`] holds at most one live transport at a time.

mod message;
mod stream;

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub use message::MessageTransport;
pub use stream::StreamTransport;

/// The two interchangeable transport implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// TCP byte stream.
    Stream,
    /// WebSocket message stream.
    Message,
}

/// Native socket state reported by a transport task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SocketState {
    /// Not connected. Initial and final state of every transport.
    #[default]
    Unconnected,
    /// Resolving the host name.
    HostLookup,
    /// Establishing the connection (TCP handshake, WebSocket upgrade).
    Connecting,
    /// Ready to carry data.
    Connected,
    /// Graceful close in progress.
    Closing,
}

/// Errors surfaced by a transport. `Display` is the native error text.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Host name resolution failed.
    #[error("host lookup failed: {0}")]
    Resolve(#[source] std::io::Error),

    /// Resolution succeeded but produced no address.
    #[error("host {0} not found")]
    HostNotFound(String),

    /// The TCP connection could not be established.
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    /// An I/O error on an established stream.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// A WebSocket protocol or I/O error.
    #[error("{0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The peer closed the connection.
    #[error("the remote host closed the connection")]
    Closed,
}

/// One notification from a transport task.
#[derive(Debug)]
pub struct TransportEvent {
    /// Connection attempt that opened the transport.
    pub generation: u64,
    /// What happened.
    pub kind: TransportEventKind,
}

/// Payload of a [`TransportEvent`].
#[derive(Debug)]
pub enum TransportEventKind {
    /// The socket moved to a new state.
    State(SocketState),
    /// Bytes arrived. Not aligned to protocol units.
    Data(Vec<u8>),
    /// The transport hit an error.
    Error(TransportError),
}

/// Tunables shared by both transport implementations.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// How long a graceful close may take before the task is aborted.
    pub close_grace: Duration,
    /// Set `TCP_NODELAY` on stream sockets.
    pub tcp_nodelay: bool,
    /// Size of the stream read buffer.
    pub read_buffer_size: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            close_grace: Duration::from_millis(1000),
            tcp_nodelay: true,
            read_buffer_size: 4096,
        }
    }
}

/// The task side of a transport: where it reports to.
pub(crate) struct EventSink {
    generation: u64,
    events: mpsc::UnboundedSender<TransportEvent>,
    state: watch::Sender<SocketState>,
}

impl EventSink {
    pub(crate) fn state(&self, state: SocketState) {
        self.state.send_replace(state);
        self.emit(TransportEventKind::State(state));
    }

    pub(crate) fn data(&self, bytes: Vec<u8>) {
        self.emit(TransportEventKind::Data(bytes));
    }

    pub(crate) fn error(&self, error: TransportError) {
        tracing::debug!(generation = self.generation, "transport error: {error}");
        self.emit(TransportEventKind::Error(error));
    }

    fn emit(&self, kind: TransportEventKind) {
        let _ = self.events.send(TransportEvent {
            generation: self.generation,
            kind,
        });
    }
}

/// Everything a transport task needs besides its address.
pub(crate) struct TaskContext {
    pub(crate) sink: EventSink,
    pub(crate) outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) options: TransportOptions,
}

/// Resolves once a close has been requested or the handle is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// The handle side of a transport task, identical for both kinds.
#[derive(Debug)]
pub(crate) struct Link {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<SocketState>,
    task: JoinHandle<()>,
}

impl Link {
    /// Spawn `run` with a fresh context and return the handle to it.
    pub(crate) fn spawn<F, Fut>(
        generation: u64,
        events: mpsc::UnboundedSender<TransportEvent>,
        options: TransportOptions,
        run: F,
    ) -> Self
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SocketState::Unconnected);

        let context = TaskContext {
            sink: EventSink {
                generation,
                events,
                state: state_tx,
            },
            outbound: outbound_rx,
            shutdown: shutdown_rx,
            options,
        };
        let task = tokio::spawn(run(context));

        Self {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            state: state_rx,
            task,
        }
    }

    pub(crate) fn socket_state(&self) -> SocketState {
        *self.state.borrow()
    }

    pub(crate) fn send(&self, bytes: Vec<u8>) -> bool {
        self.outbound.send(bytes).is_ok()
    }

    /// Request a graceful close, then abort the task if it outlives `grace`.
    pub(crate) fn close(self, grace: Duration) {
        let _ = self.shutdown.send(true);
        let mut task = self.task;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) if !grace.is_zero() => {
                runtime.spawn(async move {
                    if tokio::time::timeout(grace, &mut task).await.is_err() {
                        tracing::debug!("transport did not close within {grace:?}, aborting");
                        task.abort();
                    }
                });
            }
            _ => task.abort(),
        }
    }
}

/// A live transport of either kind.
#[derive(Debug)]
pub enum Transport {
    /// TCP stream transport.
    Stream(StreamTransport),
    /// WebSocket message transport.
    Message(MessageTransport),
}

impl Transport {
    /// Start a transport of `kind` towards `address:port`.
    pub fn open(
        kind: TransportKind,
        address: &str,
        port: u16,
        generation: u64,
        events: mpsc::UnboundedSender<TransportEvent>,
        options: TransportOptions,
    ) -> Self {
        match kind {
            TransportKind::Stream => Self::Stream(StreamTransport::open(
                address, port, generation, events, options,
            )),
            TransportKind::Message => Self::Message(MessageTransport::open(
                address, port, generation, events, options,
            )),
        }
    }

    /// Which implementation this is.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stream(_) => TransportKind::Stream,
            Self::Message(_) => TransportKind::Message,
        }
    }

    /// Last state reported by the transport task.
    pub fn socket_state(&self) -> SocketState {
        match self {
            Self::Stream(transport) => transport.link.socket_state(),
            Self::Message(transport) => transport.link.socket_state(),
        }
    }

    /// Whether the transport reports [`SocketState::Connected`].
    pub fn is_connected(&self) -> bool {
        self.socket_state() == SocketState::Connected
    }

    /// Queue bytes for the writer. Returns `false` if the task is gone.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        match self {
            Self::Stream(transport) => transport.link.send(bytes),
            Self::Message(transport) => transport.link.send(bytes),
        }
    }

    /// Close gracefully, falling back to an abort after `grace`.
    pub fn close(self, grace: Duration) {
        match self {
            Self::Stream(transport) => transport.link.close(grace),
            Self::Message(transport) => transport.link.close(grace),
        }
    }
}

/// Owner of at most one live [`Transport`].
#[derive(Debug, Default)]
pub struct TransportSlot {
    active: Option<Transport>,
    options: TransportOptions,
}

impl TransportSlot {
    /// Create an empty slot.
    pub fn new(options: TransportOptions) -> Self {
        Self {
            active: None,
            options,
        }
    }

    /// Close whatever is live, then open a new transport.
    pub fn open(
        &mut self,
        kind: TransportKind,
        address: &str,
        port: u16,
        generation: u64,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) {
        self.close();
        self.active = Some(Transport::open(
            kind,
            address,
            port,
            generation,
            events,
            self.options.clone(),
        ));
    }

    /// Close and release the live transport. Returns `false` if there was none.
    pub fn close(&mut self) -> bool {
        match self.active.take() {
            Some(transport) => {
                tracing::debug!(kind = ?transport.kind(), "closing transport");
                transport.close(self.options.close_grace);
                true
            }
            None => false,
        }
    }

    /// Whether a transport is live and connected.
    pub fn is_connected(&self) -> bool {
        self.active.as_ref().is_some_and(Transport::is_connected)
    }

    /// Queue bytes on the live transport. Returns `false` if there is none.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        self.active
            .as_ref()
            .is_some_and(|transport| transport.send(bytes))
    }

    /// Kind of the live transport.
    pub fn kind(&self) -> Option<TransportKind> {
        self.active.as_ref().map(Transport::kind)
    }
}
