//! Connection state machine.
//!
//! Maps native socket states onto the three application-visible
//! [`ConnectionState`]s, publishes genuine changes through a [`watch`]
//! channel so any number of consumers can observe them without polling, and
//! owns the single-shot connect-timeout [`Watchdog`].

use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::transport::SocketState;

/// Default time a connection may spend in [`ConnectionState::Connecting`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection, or the last one ended.
    #[default]
    NotConnected,
    /// Transport opened, waiting for it to come up.
    Connecting,
    /// Transport established, ready for communication.
    Connected,
}

impl ConnectionState {
    /// Map a native socket state. Intermediate states have no mapping.
    pub fn from_socket(state: SocketState) -> Option<Self> {
        match state {
            SocketState::Unconnected => Some(Self::NotConnected),
            SocketState::Connecting => Some(Self::Connecting),
            SocketState::Connected => Some(Self::Connected),
            SocketState::HostLookup | SocketState::Closing => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotConnected => "not connected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Observable connection state backed by a [`watch`] channel.
#[derive(Debug)]
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::NotConnected`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::NotConnected);
        Self { tx }
    }

    /// Set the state. Subscribers are only woken, and `true` only returned,
    /// when the value actually changes.
    pub fn set(&self, state: ConnectionState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }
}

/// Single-shot connect timer for one connection attempt.
///
/// When it fires it posts the attempt's generation on the channel it was
/// started with. Cancelling or dropping it before then guarantees nothing is
/// posted.
#[derive(Debug)]
pub struct Watchdog {
    generation: u64,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Start a timer that reports `generation` on `fired` after `timeout`.
    pub fn start(timeout: Duration, generation: u64, fired: mpsc::UnboundedSender<u64>) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = fired.send(generation);
        });
        Self { generation, task }
    }

    /// Connection attempt this timer belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the timer.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Applies socket-state reports and keeps the watchdog in step.
#[derive(Debug)]
pub struct StateMachine {
    watch: ConnectionStateWatch,
    watchdog: Option<Watchdog>,
    armed_generation: Option<u64>,
    connect_timeout: Duration,
    fired: mpsc::UnboundedSender<u64>,
}

impl StateMachine {
    /// Create a machine in [`ConnectionState::NotConnected`]. Watchdog
    /// expiries are posted on `fired`.
    pub fn new(connect_timeout: Duration, fired: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            watch: ConnectionStateWatch::new(),
            watchdog: None,
            armed_generation: None,
            connect_timeout,
            fired,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.watch.current()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.watch.subscribe()
    }

    /// Whether a watchdog is running.
    pub fn watchdog_armed(&self) -> bool {
        self.watchdog.is_some()
    }

    /// Apply a socket-state report from the transport of attempt
    /// `generation`.
    ///
    /// Entering [`ConnectionState::Connecting`] arms the watchdog, at most
    /// once per attempt; reaching either other state disarms it. Returns the
    /// new state only if it differs from the previous one.
    pub fn apply(&mut self, socket: SocketState, generation: u64) -> Option<ConnectionState> {
        let next = ConnectionState::from_socket(socket)?;

        match next {
            ConnectionState::Connecting => {
                if self.armed_generation != Some(generation) {
                    self.armed_generation = Some(generation);
                    self.watchdog = Some(Watchdog::start(
                        self.connect_timeout,
                        generation,
                        self.fired.clone(),
                    ));
                }
            }
            ConnectionState::Connected | ConnectionState::NotConnected => self.disarm(),
        }

        self.watch.set(next).then_some(next)
    }

    /// Force [`ConnectionState::NotConnected`] and stop the watchdog.
    /// Returns the new state only if it was a change.
    pub fn reset(&mut self) -> Option<ConnectionState> {
        self.disarm();
        self.watch
            .set(ConnectionState::NotConnected)
            .then_some(ConnectionState::NotConnected)
    }

    fn disarm(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            tracing::trace!(generation = watchdog.generation(), "connect watchdog cancelled");
            watchdog.cancel();
        }
    }
}
