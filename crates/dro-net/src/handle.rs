//! Actor wrapper running a [`ServerConnection`] on its own task.
//!
//! Commands from any number of [`ServerHandle`] clones and notifications from
//! the transport are applied by one loop, so the connection itself never
//! needs a lock.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::connection::{ConnectionConfig, EventReceiver, ServerConnection};
use crate::packet::Packet;
use crate::server::ServerDescriptor;
use crate::state::ConnectionState;

/// Capacity of the command inbox.
const COMMAND_CAPACITY: usize = 64;

/// Requests accepted by the connection actor.
#[derive(Debug)]
pub enum Command {
    /// Connect to a server, replacing any current connection.
    Connect(ServerDescriptor),
    /// Drop the current connection.
    Disconnect,
    /// Send a packet if connected.
    Send(Packet),
    /// Disconnect and stop the actor.
    Shutdown,
}

/// Errors returned by [`ServerHandle`] operations.
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    /// The actor task has stopped.
    #[error("connection task has stopped")]
    Closed,
}

/// Cloneable handle to a running connection actor.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    sender: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ServerHandle {
    /// Connect to `server`. Progress arrives on the event channel.
    pub async fn connect(&self, server: ServerDescriptor) -> Result<(), HandleError> {
        self.command(Command::Connect(server)).await
    }

    /// Drop the current connection.
    pub async fn disconnect(&self) -> Result<(), HandleError> {
        self.command(Command::Disconnect).await
    }

    /// Send `packet`. Dropped by the actor when not connected.
    pub async fn send(&self, packet: Packet) -> Result<(), HandleError> {
        self.command(Command::Send(packet)).await
    }

    /// Disconnect and stop the actor.
    pub async fn shutdown(&self) -> Result<(), HandleError> {
        self.command(Command::Shutdown).await
    }

    /// Last state published by the actor.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the actor's connection is established.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    async fn command(&self, command: Command) -> Result<(), HandleError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| HandleError::Closed)
    }
}

/// Start a connection actor on the current runtime.
///
/// Returns the handle, the event channel and the actor's task. The actor
/// stops on [`Command::Shutdown`] or once every handle is dropped.
pub fn spawn(config: ConnectionConfig) -> (ServerHandle, EventReceiver, JoinHandle<()>) {
    let (connection, events) = ServerConnection::new(config);
    let (sender, inbox) = mpsc::channel(COMMAND_CAPACITY);

    let handle = ServerHandle {
        sender,
        state: connection.subscribe_state(),
    };
    let task = tokio::spawn(ConnectionActor { connection, inbox }.run());

    (handle, events, task)
}

struct ConnectionActor {
    connection: ServerConnection,
    inbox: mpsc::Receiver<Command>,
}

impl ConnectionActor {
    async fn run(mut self) {
        tracing::debug!("connection actor started");

        loop {
            tokio::select! {
                command = self.inbox.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.apply(command),
                    }
                }
                event = self.connection.next_internal() => self.connection.handle(event),
            }
        }

        self.connection.disconnect();
        tracing::debug!("connection actor stopped");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Connect(server) => self.connection.connect(server),
            Command::Disconnect => self.connection.disconnect(),
            Command::Send(packet) => self.connection.send(&packet),
            Command::Shutdown => {}
        }
    }
}
