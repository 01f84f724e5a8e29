//! Client transport and wire protocol: one live server connection over TCP or
//! WebSocket, delimiter-framed packets, and transport-agnostic events.

pub mod connection;
pub mod framing;
pub mod handle;
pub mod packet;
pub mod server;
pub mod state;
pub mod transport;

pub use connection::{
    ConnectionConfig, ConnectionEvent, EventReceiver, InternalEvent, ServerConnection,
};
pub use framing::UnitBuffer;
pub use handle::{Command, HandleError, ServerHandle, spawn};
pub use packet::{FIELD_DELIMITER, Packet, SUB_FIELD_DELIMITER, UNIT_TERMINATOR};
pub use server::{ProtocolKind, ServerDescriptor};
pub use state::{
    ConnectionState, ConnectionStateWatch, DEFAULT_CONNECT_TIMEOUT, StateMachine, Watchdog,
};
pub use transport::{
    SocketState, Transport, TransportError, TransportKind, TransportOptions, TransportSlot,
};
