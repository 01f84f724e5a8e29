//! Connection targets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::TransportKind;

/// Which transport a server is reached over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    /// No protocol selected.
    #[default]
    #[serde(alias = "inactive")]
    Inactive,
    /// Plain TCP byte stream.
    #[serde(alias = "tcp")]
    Stream,
    /// WebSocket messages.
    #[serde(alias = "websocket", alias = "ws")]
    Message,
}

/// A server the client can connect to.
///
/// Built by configuration or UI code and handed by value to
/// [`ServerConnection::connect`](crate::ServerConnection::connect).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerDescriptor {
    /// Display name.
    pub name: String,
    /// Free-form description shown in server lists.
    pub description: String,
    /// Host name or IP address.
    pub address: String,
    /// TCP port.
    pub port: u16,
    /// WebSocket port.
    pub ws_port: u16,
    /// Transport to use.
    pub protocol: ProtocolKind,
}

impl ServerDescriptor {
    /// Create a descriptor for `address` with both ports and a protocol.
    pub fn new(
        address: impl Into<String>,
        port: u16,
        ws_port: u16,
        protocol: ProtocolKind,
    ) -> Self {
        Self {
            address: address.into(),
            port,
            ws_port,
            protocol,
            ..Self::default()
        }
    }

    /// Builder-style name setter.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The transport a connection attempt opens.
    ///
    /// [`ProtocolKind::Inactive`] falls back to the stream transport.
    pub fn transport_kind(&self) -> TransportKind {
        match self.protocol {
            ProtocolKind::Message => TransportKind::Message,
            ProtocolKind::Stream | ProtocolKind::Inactive => TransportKind::Stream,
        }
    }

    /// The port matching [`transport_kind`](Self::transport_kind).
    pub fn active_port(&self) -> u16 {
        match self.transport_kind() {
            TransportKind::Stream => self.port,
            TransportKind::Message => self.ws_port,
        }
    }

    /// `address:port` for the active transport, or an empty string when no
    /// address is set.
    pub fn to_address(&self) -> String {
        if self.address.is_empty() {
            return String::new();
        }
        format!("{}:{}", self.address, self.active_port())
    }

    /// Short identifying text for diagnostics: the name and the address when
    /// both are present, whichever one is set otherwise.
    pub fn to_info(&self) -> String {
        let address = self.to_address();
        match (self.name.is_empty(), address.is_empty()) {
            (false, false) => format!("{} ({address})", self.name),
            (false, true) => self.name.clone(),
            (true, false) => address,
            (true, true) => String::new(),
        }
    }

    /// URL opened by the message transport.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.address, self.ws_port)
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_info())
    }
}
