//! Command-line argument parsing for the client.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dro_net::{ProtocolKind, ServerDescriptor};

use crate::{Config, ConfigError};

/// Transport selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProtocolArg {
    /// Plain TCP.
    Tcp,
    /// WebSocket.
    Websocket,
}

impl From<ProtocolArg> for ProtocolKind {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Tcp => ProtocolKind::Stream,
            ProtocolArg::Websocket => ProtocolKind::Message,
        }
    }
}

/// Client command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "dro-client", about = "Connect to a DRO/AO2 server")]
pub struct CliArgs {
    /// Saved server to connect to, by name.
    #[arg(long)]
    pub server: Option<String>,

    /// Server address (overrides the saved server's address).
    #[arg(long)]
    pub address: Option<String>,

    /// TCP port.
    #[arg(long)]
    pub port: Option<u16>,

    /// WebSocket port.
    #[arg(long)]
    pub ws_port: Option<u16>,

    /// Transport to use.
    #[arg(long, value_enum)]
    pub protocol: Option<ProtocolArg>,

    /// Connection attempt timeout in milliseconds.
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ms) = args.connect_timeout_ms {
            self.network.connect_timeout_ms = ms;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

impl CliArgs {
    /// Resolve the server to connect to.
    ///
    /// Starts from the saved server named by `--server`, or a fresh entry
    /// when only `--address` is given, or the first saved server otherwise.
    /// Address, port and protocol flags are then applied on top.
    pub fn descriptor(&self, config: &Config) -> Result<ServerDescriptor, ConfigError> {
        let mut server = match (&self.server, &self.address) {
            (Some(name), _) => config
                .find_server(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownServer(name.clone()))?,
            (None, Some(address)) => ServerDescriptor {
                name: address.clone(),
                protocol: ProtocolKind::Stream,
                ..ServerDescriptor::default()
            },
            (None, None) => config.servers.first().cloned().ok_or(ConfigError::NoServer)?,
        };

        if let Some(ref address) = self.address {
            server.address = address.clone();
        }
        if let Some(port) = self.port {
            server.port = port;
        }
        if let Some(ws_port) = self.ws_port {
            server.ws_port = ws_port;
        }
        if let Some(protocol) = self.protocol {
            server.protocol = protocol.into();
        }
        Ok(server)
    }
}
