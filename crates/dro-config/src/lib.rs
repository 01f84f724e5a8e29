//! Client configuration.
//!
//! Settings persist to disk as RON, can be overridden from the command line,
//! and carry the list of saved servers the client can connect to.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, ProtocolArg};
pub use config::{Config, DebugConfig, NetworkConfig};
pub use error::ConfigError;
