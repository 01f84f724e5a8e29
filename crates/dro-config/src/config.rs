//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;
use std::time::Duration;

use dro_net::{ConnectionConfig, ProtocolKind, ServerDescriptor};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Connection tunables.
    pub network: NetworkConfig,
    /// Saved servers, in display order.
    pub servers: Vec<ServerDescriptor>,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Connection tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// How long a connection attempt may take, in milliseconds.
    pub connect_timeout_ms: u64,
    /// How long a graceful close may take before the socket is dropped, in
    /// milliseconds.
    pub close_grace_ms: u64,
    /// Disable Nagle's algorithm on TCP sockets.
    pub tcp_nodelay: bool,
    /// Size of the TCP read buffer in bytes.
    pub read_buffer_size: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            servers: vec![
                ServerDescriptor::new("127.0.0.1", 27016, 27017, ProtocolKind::Stream)
                    .named("Localhost"),
            ],
            debug: DebugConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            close_grace_ms: 1000,
            tcp_nodelay: true,
            read_buffer_size: 4096,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl From<&NetworkConfig> for ConnectionConfig {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(network.connect_timeout_ms),
            close_grace: Duration::from_millis(network.close_grace_ms),
            tcp_nodelay: network.tcp_nodelay,
            // A zero-sized buffer would read nothing.
            read_buffer_size: network.read_buffer_size.max(1),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!(
                "Loaded config from {} ({} saved servers)",
                config_path.display(),
                config.servers.len()
            );
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Saved server with the given name, compared case-insensitively.
    pub fn find_server(&self, name: &str) -> Option<&ServerDescriptor> {
        self.servers
            .iter()
            .find(|server| server.name.eq_ignore_ascii_case(name))
    }

    /// Connection tunables in the form the network layer takes.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::from(&self.network)
    }
}
