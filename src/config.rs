//! Node configuration, loaded once at startup from a JSON file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Persistent store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the key-value database.
    pub path: PathBuf,
    /// Wipe and reinitialize the database on startup.
    #[serde(default)]
    pub clean: bool,
}

/// Top-level node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Address to accept peer connections on, e.g. `"0.0.0.0:30301"`.
    pub listen_address: String,
    /// Externally reachable port advertised to peers; defaults to the
    /// listen port.
    #[serde(default)]
    pub public_port: Option<u16>,
    /// Peer pool capacity.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
    /// Peers to dial on startup, as `"host:port"`.
    #[serde(default)]
    pub known_peers: Vec<String>,
    pub database: DatabaseConfig,
    /// Directory holding the RSA key pair.
    pub keys_dir: PathBuf,
}

fn default_max_peers() -> usize {
    crate::network::peer::DEFAULT_MAX_PEERS
}

/// Failures while reading the configuration file.
#[derive(Debug, peerchain_derive::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Unreadable(String),
    #[error("malformed config: {0}")]
    Malformed(String),
}

impl NodeConfig {
    /// Reads and parses the configuration at `path`.
    pub fn load(path: &Path) -> Result<NodeConfig, ConfigError> {
        let raw =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}
