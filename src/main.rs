//! Node daemon entry point.
//!
//! # Usage
//! ```text
//! peerchain [config.json]
//! ```
//!
//! The configuration file provides the listen address, database location
//! and key directory; see [`peerchain::config::NodeConfig`].

use peerchain::config::NodeConfig;
use peerchain::core::node::Core;
use peerchain::crypto::vault::KeyVault;
use peerchain::network::host::Host;
use peerchain::network::Endpoint;
use peerchain::storage::block_store::BlockStore;
use peerchain::utils::log;
use peerchain::{error, info, vm};
use std::path::Path;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    log::init(log::Level::Info);

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = NodeConfig::load(Path::new(&config_path))
        .map_err(|e| format!("cannot load {config_path}: {e}"))?;

    let listen = Endpoint::parse(&config.listen_address)
        .ok_or_else(|| format!("invalid listen address {}", config.listen_address))?;
    let public_port = config.public_port.unwrap_or(listen.port);

    let vault = KeyVault::open(&config.keys_dir).map_err(|e| format!("key vault: {e}"))?;
    info!("node address: {}", vault.node_address());

    let store = BlockStore::open(&config.database.path, config.database.clean)
        .map_err(|e| format!("block store: {e}"))?;

    let core =
        Core::new(store, vault.node_address(), vm::load()).map_err(|e| format!("core: {e}"))?;
    info!(
        "chain loaded at depth {} ({})",
        core.get_top_block().depth,
        core.get_top_block_hash()
    );

    let bootstrap: Vec<Endpoint> = config
        .known_peers
        .iter()
        .filter_map(|s| Endpoint::parse(s))
        .collect();

    let host = Host::new(core, listen, public_port, config.max_peers, bootstrap);
    host.run().await.map_err(|e| format!("network: {e}"))
}
