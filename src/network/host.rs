//! The overlay host: listener, dialer, liveness and gossip fan-out.

use crate::core::node::Core;
use crate::network::peer::{Peer, PeerInfo, PeerPool};
use crate::network::protocol::{self, Message, MessageKind, ProtocolContext, RefusalReason};
use crate::network::session::{self, Session};
use crate::network::{Endpoint, NetworkError};
use crate::types::address::Address;
use crate::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::interval;

/// How often idle peers are pinged.
const LIVENESS_INTERVAL_SECS: u64 = 30;

/// A peer silent for longer than this is dropped.
const LIVENESS_WINDOW_SECS: u64 = 120;

/// Network front of one node.
///
/// Cheaply clonable: every task owns a clone and shares the pool and core
/// through the embedded `Arc`s.
#[derive(Clone)]
pub struct Host {
    core: Arc<Core>,
    pool: Arc<PeerPool>,
    listen: Endpoint,
    public_port: u16,
    bootstrap: Vec<Endpoint>,
}

impl Host {
    pub fn new(
        core: Arc<Core>,
        listen: Endpoint,
        public_port: u16,
        max_peers: usize,
        bootstrap: Vec<Endpoint>,
    ) -> Host {
        Host {
            core,
            pool: Arc::new(PeerPool::new(max_peers)),
            listen,
            public_port,
            bootstrap,
        }
    }

    /// Number of currently connected peers.
    pub fn peer_count(&self) -> usize {
        self.pool.len()
    }

    /// Binds the listener and spawns the accept, liveness and dial tasks.
    ///
    /// Returns the bound address (useful when listening on port 0).
    pub async fn start(&self) -> Result<SocketAddr, NetworkError> {
        self.subscribe_events();

        let listener = TcpListener::bind(self.listen.to_string()).await?;
        let addr = listener.local_addr()?;
        info!("listening on {addr}");

        self.spawn_liveness();

        let host = self.clone();
        tokio::spawn(async move {
            host.accept_loop(listener).await;
        });

        for endpoint in &self.bootstrap {
            self.check_out_peer(endpoint);
        }

        Ok(addr)
    }

    /// Runs the host until the process ends.
    pub async fn run(&self) -> Result<(), NetworkError> {
        self.start().await?;
        std::future::pending::<()>().await;
        unreachable!()
    }

    /// Wires block and transaction events into gossip.
    fn subscribe_events(&self) {
        let pool = Arc::clone(&self.pool);
        self.core.subscribe_to_block_addition(move |(_, block)| {
            pool.broadcast(&Message::Block(block.clone()));
        });

        let pool = Arc::clone(&self.pool);
        self.core.subscribe_to_new_pending_transaction(move |tx| {
            pool.broadcast(&Message::Transaction(tx.clone()));
        });
    }

    async fn accept_loop(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    debug!("inbound connection from {remote}");
                    let host = self.clone();
                    tokio::spawn(async move {
                        host.handle_inbound(stream).await;
                    });
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                }
            }
        }
    }

    async fn handle_inbound(&self, stream: TcpStream) {
        let (session, reader) = Session::start(stream);
        let peer = Peer::new(Arc::clone(&session));

        if !self.pool.try_add_peer(Arc::clone(&peer)) {
            // Tell the refused peer where else it can go
            peer.send(&Message::CannotAccept {
                reason: RefusalReason::PoolIsFull,
                peers: self.pool.all_peers_info(),
            });
            peer.close();
            return;
        }

        peer.send(&protocol::accepted_greeting(self));
        peer.expect_reply(Some(MessageKind::AcceptedResponse));
        self.read_loop(peer, reader).await;
    }

    async fn handle_outbound(&self, stream: TcpStream) {
        let (session, reader) = Session::start(stream);
        let peer = Peer::new(Arc::clone(&session));

        if !self.pool.try_add_peer(Arc::clone(&peer)) {
            peer.close();
            return;
        }

        // The accepting side speaks first
        peer.expect_reply(Some(MessageKind::Accepted));
        self.read_loop(peer, reader).await;
    }

    /// Drives one peer's inbound frames until the session dies.
    async fn read_loop(&self, peer: Arc<Peer>, mut reader: OwnedReadHalf) {
        loop {
            if peer.is_closed() {
                break;
            }
            match session::read_frame(&mut reader).await {
                Ok(frame) => protocol::process(self, &peer, &frame),
                Err(_) => break,
            }
        }

        debug!("peer {} disconnected", peer.endpoint());
        self.pool.remove_peer(peer.id());
        peer.close();
    }

    fn spawn_liveness(&self) {
        let host = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(LIVENESS_INTERVAL_SECS));
            loop {
                ticker.tick().await;

                let mut dead: Vec<Arc<Peer>> = Vec::new();
                host.pool.for_each_peer(|peer| {
                    if peer.is_closed() || peer.idle_seconds() > LIVENESS_WINDOW_SECS {
                        dead.push(Arc::clone(peer));
                    } else {
                        peer.send(&Message::Ping);
                    }
                });

                for peer in dead {
                    debug!("dropping silent peer {}", peer.endpoint());
                    peer.close();
                    host.pool.remove_peer(peer.id());
                }
            }
        });
    }
}

impl ProtocolContext for Host {
    fn core(&self) -> &Arc<Core> {
        &self.core
    }

    fn public_port(&self) -> u16 {
        self.public_port
    }

    fn peers_info_except(&self, address: &Address) -> Vec<PeerInfo> {
        self.pool.peers_info_except(address)
    }

    fn all_peers_info(&self) -> Vec<PeerInfo> {
        self.pool.all_peers_info()
    }

    fn lookup(&self, target: &Address, limit: usize) -> Vec<PeerInfo> {
        self.pool.lookup(target, limit)
    }

    fn is_known(&self, endpoint: &Endpoint) -> bool {
        *endpoint == self.listen
            || endpoint.port == self.public_port && endpoint.host == self.listen.host
            || self.pool.is_connected_to(endpoint)
    }

    fn check_out_peer(&self, endpoint: &Endpoint) {
        if self.is_known(endpoint) {
            return;
        }

        let host = self.clone();
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            debug!("dialing {endpoint}");
            match TcpStream::connect(endpoint.to_string()).await {
                Ok(stream) => host.handle_outbound(stream).await,
                Err(e) => warn!("failed to connect to {endpoint}: {e}"),
            }
        });
    }

    fn remove_peer(&self, peer: &Arc<Peer>) {
        self.pool.remove_peer(peer.id());
    }

    fn gossip(&self, message: &Message) {
        self.pool.broadcast(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::PrivateKey;
    use crate::storage::block_store::BlockStore;
    use crate::types::balance::Balance;
    use crate::utils::test_utils::{block_on, signed_transfer};
    use crate::vm::DisabledEvaluator;
    use tempfile::TempDir;

    fn core_with(dir: &TempDir, alloc: &[(Address, Balance)], tag: &[u8]) -> Arc<Core> {
        let store = BlockStore::open(dir.path(), false).unwrap();
        Core::with_initial_accounts(
            store,
            Address::from_public_key_bytes(tag),
            Arc::new(DisabledEvaluator),
            alloc,
        )
        .unwrap()
    }

    fn local_host(core: Arc<Core>, max_peers: usize) -> Host {
        Host::new(
            core,
            Endpoint::new("127.0.0.1", 0),
            0,
            max_peers,
            Vec::new(),
        )
    }

    async fn converged(a: &Arc<Core>, b: &Arc<Core>) -> bool {
        for _ in 0..200 {
            if a.get_top_block_hash() == b.get_top_block_hash() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn two_nodes_handshake_and_sync() {
        // Shared funded key so both nodes accept the same chain
        let key = PrivateKey::generate();
        let sender = key.public_key().address();
        let alloc = [(sender, Balance::from(1_000_000u64))];

        let dir_y = TempDir::new().unwrap();
        let y = core_with(&dir_y, &alloc, b"node y");

        // Y builds a chain of 5 blocks
        let mut blocks = Vec::new();
        for i in 0..5u32 {
            let tx = signed_transfer(
                &key,
                Address::from_public_key_bytes(b"sink"),
                1,
                0,
                1600000000 + i,
            );
            let block = block_on(
                &y.get_top_block(),
                Address::from_public_key_bytes(b"miner"),
                vec![tx],
            );
            assert!(y.try_add_block(&block));
            blocks.push(block);
        }

        // X only has the first 2
        let dir_x = TempDir::new().unwrap();
        let x = core_with(&dir_x, &alloc, b"node x");
        assert!(x.try_add_block(&blocks[0]));
        assert!(x.try_add_block(&blocks[1]));

        let host_y = local_host(Arc::clone(&y), 8);
        let addr_y = host_y.start().await.unwrap();

        let host_x = local_host(Arc::clone(&x), 8);
        host_x.start().await.unwrap();

        // X dials Y; the handshake leaves X syncing the missing 3 blocks
        host_x.check_out_peer(&Endpoint::new("127.0.0.1", addr_y.port()));

        assert!(converged(&x, &y).await, "nodes never converged");
        assert_eq!(x.get_top_block().depth, 5);
        assert_eq!(host_x.peer_count(), 1);
        assert_eq!(host_y.peer_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transaction_gossip_reaches_peer() {
        let key = PrivateKey::generate();
        let sender = key.public_key().address();
        let alloc = [(sender, Balance::from(1_000u64))];

        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let a = core_with(&dir_a, &alloc, b"node a");
        let b = core_with(&dir_b, &alloc, b"node b");

        let host_a = local_host(Arc::clone(&a), 8);
        let addr_a = host_a.start().await.unwrap();
        let host_b = local_host(Arc::clone(&b), 8);
        host_b.start().await.unwrap();

        host_b.check_out_peer(&Endpoint::new("127.0.0.1", addr_a.port()));

        // Wait for the handshake to settle
        for _ in 0..200 {
            if host_a.peer_count() == 1 && host_b.peer_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        // Submitting locally on A must gossip to B
        let tx = signed_transfer(&key, Address::from_public_key_bytes(b"r"), 5, 1, 1600000000);
        a.add_pending_transaction(tx);

        let mut seen = false;
        for _ in 0..200 {
            if b.pending_len() == 1 {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(seen, "transaction never reached the peer");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_pool_refuses_with_alternatives() {
        let dir_a = TempDir::new().unwrap();
        let a = core_with(&dir_a, &[], b"node a");
        // Capacity 1: the second dialer is refused
        let host_a = local_host(Arc::clone(&a), 1);
        let addr_a = host_a.start().await.unwrap();

        let dir_b = TempDir::new().unwrap();
        let b = core_with(&dir_b, &[], b"node b");
        let host_b = local_host(Arc::clone(&b), 8);
        host_b.start().await.unwrap();
        host_b.check_out_peer(&Endpoint::new("127.0.0.1", addr_a.port()));

        for _ in 0..200 {
            if host_a.peer_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(host_a.peer_count(), 1);

        let dir_c = TempDir::new().unwrap();
        let c = core_with(&dir_c, &[], b"node c");
        let host_c = local_host(Arc::clone(&c), 8);
        host_c.start().await.unwrap();
        host_c.check_out_peer(&Endpoint::new("127.0.0.1", addr_a.port()));

        // C is refused and ends up with no peers
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(host_a.peer_count(), 1);
        assert_eq!(host_c.peer_count(), 0);
    }
}
