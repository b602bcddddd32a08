//! Peers and the bounded peer pool.

use crate::core::block::Block;
use crate::network::protocol::{Message, MessageKind};
use crate::network::session::Session;
use crate::network::Endpoint;
use crate::types::address::Address;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use dashmap::DashMap;
use peerchain_derive::BinaryCodec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Default ceiling on simultaneous peers.
pub const DEFAULT_MAX_PEERS: usize = 32;

/// Synchronization progress of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Connected, handshake not yet reconciled.
    JustEstablished,
    /// Behind this peer; walking its parent chain via GetBlock.
    RequestedBlocks,
    /// Tops reconciled; only gossip flows.
    Synchronised,
}

/// Advertised identity of a peer, exchanged in greetings and gossip.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct PeerInfo {
    /// Endpoint the peer accepts connections on.
    pub endpoint: Endpoint,
    /// The peer's node address.
    pub address: Address,
}

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(0);

/// One remote node.
pub struct Peer {
    id: u64,
    session: Arc<Session>,
    state: Mutex<PeerState>,
    /// Endpoint the peer listens on, learned from its greeting.
    server_endpoint: Mutex<Option<Endpoint>>,
    /// The peer's node address, learned from its greeting.
    address: Mutex<Address>,
    last_seen: Mutex<Instant>,
    /// Blocks received while chasing a parent chain, lowest depth first.
    sync_blocks: Mutex<VecDeque<Block>>,
    /// Reply type this peer owes us; anything else is ignored.
    expected_reply: Mutex<Option<MessageKind>>,
    rating: AtomicI32,
}

impl Peer {
    /// Initial behavior score; misbehaving peers count down.
    const INITIAL_RATING: i32 = 10;

    pub fn new(session: Arc<Session>) -> Arc<Peer> {
        Arc::new(Peer {
            id: NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed),
            session,
            state: Mutex::new(PeerState::JustEstablished),
            server_endpoint: Mutex::new(None),
            address: Mutex::new(Address::null()),
            last_seen: Mutex::new(Instant::now()),
            sync_blocks: Mutex::new(VecDeque::new()),
            expected_reply: Mutex::new(None),
            rating: AtomicI32::new(Self::INITIAL_RATING),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Serializes and queues a protocol message.
    pub fn send(&self, message: &Message) -> bool {
        self.session.send(message.to_bytes())
    }

    /// Queues an already-serialized payload.
    pub fn send_raw(&self, payload: crate::types::bytes::Bytes) -> bool {
        self.session.send(payload)
    }

    pub fn state(&self) -> PeerState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: PeerState) {
        *self.state.lock().unwrap() = state;
    }

    /// Endpoint of the underlying connection.
    pub fn endpoint(&self) -> Endpoint {
        self.session.remote().clone()
    }

    pub fn server_endpoint(&self) -> Option<Endpoint> {
        self.server_endpoint.lock().unwrap().clone()
    }

    pub fn set_server_endpoint(&self, endpoint: Endpoint) {
        *self.server_endpoint.lock().unwrap() = Some(endpoint);
    }

    pub fn address(&self) -> Address {
        *self.address.lock().unwrap()
    }

    pub fn set_address(&self, address: Address) {
        *self.address.lock().unwrap() = address;
    }

    pub fn refresh_last_seen(&self) {
        *self.last_seen.lock().unwrap() = Instant::now();
    }

    /// Seconds since the last inbound byte.
    pub fn idle_seconds(&self) -> u64 {
        self.last_seen.lock().unwrap().elapsed().as_secs()
    }

    /// Buffers an out-of-order block while walking a parent chain.
    ///
    /// Blocks arrive newest-first during sync, so pushing to the front
    /// keeps the buffer ordered by ascending depth.
    pub fn add_sync_block(&self, block: Block) {
        self.sync_blocks.lock().unwrap().push_front(block);
    }

    /// Parent hash of the lowest buffered block: the next one to request.
    pub fn next_sync_parent(&self) -> Option<Hash> {
        self.sync_blocks.lock().unwrap().front().map(|b| b.prev_hash)
    }

    /// Drains the buffer in application (ascending depth) order.
    pub fn take_sync_blocks(&self) -> Vec<Block> {
        self.sync_blocks.lock().unwrap().drain(..).collect()
    }

    pub fn sync_blocks_len(&self) -> usize {
        self.sync_blocks.lock().unwrap().len()
    }

    pub fn expected_reply(&self) -> Option<MessageKind> {
        *self.expected_reply.lock().unwrap()
    }

    pub fn expect_reply(&self, kind: Option<MessageKind>) {
        *self.expected_reply.lock().unwrap() = kind;
    }

    /// Penalizes a protocol violation.
    pub fn decrease_rating(&self) -> i32 {
        self.rating.fetch_sub(1, Ordering::Relaxed) - 1
    }

    pub fn rating(&self) -> i32 {
        self.rating.load(Ordering::Relaxed)
    }

    /// Advertised identity, once the greeting has been processed.
    pub fn info(&self) -> Option<PeerInfo> {
        let endpoint = self.server_endpoint()?;
        Some(PeerInfo {
            endpoint,
            address: self.address(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub fn close(&self) {
        self.session.close();
    }
}

/// Bounded set of active peers.
pub struct PeerPool {
    peers: DashMap<u64, Arc<Peer>>,
    max_size: usize,
}

impl PeerPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            peers: DashMap::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Admits a peer unless the pool is full.
    pub fn try_add_peer(&self, peer: Arc<Peer>) -> bool {
        if self.peers.len() >= self.max_size {
            return false;
        }
        self.peers.insert(peer.id(), peer);
        true
    }

    pub fn remove_peer(&self, id: u64) {
        self.peers.remove(&id);
    }

    /// Applies `f` to every active peer.
    pub fn for_each_peer(&self, mut f: impl FnMut(&Arc<Peer>)) {
        for entry in self.peers.iter() {
            f(entry.value());
        }
    }

    /// Queues a message on every active peer.
    pub fn broadcast(&self, message: &Message) {
        let payload = message.to_bytes();
        for entry in self.peers.iter() {
            entry.value().send_raw(payload.clone());
        }
    }

    /// Identities of every peer that has completed its greeting.
    pub fn all_peers_info(&self) -> Vec<PeerInfo> {
        self.peers
            .iter()
            .filter_map(|entry| entry.value().info())
            .collect()
    }

    /// Identities of every greeted peer except the given address.
    pub fn peers_info_except(&self, address: &Address) -> Vec<PeerInfo> {
        self.all_peers_info()
            .into_iter()
            .filter(|info| info.address != *address)
            .collect()
    }

    /// True when some peer is already connected to that endpoint, either as
    /// its socket endpoint or its advertised server endpoint.
    pub fn is_connected_to(&self, endpoint: &Endpoint) -> bool {
        self.peers.iter().any(|entry| {
            let peer = entry.value();
            peer.endpoint() == *endpoint || peer.server_endpoint().as_ref() == Some(endpoint)
        })
    }

    /// Up to `limit` known peers closest to `target` by XOR distance.
    pub fn lookup(&self, target: &Address, limit: usize) -> Vec<PeerInfo> {
        let mut candidates: Vec<(Vec<u8>, PeerInfo)> = self
            .peers
            .iter()
            .filter_map(|entry| {
                let info = entry.value().info()?;
                let distance: Vec<u8> = info
                    .address
                    .as_slice()
                    .iter()
                    .zip(target.as_slice())
                    .map(|(a, b)| a ^ b)
                    .collect();
                Some((distance, info))
            })
            .collect();

        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        candidates
            .into_iter()
            .take(limit)
            .map(|(_, info)| info)
            .collect()
    }
}
