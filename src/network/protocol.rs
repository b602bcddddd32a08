//! Message taxonomy, handshake and the sync state machine.
//!
//! The first byte of every payload is the message tag; the remainder is the
//! variant's payload in codec order. Handlers run synchronously on the
//! receiving peer's read task, so messages from one peer are processed in
//! arrival order.

use crate::core::block::Block;
use crate::core::node::Core;
use crate::core::transaction::Transaction;
use crate::network::peer::{Peer, PeerInfo, PeerState};
use crate::network::Endpoint;
use crate::types::address::Address;
use crate::types::encoding::Decode;
use crate::types::hash::Hash;
use crate::{debug, warn};
use peerchain_derive::BinaryCodec;
use std::sync::Arc;

/// Why an accepting node refused a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub enum RefusalReason {
    PoolIsFull,
}

/// Everything peers say to each other.
#[derive(Debug, Clone, BinaryCodec)]
pub enum Message {
    /// Accepting side's greeting.
    Accepted {
        top_block: Block,
        address: Address,
        public_port: u16,
        peers: Vec<PeerInfo>,
    },
    /// Connecting side's reply to [`Message::Accepted`].
    AcceptedResponse {
        top_block: Block,
        address: Address,
        public_port: u16,
        peers: Vec<PeerInfo>,
    },
    /// Refusal, with alternatives to try.
    CannotAccept {
        reason: RefusalReason,
        peers: Vec<PeerInfo>,
    },
    Ping,
    Pong,
    /// Gossip of a pending transaction.
    Transaction(Transaction),
    /// Request for a block body by hash.
    GetBlock(Hash),
    /// Block body, as a response or as gossip.
    Block(Block),
    /// Negative response to [`Message::GetBlock`].
    BlockNotFound(Hash),
    /// Chain tip query.
    GetInfo,
    /// Response to [`Message::GetInfo`].
    Info {
        top_block_hash: Hash,
        peers: Vec<PeerInfo>,
    },
    /// Gossip about a newly seen node.
    NewNode { endpoint: Endpoint, address: Address },
    /// Graceful teardown.
    Close,
    /// Peer-table query: who is near `target`?
    Lookup { target: Address, limit: u8 },
    /// Response to [`Message::Lookup`].
    LookupResponse { peers: Vec<PeerInfo> },
}

/// Message discriminant, used for reply gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Accepted,
    AcceptedResponse,
    CannotAccept,
    Ping,
    Pong,
    Transaction,
    GetBlock,
    Block,
    BlockNotFound,
    GetInfo,
    Info,
    NewNode,
    Close,
    Lookup,
    LookupResponse,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Accepted { .. } => MessageKind::Accepted,
            Message::AcceptedResponse { .. } => MessageKind::AcceptedResponse,
            Message::CannotAccept { .. } => MessageKind::CannotAccept,
            Message::Ping => MessageKind::Ping,
            Message::Pong => MessageKind::Pong,
            Message::Transaction(_) => MessageKind::Transaction,
            Message::GetBlock(_) => MessageKind::GetBlock,
            Message::Block(_) => MessageKind::Block,
            Message::BlockNotFound(_) => MessageKind::BlockNotFound,
            Message::GetInfo => MessageKind::GetInfo,
            Message::Info { .. } => MessageKind::Info,
            Message::NewNode { .. } => MessageKind::NewNode,
            Message::Close => MessageKind::Close,
            Message::Lookup { .. } => MessageKind::Lookup,
            Message::LookupResponse { .. } => MessageKind::LookupResponse,
        }
    }
}

/// Whether `actual` satisfies a pending expectation of `expected`.
///
/// A request for a block may legitimately come back negative, and a dial
/// may be refused, so those pairs share an expectation slot.
pub fn admits(expected: MessageKind, actual: MessageKind) -> bool {
    if expected == actual {
        return true;
    }
    matches!(
        (expected, actual),
        (MessageKind::Block, MessageKind::BlockNotFound)
            | (MessageKind::Accepted, MessageKind::CannotAccept)
    )
}

/// Node-side capabilities the handlers need beyond the peer itself.
///
/// Implemented by the network host; tests substitute a recording stub.
pub trait ProtocolContext: Send + Sync {
    fn core(&self) -> &Arc<Core>;

    /// Port this node accepts connections on, as advertised to peers.
    fn public_port(&self) -> u16;

    /// Greeted peers, excluding the given node address.
    fn peers_info_except(&self, address: &Address) -> Vec<PeerInfo>;

    /// All greeted peers.
    fn all_peers_info(&self) -> Vec<PeerInfo>;

    /// Known peers nearest to `target`.
    fn lookup(&self, target: &Address, limit: usize) -> Vec<PeerInfo>;

    /// True when the endpoint is this node or an already-connected peer.
    fn is_known(&self, endpoint: &Endpoint) -> bool;

    /// Dials an endpoint in the background.
    fn check_out_peer(&self, endpoint: &Endpoint);

    /// Detaches the peer from the pool.
    fn remove_peer(&self, peer: &Arc<Peer>);

    /// Fans a message out to every connected peer.
    fn gossip(&self, message: &Message);
}

/// Builds this node's greeting for a newly accepted peer.
pub fn accepted_greeting(ctx: &dyn ProtocolContext) -> Message {
    Message::Accepted {
        top_block: ctx.core().get_top_block(),
        address: ctx.core().node_address(),
        public_port: ctx.public_port(),
        peers: ctx.all_peers_info(),
    }
}

/// Builds the reply to a greeting.
fn accepted_response(ctx: &dyn ProtocolContext, exclude: &Address) -> Message {
    Message::AcceptedResponse {
        top_block: ctx.core().get_top_block(),
        address: ctx.core().node_address(),
        public_port: ctx.public_port(),
        peers: ctx.peers_info_except(exclude),
    }
}

/// Decodes and dispatches one inbound frame.
///
/// Malformed payloads and unexpected replies are dropped (the peer's
/// rating decreases); local state is never touched by an invalid message.
pub fn process(ctx: &dyn ProtocolContext, peer: &Arc<Peer>, payload: &[u8]) {
    let message = match Message::from_bytes(payload) {
        Ok(message) => message,
        Err(e) => {
            debug!("dropping undecodable message: {e}");
            peer.decrease_rating();
            return;
        }
    };

    peer.refresh_last_seen();

    if let Some(expected) = peer.expected_reply() {
        if !admits(expected, message.kind()) {
            debug!(
                "ignoring out-of-turn {:?} while waiting for {:?}",
                message.kind(),
                expected
            );
            peer.decrease_rating();
            return;
        }
        peer.expect_reply(None);
    }

    handle_message(ctx, peer, message);
}

fn handle_message(ctx: &dyn ProtocolContext, peer: &Arc<Peer>, message: Message) {
    match message {
        Message::Accepted {
            top_block,
            address,
            public_port,
            peers,
        } => {
            absorb_identity(peer, address, public_port);
            peer.send(&accepted_response(ctx, &address));
            dial_unknown(ctx, &peers);
            reconcile_tops(ctx, peer, top_block);
        }
        Message::AcceptedResponse {
            top_block,
            address,
            public_port,
            peers,
        } => {
            absorb_identity(peer, address, public_port);
            dial_unknown(ctx, &peers);
            reconcile_tops(ctx, peer, top_block);
        }
        Message::CannotAccept { reason, peers } => {
            debug!("peer refused us: {:?}", reason);
            ctx.remove_peer(peer);
            peer.close();
            dial_unknown(ctx, &peers);
        }
        Message::Ping => {
            peer.send(&Message::Pong);
        }
        Message::Pong => {}
        Message::Transaction(tx) => {
            ctx.core().add_pending_transaction(tx);
        }
        Message::GetBlock(hash) => {
            debug!("received GetBlock for {hash}");
            match ctx.core().find_block(&hash) {
                Some(block) => peer.send(&Message::Block(block)),
                None => peer.send(&Message::BlockNotFound(hash)),
            };
        }
        Message::Block(block) => handle_block(ctx, peer, block),
        Message::BlockNotFound(hash) => {
            // The peer may sit on a pruned or foreign fork; sync will be
            // retried against someone else.
            warn!("peer has no block {hash}");
        }
        Message::GetInfo => {
            peer.send(&Message::Info {
                top_block_hash: ctx.core().get_top_block_hash(),
                peers: ctx.peers_info_except(&peer.address()),
            });
        }
        Message::Info { .. } => {}
        Message::NewNode { endpoint, address } => {
            if !ctx.is_known(&endpoint) {
                ctx.check_out_peer(&endpoint);
                ctx.gossip(&Message::NewNode { endpoint, address });
            }
        }
        Message::Close => {
            ctx.remove_peer(peer);
            peer.close();
        }
        Message::Lookup { target, limit } => {
            peer.send(&Message::LookupResponse {
                peers: ctx.lookup(&target, limit as usize),
            });
        }
        Message::LookupResponse { peers } => {
            dial_unknown(ctx, &peers);
        }
    }
}

fn absorb_identity(peer: &Arc<Peer>, address: Address, public_port: u16) {
    peer.set_address(address);
    if public_port != 0 {
        peer.set_server_endpoint(peer.endpoint().with_port(public_port));
    }
}

fn dial_unknown(ctx: &dyn ProtocolContext, peers: &[PeerInfo]) {
    for info in peers {
        if !ctx.is_known(&info.endpoint) {
            ctx.check_out_peer(&info.endpoint);
        }
    }
}

/// Compares tops after a handshake and starts a sync walk if we are behind.
fn reconcile_tops(ctx: &dyn ProtocolContext, peer: &Arc<Peer>, theirs: Block) {
    let ours = ctx.core().get_top_block();

    if theirs == ours || ours.depth >= theirs.depth {
        // Equal tops, or we are ahead; that peer may sync from us instead
        peer.set_state(PeerState::Synchronised);
        return;
    }

    if ours.depth + 1 == theirs.depth {
        ctx.core().try_add_block(&theirs);
        peer.set_state(PeerState::Synchronised);
        return;
    }

    request_parent(peer, &theirs);
    peer.set_state(PeerState::RequestedBlocks);
    peer.add_sync_block(theirs);
}

fn request_parent(peer: &Arc<Peer>, block: &Block) {
    peer.send(&Message::GetBlock(block.prev_hash));
    peer.expect_reply(Some(MessageKind::Block));
}

fn handle_block(ctx: &dyn ProtocolContext, peer: &Arc<Peer>, block: Block) {
    let core = ctx.core();

    if peer.state() == PeerState::Synchronised {
        if core.try_add_block(&block) {
            return;
        }
        // The block does not extend our chain: if it is ahead of us we walk
        // backwards to the fork point, otherwise it is stale
        if block.depth > core.get_top_block().depth + 1 {
            request_parent(peer, &block);
            peer.set_state(PeerState::RequestedBlocks);
            peer.add_sync_block(block);
        }
        return;
    }

    // Syncing: accumulate until the lowest buffered block meets our top
    let depth = block.depth;
    peer.add_sync_block(block);

    if depth == core.get_top_block().depth + 1 {
        for buffered in peer.take_sync_blocks() {
            if !core.try_add_block(&buffered) {
                warn!("sync block at depth {} was rejected", buffered.depth);
                break;
            }
        }
        peer.set_state(PeerState::Synchronised);
    } else if let Some(parent) = peer.next_sync_parent() {
        peer.send(&Message::GetBlock(parent));
        peer.expect_reply(Some(MessageKind::Block));
    }
}
