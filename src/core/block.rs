//! Blocks and the hard-coded genesis.

use crate::core::transaction::{Transaction, TransactionBuilder};
use crate::core::transactions_set::TransactionsSet;
use crate::types::address::Address;
use crate::types::balance::Balance;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use peerchain_derive::BinaryCodec;

/// Upper bound on transactions per block.
pub const MAX_TRANSACTIONS_IN_BLOCK: usize = 500;

/// Reward credited to the coinbase for each accepted block, in fee units.
pub const EMISSION_VALUE: u64 = 1000;

/// Seconds-since-epoch timestamp of the genesis block.
pub const GENESIS_TIMESTAMP: u32 = 1583789617;

/// Base58 rendering of the account holding the initial supply.
const GENESIS_RECIPIENT: [u8; 20] = [
    0xe1, 0xff, 0x88, 0x11, 0x2a, 0x47, 0x0c, 0x38, 0x3e, 0x68, 0x0b, 0xa1, 0x49, 0x2f, 0x59,
    0xe6, 0xd4, 0xbe, 0x4c, 0x2e,
]; // "49cfqVfB1gTGw5XZSu6nZDrntLr1"

/// A link in the chain: metadata plus an ordered transaction set.
///
/// Blocks are immutable after construction; the hash of the full encoding
/// identifies them everywhere (storage keys, parent links, gossip).
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Block {
    /// Position in the chain; genesis is 0.
    pub depth: u64,
    /// Hash of the parent block; zero for genesis.
    pub prev_hash: Hash,
    /// Seconds since the Unix epoch; strictly increasing along the chain.
    pub timestamp: u32,
    /// Recipient of the emission and collected fees.
    pub coinbase: Address,
    /// Miner-chosen value; opaque to validation.
    pub nonce: u64,
    /// Transactions in execution order.
    pub transactions: TransactionsSet,
}

impl Block {
    pub fn new(
        depth: u64,
        prev_hash: Hash,
        timestamp: u32,
        coinbase: Address,
        transactions: TransactionsSet,
    ) -> Self {
        Self {
            depth,
            prev_hash,
            timestamp,
            coinbase,
            nonce: 0,
            transactions,
        }
    }

    /// Hash of the complete block encoding.
    pub fn hash(&self) -> Hash {
        let mut h = Hash::sha256();
        self.encode(&mut h);
        h.finalize()
    }
}

/// The deterministic genesis block.
///
/// A single unsigned transaction grants the entire 256-bit supply from the
/// null address to a fixed recipient. Every node must produce the identical
/// encoding, so nothing here may depend on runtime state.
pub fn genesis_block() -> Block {
    let grant: Transaction = TransactionBuilder::new()
        .from(Address::null())
        .to(Address(GENESIS_RECIPIENT))
        .amount(Balance::MAX)
        .fee(0)
        .timestamp(GENESIS_TIMESTAMP)
        .build()
        .expect("genesis grant is fully specified");

    let mut transactions = TransactionsSet::new();
    transactions.add(grant);

    Block::new(
        0,
        Hash::zero(),
        GENESIS_TIMESTAMP,
        Address::null(),
        transactions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::TransactionBuilder;
    use crate::crypto::keys::PrivateKey;
    use crate::types::encoding::Decode;

    fn block_with_one_tx(depth: u64, prev: Hash) -> Block {
        let key = PrivateKey::generate();
        let tx = TransactionBuilder::new()
            .from(key.public_key().address())
            .to(Address::from_public_key_bytes(b"receiver"))
            .amount(Balance::from(5u64))
            .fee(1)
            .timestamp(1600000000)
            .build_signed(&key)
            .unwrap();

        let mut txs = TransactionsSet::new();
        txs.add(tx);
        Block::new(depth, prev, 1600000001, key.public_key().address(), txs)
    }

    #[test]
    fn genesis_shape() {
        let genesis = genesis_block();
        assert_eq!(genesis.depth, 0);
        assert_eq!(genesis.prev_hash, Hash::zero());
        assert_eq!(genesis.timestamp, GENESIS_TIMESTAMP);
        assert!(genesis.coinbase.is_null());
        assert_eq!(genesis.transactions.len(), 1);

        let grant = genesis.transactions.iter().next().unwrap();
        assert!(grant.from.is_null());
        assert_eq!(grant.to.to_base58(), "49cfqVfB1gTGw5XZSu6nZDrntLr1");
        assert_eq!(grant.amount, Balance::MAX);
        assert_eq!(grant.fee, 0);
        assert!(grant.sign.is_none());
    }

    #[test]
    fn genesis_hash_is_stable() {
        // Two independent constructions must agree byte for byte
        let a = genesis_block();
        let b = genesis_block();
        assert_eq!(a.to_bytes().as_slice(), b.to_bytes().as_slice());
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_changes_with_content() {
        let a = block_with_one_tx(1, Hash::zero());
        let mut b = a.clone();
        b.nonce = 1;
        assert_ne!(a.hash(), b.hash());

        let mut c = a.clone();
        c.timestamp += 1;
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn codec_roundtrip() {
        let block = block_with_one_tx(7, Hash::compute(b"parent"));
        let encoded = block.to_bytes();
        let decoded = Block::from_bytes(encoded.as_slice()).expect("decode failed");

        assert_eq!(decoded, block);
        assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn decode_fails_on_truncation() {
        let block = block_with_one_tx(3, Hash::zero());
        let encoded = block.to_bytes();
        for cut in [0, 8, encoded.len() / 2, encoded.len() - 1] {
            assert!(Block::from_bytes(&encoded[..cut]).is_err(), "cut {cut}");
        }
    }

    #[test]
    fn genesis_roundtrip_preserves_grant() {
        let decoded = Block::from_bytes(genesis_block().to_bytes().as_slice()).unwrap();
        assert_eq!(decoded, genesis_block());
    }
}
