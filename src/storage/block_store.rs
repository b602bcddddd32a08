//! Append-only persistent block store over RocksDB.
//!
//! A single key space partitioned by 1-byte type prefixes:
//!
//! | prefix | contents |
//! |---|---|
//! | `0x01` | system keys (`last_block_hash`) |
//! | `0x02` | block body by hash |
//! | `0x03` | parent hash by child hash |
//! | `0x04` | block hash by depth (u64 BE) |
//! | `0x05` | (block hash, index) by transaction hash |
//!
//! All writes for one block land in a single `WriteBatch` under the writer
//! lock, so a crash either persists the whole block or none of it.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::types::encoding::{Decode, Encode};
use crate::types::hash::Hash;
use crate::{info, warn};
use peerchain_derive::Error;
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::RwLock;

const PREFIX_SYSTEM: u8 = 0x01;
const PREFIX_BLOCK: u8 = 0x02;
const PREFIX_PARENT_LINK: u8 = 0x03;
const PREFIX_DEPTH: u8 = 0x04;
const PREFIX_TRANSACTION: u8 = 0x05;

const LAST_BLOCK_HASH_KEY: &[u8] = b"last_block_hash";

/// Failures surfaced by the block store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database rejected an operation.
    #[error("database error: {0}")]
    Backend(String),
    /// Stored bytes could not be decoded.
    #[error("undecodable record: {0}")]
    BadRecord(String),
    /// The persisted chain is inconsistent. Fatal: the node must not start.
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(value: rocksdb::Error) -> Self {
        StoreError::Backend(value.to_string())
    }
}

fn keyed(prefix: u8, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(prefix);
    out.extend_from_slice(key);
    out
}

fn depth_key(depth: u64) -> Vec<u8> {
    keyed(PREFIX_DEPTH, &depth.to_be_bytes())
}

struct TopCache {
    hash: Hash,
    block: Option<Block>,
}

/// Persistent append-only chain of blocks.
pub struct BlockStore {
    db: DB,
    top: RwLock<TopCache>,
}

impl BlockStore {
    /// Opens the store under `path`, wiping it first when `clean` is set.
    ///
    /// The cached top is restored from the `last_block_hash` system key.
    pub fn open(path: &Path, clean: bool) -> Result<BlockStore, StoreError> {
        if clean && path.exists() {
            DB::destroy(&Options::default(), path)?;
            info!("created clear database instance at {}", path.display());
        }

        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path)?;

        let top = match db.get(keyed(PREFIX_SYSTEM, LAST_BLOCK_HASH_KEY))? {
            Some(bytes) => {
                let hash = Hash::from_slice(&bytes).ok_or_else(|| {
                    StoreError::Corrupt("last_block_hash is not a 32-byte hash".to_string())
                })?;
                TopCache { hash, block: None }
            }
            None => TopCache {
                hash: Hash::zero(),
                block: None,
            },
        };

        let store = BlockStore {
            db,
            top: RwLock::new(top),
        };

        // Warm the top-block cache when resuming an existing chain
        let top_hash = store.top_hash();
        if !top_hash.is_zero() {
            let block = store.find_block(&top_hash)?.ok_or_else(|| {
                StoreError::Corrupt(format!("top block {top_hash} missing from store"))
            })?;
            store.top.write().unwrap().block = Some(block);
            info!("loaded database at {}", path.display());
        }

        Ok(store)
    }

    /// True if no block has ever been stored.
    pub fn is_empty(&self) -> bool {
        self.top_hash().is_zero()
    }

    /// Hash of the most recently appended block; zero when empty.
    pub fn top_hash(&self) -> Hash {
        self.top.read().unwrap().hash
    }

    /// The most recently appended block, from cache.
    pub fn top_block(&self) -> Option<Block> {
        self.top.read().unwrap().block.clone()
    }

    /// Appends a block under the writer lock.
    ///
    /// Writes the body, parent link, depth index, per-transaction index and
    /// the new top pointer in one atomic batch. A block whose hash is
    /// already present is left untouched.
    pub fn add_block(&self, hash: &Hash, block: &Block) -> Result<(), StoreError> {
        let mut top = self.top.write().unwrap();

        if self.db.get(keyed(PREFIX_BLOCK, hash.as_slice()))?.is_some() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        batch.put(
            keyed(PREFIX_BLOCK, hash.as_slice()),
            block.to_bytes().as_slice(),
        );
        batch.put(
            keyed(PREFIX_PARENT_LINK, hash.as_slice()),
            block.prev_hash.as_slice(),
        );
        batch.put(depth_key(block.depth), hash.as_slice());
        for (index, tx) in block.transactions.iter().enumerate() {
            let location = (*hash, index as u32);
            batch.put(
                keyed(PREFIX_TRANSACTION, tx.hash().as_slice()),
                location.to_bytes().as_slice(),
            );
        }
        batch.put(keyed(PREFIX_SYSTEM, LAST_BLOCK_HASH_KEY), hash.as_slice());

        self.db.write(batch)?;

        top.hash = *hash;
        top.block = Some(block.clone());
        Ok(())
    }

    /// Loads a block body by hash.
    pub fn find_block(&self, hash: &Hash) -> Result<Option<Block>, StoreError> {
        match self.db.get(keyed(PREFIX_BLOCK, hash.as_slice()))? {
            Some(bytes) => Block::from_bytes(&bytes)
                .map(Some)
                .map_err(|e| StoreError::BadRecord(format!("block {hash}: {e}"))),
            None => Ok(None),
        }
    }

    /// Canonical block hash at the given depth.
    pub fn find_block_hash_by_depth(&self, depth: u64) -> Result<Option<Hash>, StoreError> {
        match self.db.get(depth_key(depth))? {
            Some(bytes) => Hash::from_slice(&bytes)
                .map(Some)
                .ok_or_else(|| StoreError::BadRecord(format!("depth index {depth}"))),
            None => Ok(None),
        }
    }

    /// Parent hash recorded for the given block hash.
    pub fn find_parent_link(&self, hash: &Hash) -> Result<Option<Hash>, StoreError> {
        match self.db.get(keyed(PREFIX_PARENT_LINK, hash.as_slice()))? {
            Some(bytes) => Hash::from_slice(&bytes)
                .map(Some)
                .ok_or_else(|| StoreError::BadRecord(format!("parent link of {hash}"))),
            None => Ok(None),
        }
    }

    /// Locates a transaction: its containing block and position within it.
    pub fn find_transaction(&self, hash: &Hash) -> Result<Option<(Block, u32)>, StoreError> {
        let location = match self.db.get(keyed(PREFIX_TRANSACTION, hash.as_slice()))? {
            Some(bytes) => <(Hash, u32)>::from_bytes(&bytes)
                .map_err(|e| StoreError::BadRecord(format!("tx index {hash}: {e}")))?,
            None => return Ok(None),
        };

        let (block_hash, index) = location;
        let block = self.find_block(&block_hash)?.ok_or_else(|| {
            StoreError::Corrupt(format!(
                "tx {hash} points at missing block {block_hash}"
            ))
        })?;
        Ok(Some((block, index)))
    }

    /// Convenience lookup returning the transaction itself.
    pub fn find_transaction_body(&self, hash: &Hash) -> Result<Option<Transaction>, StoreError> {
        match self.find_transaction(hash)? {
            Some((block, index)) => Ok(block.transactions.iter().nth(index as usize).cloned()),
            None => Ok(None),
        }
    }

    /// Verifies the persisted chain on startup.
    ///
    /// Walks the parent links from the top back to genesis and checks that
    /// each block's depth decreases by exactly one and matches the depth
    /// index. Any violation is unrecoverable.
    pub fn load(&self) -> Result<(), StoreError> {
        let top_hash = self.top_hash();
        if top_hash.is_zero() {
            return Ok(());
        }

        let mut current = top_hash;
        let mut expected_depth: Option<u64> = None;
        let mut walked: u64 = 0;

        loop {
            let block = self.find_block(&current)?.ok_or_else(|| {
                StoreError::Corrupt(format!("chain walk hit missing block {current}"))
            })?;

            if let Some(expected) = expected_depth {
                if block.depth != expected {
                    return Err(StoreError::Corrupt(format!(
                        "depth discontinuity at {current}: expected {expected}, found {}",
                        block.depth
                    )));
                }
            }

            let indexed = self.find_block_hash_by_depth(block.depth)?;
            if indexed != Some(current) {
                return Err(StoreError::Corrupt(format!(
                    "depth index mismatch at depth {}",
                    block.depth
                )));
            }

            walked += 1;
            if block.depth == 0 {
                if !block.prev_hash.is_zero() {
                    return Err(StoreError::Corrupt(
                        "genesis has a non-zero parent link".to_string(),
                    ));
                }
                break;
            }

            expected_depth = Some(block.depth - 1);
            current = self.find_parent_link(&current)?.ok_or_else(|| {
                StoreError::Corrupt(format!("missing parent link for {current}"))
            })?;

            if current.is_zero() {
                warn!("parent walk reached the zero hash before depth 0");
                return Err(StoreError::Corrupt(
                    "parent chain ends before genesis".to_string(),
                ));
            }
        }

        info!("verified {walked} stored blocks");
        Ok(())
    }
}
