//! The node core: admission, validation, execution and persistence.
//!
//! `Core` owns the canonical chain. Inbound transactions pass the admission
//! pipeline into the pending pool; inbound blocks are validated under the
//! chain lock, persisted, executed in order and announced to subscribers.

use crate::core::block::{genesis_block, Block, EMISSION_VALUE, MAX_TRANSACTIONS_IN_BLOCK};
use crate::core::events::Observable;
use crate::core::executor::{ChainReader, Executor};
use crate::core::transaction::{ActionType, StatusCode, Transaction, TransactionStatus};
use crate::core::transactions_set::{calc_cost, TransactionsSet};
use crate::storage::block_store::{BlockStore, StoreError};
use crate::storage::state::StateManager;
use crate::types::address::Address;
use crate::types::balance::{transaction_cost, Balance, Complexity};
use crate::types::hash::Hash;
use crate::utils::unix_timestamp;
use crate::vm::Evaluator;
use crate::{debug, info, warn};
use dashmap::DashMap;
use std::sync::{Arc, RwLock};

/// Event payload for an accepted block.
pub type BlockAdded = (Hash, Block);

/// Orchestrates ingest, validation, execution and persistence.
pub struct Core {
    node_address: Address,
    store: BlockStore,
    state: StateManager,
    evaluator: Arc<dyn Evaluator>,
    /// Guards the store/state pair as one atomic region.
    chain_lock: RwLock<()>,
    pending: RwLock<TransactionsSet>,
    /// Verdicts by transaction hash; repeated queries must agree.
    tx_statuses: DashMap<Hash, TransactionStatus>,
    block_added: Observable<BlockAdded>,
    new_pending_tx: Observable<Transaction>,
}

impl Core {
    /// Builds the core over an opened store and replays the chain.
    ///
    /// Seeds the genesis grant, verifies the persisted chain, then runs
    /// every stored block through the executor so the in-memory state
    /// matches the chain tip. Inconsistent storage aborts startup.
    pub fn new(
        store: BlockStore,
        node_address: Address,
        evaluator: Arc<dyn Evaluator>,
    ) -> Result<Arc<Core>, StoreError> {
        Self::with_initial_accounts(store, node_address, evaluator, &[])
    }

    /// Like [`Core::new`], with extra pre-chain account allocations.
    ///
    /// The allocations are applied after the genesis grant and before chain
    /// replay, so a restarted node seeded with the same allocations rebuilds
    /// the identical state. Meant for development networks and tests.
    pub fn with_initial_accounts(
        store: BlockStore,
        node_address: Address,
        evaluator: Arc<dyn Evaluator>,
        initial_accounts: &[(Address, Balance)],
    ) -> Result<Arc<Core>, StoreError> {
        let genesis = genesis_block();
        store.add_block(&genesis.hash(), &genesis)?;
        store.load()?;

        let core = Arc::new(Core {
            node_address,
            store,
            state: StateManager::new(),
            evaluator,
            chain_lock: RwLock::new(()),
            pending: RwLock::new(TransactionsSet::new()),
            tx_statuses: DashMap::new(),
            block_added: Observable::new(),
            new_pending_tx: Observable::new(),
        });

        core.state.update_from_genesis(&genesis);
        for (address, balance) in initial_accounts {
            if core.state.credit(address, *balance).is_err() {
                warn!("initial allocation for {address} overflowed, skipped");
            }
        }
        core.replay_chain()?;
        Ok(core)
    }

    /// Re-executes every block above genesis to rebuild account state.
    fn replay_chain(&self) -> Result<(), StoreError> {
        let top_depth = match self.store.top_block() {
            Some(block) => block.depth,
            None => return Ok(()),
        };

        for depth in 1..=top_depth {
            let hash = self.store.find_block_hash_by_depth(depth)?.ok_or_else(|| {
                StoreError::Corrupt(format!("no block hash recorded at depth {depth}"))
            })?;
            let block = self.store.find_block(&hash)?.ok_or_else(|| {
                StoreError::Corrupt(format!("missing block body at depth {depth}"))
            })?;
            self.apply_block_transactions(&block);
        }

        if top_depth > 0 {
            info!("replayed chain up to depth {top_depth}");
        }
        Ok(())
    }

    /// The address this node mines and signs as.
    pub fn node_address(&self) -> Address {
        self.node_address
    }

    /// Admits a transaction into the pending pool.
    ///
    /// The checks run in a fixed order - signature, duplicate-in-chain,
    /// duplicate-in-pool, aggregate pending cost, balance, and finally the
    /// zero-amount shape rule (a zero-amount transaction must carry call
    /// data) - and the first failure's verdict is recorded and returned.
    pub fn add_pending_transaction(&self, tx: Transaction) -> TransactionStatus {
        let tx_hash = tx.hash();

        if !tx.check_sign() {
            debug!("rejecting {tx_hash}: failed signature verification");
            return self.record_status(
                tx_hash,
                TransactionStatus::new(StatusCode::BadSign, ActionType::None, tx.fee, String::new()),
            );
        }

        if self
            .store
            .find_transaction(&tx_hash)
            .unwrap_or(None)
            .is_some()
        {
            // Already mined: hand back the recorded verdict
            if let Some(status) = self.tx_statuses.get(&tx_hash) {
                return status.value().clone();
            }
            return self.record_status(
                tx_hash,
                TransactionStatus::new(StatusCode::Failed, ActionType::None, tx.fee, String::new()),
            );
        }

        let pending_costs = {
            let pending = self.pending.read().unwrap();
            if pending.find(&tx) {
                return self.record_status(
                    tx_hash,
                    TransactionStatus::new(
                        StatusCode::Pending,
                        ActionType::None,
                        tx.fee,
                        String::new(),
                    ),
                );
            }
            calc_cost(&pending)
        };

        let cost = transaction_cost(tx.amount, tx.fee);
        let affordable = match (cost, pending_costs) {
            (Some(cost), Some(costs)) => {
                let reserved = costs
                    .get(&tx.from)
                    .copied()
                    .unwrap_or_else(Balance::zero);
                match reserved.checked_add(cost) {
                    Some(total) => total <= self.state.balance(&tx.from),
                    None => false,
                }
            }
            _ => false,
        };
        if !affordable {
            return self.record_status(
                tx_hash,
                TransactionStatus::new(
                    StatusCode::NotEnoughBalance,
                    ActionType::None,
                    0,
                    String::new(),
                ),
            );
        }

        if !self.state.check_transaction(&tx) {
            return self.record_status(
                tx_hash,
                TransactionStatus::new(
                    StatusCode::NotEnoughBalance,
                    ActionType::None,
                    0,
                    String::new(),
                ),
            );
        }

        // A zero-amount transaction only makes sense as a pure contract call
        if tx.amount.is_zero() && tx.data.is_empty() {
            return self.record_status(
                tx_hash,
                TransactionStatus::new(
                    StatusCode::BadQueryForm,
                    ActionType::None,
                    tx.fee,
                    String::new(),
                ),
            );
        }

        debug!("adding transaction {tx_hash} to the pending pool");
        {
            let mut pending = self.pending.write().unwrap();
            pending.add(tx.clone());
        }
        self.new_pending_tx.notify(&tx);

        self.record_status(
            tx_hash,
            TransactionStatus::new(StatusCode::Pending, ActionType::None, tx.fee, String::new()),
        )
    }

    fn record_status(&self, hash: Hash, status: TransactionStatus) -> TransactionStatus {
        self.tx_statuses.insert(hash, status.clone());
        status
    }

    /// Recorded verdict for a transaction hash.
    pub fn transaction_status(&self, hash: &Hash) -> Option<TransactionStatus> {
        self.tx_statuses.get(hash).map(|s| s.value().clone())
    }

    /// Validates and applies a block extending the current top.
    ///
    /// Returns `true` when the block is (or already was) part of the chain.
    /// On acceptance the block's transactions leave the pending pool, the
    /// coinbase receives the emission, every transaction executes in order,
    /// and `BlockAdded` fires after the commit.
    pub fn try_add_block(&self, block: &Block) -> bool {
        let block_hash = block.hash();
        let guard = self.chain_lock.write().unwrap();

        // A re-announced block is not an error; nothing is re-executed.
        if matches!(self.store.find_block(&block_hash), Ok(Some(_))) {
            return true;
        }

        if !self.check_block(block) {
            return false;
        }

        if let Err(e) = self.store.add_block(&block_hash, block) {
            warn!("failed to persist block {block_hash}: {e}");
            return false;
        }

        {
            let mut pending = self.pending.write().unwrap();
            pending.remove_set(&block.transactions);
        }

        debug!("applying transactions from block #{}", block.depth);
        self.apply_block_transactions(block);

        drop(guard);
        self.block_added.notify(&(block_hash, block.clone()));
        true
    }

    /// Credits the emission and executes the block's transactions in order.
    fn apply_block_transactions(&self, block: &Block) {
        if self
            .state
            .credit(&block.coinbase, Balance::from(EMISSION_VALUE))
            .is_err()
        {
            warn!("emission credit overflowed for {}", block.coinbase);
        }

        let executor = Executor::new(&self.state, self.evaluator.as_ref(), self);
        for tx in block.transactions.iter() {
            let status = executor.try_perform(tx, block);
            self.record_status(tx.hash(), status);
        }
    }

    /// Structural and economic validation of a candidate block.
    ///
    /// Blocks carry no producer key, so the coinbase cannot be tied to the
    /// announcing peer's identity; what is checkable is its shape - the
    /// null address stays reserved for the genesis - and the economics of
    /// every contained transaction.
    fn check_block(&self, block: &Block) -> bool {
        let Some(top) = self.store.top_block() else {
            return false;
        };

        if block.coinbase.is_null() {
            return false;
        }
        if block.timestamp <= top.timestamp {
            return false;
        }
        if block.transactions.is_empty()
            || block.transactions.len() > MAX_TRANSACTIONS_IN_BLOCK
        {
            return false;
        }
        if block.prev_hash != top.hash() || block.depth != top.depth + 1 {
            return false;
        }

        let Some(block_costs) = calc_cost(&block.transactions) else {
            return false;
        };
        for tx in block.transactions.iter() {
            if !tx.check_sign() {
                return false;
            }
            if !self.state.has_account(&tx.from) {
                return false;
            }
            let Some(cost) = block_costs.get(&tx.from) else {
                return false;
            };
            if *cost > self.state.balance(&tx.from) {
                return false;
            }
        }
        true
    }

    /// Candidate block and complexity for the miner.
    ///
    /// Selects the highest-fee pending transactions, capped at the block
    /// limit, on top of the current tip.
    pub fn get_mining_data(&self) -> Option<(Block, Complexity)> {
        let _guard = self.chain_lock.read().unwrap();

        let top = self.store.top_block()?;
        let depth = top.depth + 1;

        let mut selected = self.pending.read().unwrap().clone();
        if selected.len() > MAX_TRANSACTIONS_IN_BLOCK {
            selected.select_best_by_fee(MAX_TRANSACTIONS_IN_BLOCK);
        }

        let candidate = Block::new(
            depth,
            top.hash(),
            unix_timestamp().max(top.timestamp + 1),
            self.node_address,
            selected,
        );
        Some((candidate, Complexity::for_depth(depth)))
    }

    /// Loads a block by hash.
    pub fn find_block(&self, hash: &Hash) -> Option<Block> {
        let _guard = self.chain_lock.read().unwrap();
        self.store.find_block(hash).unwrap_or(None)
    }

    /// Canonical block hash at a depth.
    pub fn find_block_hash(&self, depth: u64) -> Option<Hash> {
        let _guard = self.chain_lock.read().unwrap();
        self.store.find_block_hash_by_depth(depth).unwrap_or(None)
    }

    /// Looks a mined transaction up by hash.
    pub fn find_transaction(&self, hash: &Hash) -> Option<Transaction> {
        let _guard = self.chain_lock.read().unwrap();
        self.store.find_transaction_body(hash).unwrap_or(None)
    }

    /// Read-only account summary.
    pub fn get_account_info(&self, address: &Address) -> crate::core::account::AccountInfo {
        let _guard = self.chain_lock.read().unwrap();
        self.state.account_info(address)
    }

    /// The current chain tip.
    pub fn get_top_block(&self) -> Block {
        let _guard = self.chain_lock.read().unwrap();
        self.store
            .top_block()
            .expect("chain always holds at least the genesis")
    }

    /// Hash of the current chain tip.
    pub fn get_top_block_hash(&self) -> Hash {
        let _guard = self.chain_lock.read().unwrap();
        self.store.top_hash()
    }

    /// Number of transactions waiting in the pool.
    pub fn pending_len(&self) -> usize {
        self.pending.read().unwrap().len()
    }

    /// Registers a callback fired after each accepted block commits.
    pub fn subscribe_to_block_addition(
        &self,
        callback: impl Fn(&BlockAdded) + Send + Sync + 'static,
    ) {
        self.block_added.subscribe(callback);
    }

    /// Registers a callback fired after each pooled transaction.
    pub fn subscribe_to_new_pending_transaction(
        &self,
        callback: impl Fn(&Transaction) + Send + Sync + 'static,
    ) {
        self.new_pending_tx.subscribe(callback);
    }
}

impl ChainReader for Core {
    fn block_hash_by_depth(&self, depth: u64) -> Option<Hash> {
        self.store.find_block_hash_by_depth(depth).unwrap_or(None)
    }
}
