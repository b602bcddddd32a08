//! Versioned account state.
//!
//! The canonical [`StateManager`] is a reader-writer-guarded account map.
//! Transactions never mutate it directly: the executor takes a
//! [`StateSnapshot`] - a copy-on-write overlay that materializes an account
//! only when first touched - runs against it, and either merges the touched
//! entries back with [`StateManager::apply_changes`] or drops the snapshot,
//! leaving the canonical state byte-identical.

use crate::core::account::{AccountInfo, AccountState, AccountType};
use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::types::address::Address;
use crate::types::balance::{transaction_cost, Balance};
use crate::types::bytes::Bytes;
use crate::types::hash::Hash;
use peerchain_derive::Error;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Failures surfaced by state mutations.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum StateError {
    /// Deterministic contract address is already occupied.
    #[error("account {0} already exists")]
    AlreadyExists(String),
    /// Debit or credit would leave the balance out of range.
    #[error("balance out of range for {0}")]
    BalanceOutOfRange(String),
}

/// Canonical account map guarded by a reader-writer lock.
#[derive(Debug, Default)]
pub struct StateManager {
    accounts: RwLock<HashMap<Address, AccountState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the address has ever been materialized.
    pub fn has_account(&self, address: &Address) -> bool {
        self.accounts.read().unwrap().contains_key(address)
    }

    /// Current balance; zero for unknown accounts.
    pub fn balance(&self, address: &Address) -> Balance {
        self.accounts
            .read()
            .unwrap()
            .get(address)
            .map(|a| a.balance())
            .unwrap_or_else(Balance::zero)
    }

    /// Read-only summary for client queries.
    ///
    /// Unknown addresses report as empty client accounts.
    pub fn account_info(&self, address: &Address) -> AccountInfo {
        let accounts = self.accounts.read().unwrap();
        match accounts.get(address) {
            Some(state) => state.to_info(*address),
            None => AccountState::new_client().to_info(*address),
        }
    }

    /// Account type; unknown addresses read as clients.
    pub fn account_type(&self, address: &Address) -> AccountType {
        self.accounts
            .read()
            .unwrap()
            .get(address)
            .map(|a| a.account_type())
            .unwrap_or(AccountType::Client)
    }

    /// The sender can cover `amount + fee`.
    pub fn check_transaction(&self, tx: &Transaction) -> bool {
        match transaction_cost(tx.amount, tx.fee) {
            Some(cost) => self.balance(&tx.from) >= cost,
            None => false,
        }
    }

    /// Moves `amount` between two accounts atomically.
    ///
    /// Fails without side effects when the sender cannot cover the amount
    /// or the receiver would overflow.
    pub fn try_transfer(&self, from: &Address, to: &Address, amount: Balance) -> bool {
        let mut accounts = self.accounts.write().unwrap();
        transfer_in(&mut accounts, from, to, amount)
    }

    /// Credits an account, materializing it if needed.
    pub fn credit(&self, address: &Address, amount: Balance) -> Result<(), StateError> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .entry(*address)
            .or_insert_with(AccountState::new_client);
        if account.add_balance(amount) {
            Ok(())
        } else {
            Err(StateError::BalanceOutOfRange(address.to_base58()))
        }
    }

    /// Debits an account; fails on underflow.
    pub fn debit(&self, address: &Address, amount: Balance) -> Result<(), StateError> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .entry(*address)
            .or_insert_with(AccountState::new_client);
        if account.sub_balance(amount) {
            Ok(())
        } else {
            Err(StateError::BalanceOutOfRange(address.to_base58()))
        }
    }

    /// Records a sent-transaction hash on the sender's account.
    pub fn add_transaction_hash(&self, address: &Address, hash: Hash) {
        let mut accounts = self.accounts.write().unwrap();
        accounts
            .entry(*address)
            .or_insert_with(AccountState::new_client)
            .add_transaction_hash(hash);
    }

    /// Seeds balances from the genesis grant.
    ///
    /// The genesis sender is the null address, so only the recipient side
    /// is applied.
    pub fn update_from_genesis(&self, genesis: &Block) {
        let mut accounts = self.accounts.write().unwrap();
        for tx in genesis.transactions.iter() {
            let account = accounts
                .entry(tx.to)
                .or_insert_with(AccountState::new_client);
            account.add_balance(tx.amount);
        }
    }

    /// Starts a speculative overlay over the current state.
    pub fn create_copy(&self) -> StateSnapshot<'_> {
        StateSnapshot {
            base: self,
            entries: HashMap::new(),
            deleted: HashSet::new(),
        }
    }

    /// Merges a completed snapshot: touched entries replace canonical ones,
    /// deletions remove them. Runs entirely under the writer lock.
    pub fn apply_changes(&self, snapshot: StateSnapshot<'_>) {
        let mut accounts = self.accounts.write().unwrap();
        for address in snapshot.deleted {
            accounts.remove(&address);
        }
        for (address, state) in snapshot.entries {
            accounts.insert(address, state);
        }
    }

    /// Sum of all account balances; overflow-free because the supply is
    /// bounded by the genesis grant plus emissions.
    #[cfg(test)]
    pub fn total_balance(&self) -> Balance {
        self.accounts
            .read()
            .unwrap()
            .values()
            .fold(Balance::zero(), |acc, a| {
                acc.saturating_add(a.balance())
            })
    }
}

fn transfer_in(
    accounts: &mut HashMap<Address, AccountState>,
    from: &Address,
    to: &Address,
    amount: Balance,
) -> bool {
    let sender_balance = match accounts.get(from) {
        Some(a) => a.balance(),
        None => Balance::zero(),
    };
    if sender_balance < amount {
        return false;
    }

    let receiver = accounts.entry(*to).or_insert_with(AccountState::new_client);
    if !receiver.add_balance(amount) {
        return false;
    }

    let sender = accounts
        .entry(*from)
        .or_insert_with(AccountState::new_client);
    // Cannot fail: balance was checked above and the map was exclusively held
    sender.sub_balance(amount)
}

/// Copy-on-write overlay used for speculative execution of one transaction.
///
/// Reads fall through to the canonical state; the first write to an account
/// clones it into the overlay. Nothing reaches the canonical map until
/// [`StateManager::apply_changes`] consumes the snapshot.
pub struct StateSnapshot<'a> {
    base: &'a StateManager,
    entries: HashMap<Address, AccountState>,
    deleted: HashSet<Address>,
}

impl<'a> StateSnapshot<'a> {
    /// True if the account exists in the overlay view.
    pub fn has_account(&self, address: &Address) -> bool {
        if self.deleted.contains(address) {
            return false;
        }
        self.entries.contains_key(address) || self.base.has_account(address)
    }

    /// Number of accounts touched so far.
    pub fn touched(&self) -> usize {
        self.entries.len() + self.deleted.len()
    }

    fn read<T>(&self, address: &Address, f: impl FnOnce(&AccountState) -> T, default: T) -> T {
        if self.deleted.contains(address) {
            return default;
        }
        if let Some(state) = self.entries.get(address) {
            return f(state);
        }
        let accounts = self.base.accounts.read().unwrap();
        match accounts.get(address) {
            Some(state) => f(state),
            None => default,
        }
    }

    /// Materializes the account in the overlay, creating a client entry on
    /// first access to an unknown address.
    fn entry_mut(&mut self, address: &Address) -> &mut AccountState {
        if !self.entries.contains_key(address) {
            let state = if self.deleted.contains(address) {
                AccountState::new_client()
            } else {
                let accounts = self.base.accounts.read().unwrap();
                accounts
                    .get(address)
                    .cloned()
                    .unwrap_or_else(AccountState::new_client)
            };
            self.deleted.remove(address);
            self.entries.insert(*address, state);
        }
        self.entries.get_mut(address).unwrap()
    }

    pub fn balance(&self, address: &Address) -> Balance {
        self.read(address, |a| a.balance(), Balance::zero())
    }

    pub fn account_type(&self, address: &Address) -> AccountType {
        self.read(address, |a| a.account_type(), AccountType::Client)
    }

    pub fn is_contract(&self, address: &Address) -> bool {
        self.account_type(address) == AccountType::Contract
    }

    pub fn code_hash(&self, address: &Address) -> Hash {
        self.read(address, |a| a.code_hash(), Hash::zero())
    }

    pub fn runtime_code(&self, address: &Address) -> Bytes {
        self.read(address, |a| a.runtime_code().clone(), Bytes::default())
    }

    pub fn storage_value(&self, address: &Address, key: &Hash) -> [u8; 32] {
        self.read(address, |a| a.storage_value(key).data, [0u8; 32])
    }

    pub fn has_storage_value(&self, address: &Address, key: &Hash) -> bool {
        self.read(address, |a| a.has_storage_value(key), false)
    }

    pub fn set_storage_value(&mut self, address: &Address, key: Hash, value: [u8; 32]) {
        self.entry_mut(address).set_storage_value(key, value);
    }

    pub fn delete_storage_value(&mut self, address: &Address, key: &Hash) {
        self.entry_mut(address).delete_storage_value(key);
    }

    /// Credits an account inside the overlay.
    pub fn credit(&mut self, address: &Address, amount: Balance) -> Result<(), StateError> {
        if self.entry_mut(address).add_balance(amount) {
            Ok(())
        } else {
            Err(StateError::BalanceOutOfRange(address.to_base58()))
        }
    }

    /// Debits an account inside the overlay.
    pub fn debit(&mut self, address: &Address, amount: Balance) -> Result<(), StateError> {
        if self.entry_mut(address).sub_balance(amount) {
            Ok(())
        } else {
            Err(StateError::BalanceOutOfRange(address.to_base58()))
        }
    }

    /// Moves `amount` between accounts; fails without side effects.
    pub fn try_transfer(&mut self, from: &Address, to: &Address, amount: Balance) -> bool {
        if self.balance(from) < amount {
            return false;
        }
        if !self.entry_mut(to).add_balance(amount) {
            return false;
        }
        self.entry_mut(from).sub_balance(amount)
    }

    /// Installs the runtime code of a deployed contract.
    pub fn set_runtime_code(&mut self, address: &Address, code: Bytes) {
        self.entry_mut(address).set_runtime_code(code);
    }

    /// Creates a contract account at its deterministic address.
    pub fn create_contract(
        &mut self,
        creator: &Address,
        code_hash: Hash,
    ) -> Result<Address, StateError> {
        let address = Address::for_contract(creator, &code_hash);
        if self.has_account(&address) {
            return Err(StateError::AlreadyExists(address.to_base58()));
        }
        self.deleted.remove(&address);
        self.entries
            .insert(address, AccountState::new_contract(code_hash));
        Ok(address)
    }

    /// Removes an account, freeing its storage.
    pub fn delete_account(&mut self, address: &Address) {
        self.entries.remove(address);
        self.deleted.insert(*address);
    }
}
