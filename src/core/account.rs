//! Account state: balances, contract code and per-contract storage.

use crate::types::address::Address;
use crate::types::balance::Balance;
use crate::types::bytes::Bytes;
use crate::types::hash::Hash;
use peerchain_derive::BinaryCodec;
use std::collections::HashMap;

/// Distinguishes externally controlled accounts from deployed contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub enum AccountType {
    Client,
    Contract,
}

/// One 32-byte contract storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageSlot {
    pub data: [u8; 32],
}

/// Mutable state of a single account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    account_type: AccountType,
    balance: Balance,
    /// Hashes of transactions sent from this account, oldest first.
    transaction_hashes: Vec<Hash>,
    /// SHA-256 of the init code; zero for client accounts.
    code_hash: Hash,
    /// Deployed runtime code; empty for client accounts.
    runtime_code: Bytes,
    /// Contract storage keyed by 32-byte slot.
    storage: HashMap<Hash, StorageSlot>,
}

impl AccountState {
    /// Creates an empty client account.
    pub fn new_client() -> Self {
        Self {
            account_type: AccountType::Client,
            balance: Balance::zero(),
            transaction_hashes: Vec::new(),
            code_hash: Hash::zero(),
            runtime_code: Bytes::default(),
            storage: HashMap::new(),
        }
    }

    /// Creates a fresh contract account bound to its init-code hash.
    pub fn new_contract(code_hash: Hash) -> Self {
        Self {
            account_type: AccountType::Contract,
            balance: Balance::zero(),
            transaction_hashes: Vec::new(),
            code_hash,
            runtime_code: Bytes::default(),
            storage: HashMap::new(),
        }
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn is_contract(&self) -> bool {
        self.account_type == AccountType::Contract
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    /// Credits the account, failing on 256-bit overflow.
    pub fn add_balance(&mut self, amount: Balance) -> bool {
        match self.balance.checked_add(amount) {
            Some(b) => {
                self.balance = b;
                true
            }
            None => false,
        }
    }

    /// Debits the account, failing on underflow.
    pub fn sub_balance(&mut self, amount: Balance) -> bool {
        match self.balance.checked_sub(amount) {
            Some(b) => {
                self.balance = b;
                true
            }
            None => false,
        }
    }

    /// Records a transaction sent from this account.
    pub fn add_transaction_hash(&mut self, hash: Hash) {
        self.transaction_hashes.push(hash);
    }

    /// Hashes of transactions sent from this account, oldest first.
    pub fn transaction_hashes(&self) -> &[Hash] {
        &self.transaction_hashes
    }

    pub fn code_hash(&self) -> Hash {
        self.code_hash
    }

    pub fn runtime_code(&self) -> &Bytes {
        &self.runtime_code
    }

    /// Installs the runtime code produced by a successful deployment.
    pub fn set_runtime_code(&mut self, code: Bytes) {
        self.runtime_code = code;
    }

    /// True if the slot has ever been written.
    pub fn has_storage_value(&self, key: &Hash) -> bool {
        self.storage.contains_key(key)
    }

    /// Current slot value; zero if never written.
    pub fn storage_value(&self, key: &Hash) -> StorageSlot {
        self.storage.get(key).copied().unwrap_or_default()
    }

    /// Writes a storage slot.
    pub fn set_storage_value(&mut self, key: Hash, value: [u8; 32]) {
        self.storage.insert(key, StorageSlot { data: value });
    }

    /// Removes a storage slot.
    pub fn delete_storage_value(&mut self, key: &Hash) {
        self.storage.remove(key);
    }

    /// Number of populated storage slots.
    pub fn storage_len(&self) -> usize {
        self.storage.len()
    }
}

/// Read-only account summary exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_type: AccountType,
    pub address: Address,
    pub balance: Balance,
    pub transaction_hashes: Vec<Hash>,
}

impl AccountState {
    /// Snapshot of this account for external queries.
    pub fn to_info(&self, address: Address) -> AccountInfo {
        AccountInfo {
            account_type: self.account_type,
            address,
            balance: self.balance,
            transaction_hashes: self.transaction_hashes.clone(),
        }
    }
}
