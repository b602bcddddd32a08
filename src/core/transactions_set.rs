//! Ordered, duplicate-free set of pending transactions.

use crate::core::transaction::Transaction;
use crate::types::address::Address;
use crate::types::balance::{transaction_cost, Balance};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::Hash;
use std::collections::{HashMap, HashSet};

/// Insertion-ordered set of transactions indexed by hash.
///
/// The pool and candidate blocks both use this container; duplicates are
/// detected by full transaction hash, so two transactions differing only in
/// signature count as distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionsSet {
    transactions: Vec<Transaction>,
    index: HashSet<Hash>,
}

impl TransactionsSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions in the set.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True if the set holds no transactions.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Adds a transaction; a same-hash duplicate is a no-op.
    pub fn add(&mut self, tx: Transaction) {
        let hash = tx.hash();
        if self.index.insert(hash) {
            self.transactions.push(tx);
        }
    }

    /// Removes a transaction if present.
    pub fn remove(&mut self, tx: &Transaction) {
        self.remove_by_hash(&tx.hash());
    }

    /// Removes by hash if present.
    pub fn remove_by_hash(&mut self, hash: &Hash) {
        if self.index.remove(hash) {
            self.transactions.retain(|t| t.hash() != *hash);
        }
    }

    /// Removes every transaction contained in `other`.
    pub fn remove_set(&mut self, other: &TransactionsSet) {
        if other.is_empty() {
            return;
        }
        let index = &mut self.index;
        self.transactions.retain(|t| {
            let hash = t.hash();
            if other.index.contains(&hash) {
                index.remove(&hash);
                false
            } else {
                true
            }
        });
    }

    /// True if a transaction with the same hash is present.
    pub fn find(&self, tx: &Transaction) -> bool {
        self.index.contains(&tx.hash())
    }

    /// Looks a transaction up by hash.
    pub fn find_by_hash(&self, hash: &Hash) -> Option<&Transaction> {
        if !self.index.contains(hash) {
            return None;
        }
        self.transactions.iter().find(|t| t.hash() == *hash)
    }

    /// Iterates the transactions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    /// Keeps only the `n` most valuable transactions by fee.
    ///
    /// Ties break toward the older timestamp, then the lexicographically
    /// smaller hash, so every node selects the same candidate set.
    pub fn select_best_by_fee(&mut self, n: usize) {
        if self.transactions.len() <= n {
            return;
        }

        let mut ranked: Vec<(u64, u32, Hash)> = self
            .transactions
            .iter()
            .map(|t| (t.fee, t.timestamp, t.hash()))
            .collect();
        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        let keep: HashSet<Hash> = ranked.into_iter().take(n).map(|(_, _, h)| h).collect();

        self.transactions.retain(|t| keep.contains(&t.hash()));
        self.index = self.transactions.iter().map(|t| t.hash()).collect();
    }
}

impl<'a> IntoIterator for &'a TransactionsSet {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.transactions.iter()
    }
}

impl Encode for TransactionsSet {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.transactions.encode(out);
    }
}

impl Decode for TransactionsSet {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let transactions = Vec::<Transaction>::decode(input)?;
        let mut set = TransactionsSet::new();
        for tx in transactions {
            set.add(tx);
        }
        Ok(set)
    }
}

/// Sums `amount + fee` per sender over the set.
///
/// Used to verify that no sender overspends across the pending pool or
/// within a candidate block. Returns `None` when a sender's total overflows,
/// which no real balance can cover anyway.
pub fn calc_cost(set: &TransactionsSet) -> Option<HashMap<Address, Balance>> {
    let mut costs: HashMap<Address, Balance> = HashMap::new();
    for tx in set.iter() {
        let cost = transaction_cost(tx.amount, tx.fee)?;
        let entry = costs.entry(tx.from).or_insert_with(Balance::zero);
        *entry = entry.checked_add(cost)?;
    }
    Some(costs)
}
