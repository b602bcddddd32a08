//! Shared fixtures: programmable VM evaluators, key/tx/block factories.

use crate::core::block::Block;
use crate::core::executor::ChainReader;
use crate::core::transaction::{Transaction, TransactionBuilder};
use crate::core::transactions_set::TransactionsSet;
use crate::crypto::keys::PrivateKey;
use crate::types::address::Address;
use crate::types::balance::Balance;
use crate::types::bytes::Bytes;
use crate::types::hash::Hash;
use crate::vm::{Evaluator, Host, VmMessage, VmResult, VmStatus};

/// Chain reader with no blocks, for executor tests.
pub struct NoChain;

impl ChainReader for NoChain {
    fn block_hash_by_depth(&self, _depth: u64) -> Option<Hash> {
        None
    }
}

type VmHandler = Box<dyn Fn(&mut dyn Host, &VmMessage, &[u8]) -> VmResult + Send + Sync>;

/// Evaluator whose behavior is supplied by the test.
pub struct ScriptedVm {
    handler: VmHandler,
}

impl ScriptedVm {
    pub fn new(
        handler: impl Fn(&mut dyn Host, &VmMessage, &[u8]) -> VmResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Deployment stub: returns the init code as runtime output, consuming
    /// `gas_cost` gas.
    pub fn deploy_echo(gas_cost: u64) -> Self {
        Self::new(move |_host: &mut dyn Host, msg: &VmMessage, code: &[u8]| VmResult {
            status: VmStatus::Success,
            gas_left: msg.gas.saturating_sub(gas_cost),
            output: Bytes::new(code.to_vec()),
        })
    }

    /// Evaluator that reverts every frame after consuming `gas_cost` gas.
    pub fn reverting(gas_cost: u64) -> Self {
        Self::new(move |_host: &mut dyn Host, msg: &VmMessage, _code: &[u8]| VmResult {
            status: VmStatus::Revert,
            gas_left: msg.gas.saturating_sub(gas_cost),
            output: Bytes::default(),
        })
    }
}

impl Evaluator for ScriptedVm {
    fn execute(&self, host: &mut dyn Host, msg: &VmMessage, code: &[u8]) -> VmResult {
        (self.handler)(host, msg, code)
    }
}

/// Builds a signed transfer with the given scalar fields.
pub fn signed_transfer(
    key: &PrivateKey,
    to: Address,
    amount: u64,
    fee: u64,
    timestamp: u32,
) -> Transaction {
    TransactionBuilder::new()
        .from(key.public_key().address())
        .to(to)
        .amount(Balance::from(amount))
        .fee(fee)
        .timestamp(timestamp)
        .build_signed(key)
        .expect("all fields set")
}

/// Builds a block at `depth` on top of `parent` carrying the given
/// transactions.
pub fn block_on(parent: &Block, coinbase: Address, txs: Vec<Transaction>) -> Block {
    let mut set = TransactionsSet::new();
    for tx in txs {
        set.add(tx);
    }
    Block::new(
        parent.depth + 1,
        parent.hash(),
        parent.timestamp + 1,
        coinbase,
        set,
    )
}
