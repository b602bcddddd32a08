//! Boundary to the EVM-compatible interpreter.
//!
//! The interpreter itself is a pluggable collaborator: the node hands it a
//! message, the contract code, and a [`Host`] for state access, and receives
//! a [`VmResult`] back. Host callbacks must be total - they may not panic or
//! propagate errors across the VM boundary.

use crate::types::address::Address;
use crate::types::balance::Balance;
use crate::types::bytes::Bytes;
use crate::types::hash::Hash;

/// How a frame was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Call,
}

/// Termination status of a VM frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    /// Frame completed; its state changes stand.
    Success,
    /// Frame rolled back deliberately; remaining gas is returned.
    Revert,
    /// Abnormal termination: bad instruction, out of gas, host fault.
    Failure,
}

/// Effect classification of a storage write, for gas accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

/// Call frame parameters handed to the interpreter.
#[derive(Debug, Clone)]
pub struct VmMessage {
    pub kind: CallKind,
    /// Nesting depth; the outer transaction frame is 0.
    pub depth: u32,
    /// Gas budget for this frame.
    pub gas: u64,
    pub sender: Address,
    pub destination: Address,
    /// Value transferred alongside the call.
    pub value: Balance,
    /// Call data; empty for deployments.
    pub input: Bytes,
}

/// Outcome of one interpreter invocation.
#[derive(Debug, Clone)]
pub struct VmResult {
    pub status: VmStatus,
    pub gas_left: u64,
    /// Deployment output (runtime code) or call return data.
    pub output: Bytes,
}

impl VmResult {
    pub fn failure(gas_left: u64) -> VmResult {
        VmResult {
            status: VmStatus::Failure,
            gas_left,
            output: Bytes::default(),
        }
    }

    pub fn success(gas_left: u64, output: Bytes) -> VmResult {
        VmResult {
            status: VmStatus::Success,
            gas_left,
            output,
        }
    }
}

/// Transaction-level context visible to contracts.
#[derive(Debug, Clone)]
pub struct TxContext {
    /// Gas price; fixed at zero in this design.
    pub gas_price: Balance,
    /// Sender of the outermost transaction.
    pub origin: Address,
    /// Depth of the containing block.
    pub block_number: u64,
    /// Timestamp of the containing block, seconds since epoch.
    pub block_timestamp: u32,
    /// Coinbase of the containing block.
    pub block_coinbase: Address,
    /// Fixed difficulty word advertised to contracts.
    pub block_difficulty: [u8; 32],
}

/// Fixed difficulty constant: a 32-byte word with one marker byte set.
pub fn difficulty_word() -> [u8; 32] {
    let mut word = [0u8; 32];
    word[2] = 0x28;
    word
}

/// State and environment access the interpreter is given.
///
/// Every method is infallible by contract: implementations catch their own
/// errors and return zero/empty values instead.
pub trait Host {
    /// True if the account exists.
    fn account_exists(&self, address: &Address) -> bool;

    /// Current storage value; 32 zero bytes if absent.
    fn get_storage(&self, address: &Address, key: &Hash) -> [u8; 32];

    /// Writes a storage slot, classifying the transition.
    fn set_storage(&mut self, address: &Address, key: &Hash, value: [u8; 32]) -> StorageStatus;

    /// Balance of the account; zero if absent.
    fn get_balance(&self, address: &Address) -> Balance;

    /// Length of the account's runtime code.
    fn get_code_size(&self, address: &Address) -> usize;

    /// Hash of the account's init code; zero if absent.
    fn get_code_hash(&self, address: &Address) -> Hash;

    /// Copies runtime code starting at `offset` into `buffer`.
    ///
    /// Returns the number of bytes copied.
    fn copy_code(&self, address: &Address, offset: usize, buffer: &mut [u8]) -> usize;

    /// Transfers the account's whole balance to `beneficiary` and removes it.
    fn self_destruct(&mut self, address: &Address, beneficiary: &Address);

    /// Executes a nested call frame.
    fn call(&mut self, msg: &VmMessage) -> VmResult;

    /// Context of the outer transaction.
    fn get_tx_context(&self) -> TxContext;

    /// Canonical block hash at the given depth; zero if unknown.
    fn get_block_hash(&self, depth: u64) -> Hash;

    /// Contract log output; dropped in the current design.
    fn emit_log(&mut self, address: &Address, data: &[u8], topics: &[Hash]);
}

/// The pluggable interpreter.
pub trait Evaluator: Send + Sync {
    /// Runs `code` under `msg`, using `host` for all state access.
    fn execute(&self, host: &mut dyn Host, msg: &VmMessage, code: &[u8]) -> VmResult;
}

/// Evaluator for nodes running without an interpreter.
///
/// Every execution fails, so contract transactions settle as malformed
/// while plain transfers remain fully functional.
pub struct DisabledEvaluator;

impl Evaluator for DisabledEvaluator {
    fn execute(&self, _host: &mut dyn Host, msg: &VmMessage, _code: &[u8]) -> VmResult {
        VmResult::failure(msg.gas)
    }
}

/// Returns the evaluator the node boots with.
///
/// Wiring a real interpreter in is a deployment concern; without one the
/// node validates and transfers but fails all contract executions.
pub fn load() -> std::sync::Arc<dyn Evaluator> {
    std::sync::Arc::new(DisabledEvaluator)
}
