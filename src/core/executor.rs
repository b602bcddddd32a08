//! Transaction execution against a speculative state snapshot.
//!
//! Every transaction runs against its own [`StateSnapshot`]. Success merges
//! the snapshot into the canonical state; failure and revert discard it, so
//! per-transaction effects are atomic. The executor also implements the VM
//! host callbacks, bridging the interpreter to the snapshot.

use crate::core::block::Block;
use crate::core::transaction::{ActionType, StatusCode, Transaction, TransactionStatus};
use crate::crypto::{base58_encode, base64_encode};
use crate::debug;
use crate::storage::state::{StateError, StateManager, StateSnapshot};
use crate::types::address::Address;
use crate::types::balance::Balance;
use crate::types::bytes::Bytes;
use crate::types::hash::Hash;
use crate::vm::{
    difficulty_word, CallKind, Evaluator, Host, StorageStatus, TxContext, VmMessage, VmResult,
    VmStatus,
};

/// Read access to the canonical chain needed by contracts.
pub trait ChainReader {
    /// Canonical block hash at the given depth, if known.
    fn block_hash_by_depth(&self, depth: u64) -> Option<Hash>;
}

/// Runs transactions through the VM and settles fees.
///
/// Borrows its collaborators for the duration of one block application, so
/// it carries no state of its own.
pub struct Executor<'a> {
    state: &'a StateManager,
    evaluator: &'a dyn Evaluator,
    chain: &'a dyn ChainReader,
}

impl<'a> Executor<'a> {
    pub fn new(
        state: &'a StateManager,
        evaluator: &'a dyn Evaluator,
        chain: &'a dyn ChainReader,
    ) -> Self {
        Self {
            state,
            evaluator,
            chain,
        }
    }

    /// Executes one transaction in the context of its containing block.
    ///
    /// Never panics and never leaves partial effects: the returned status is
    /// the single source of truth about what happened.
    pub fn try_perform(&self, tx: &Transaction, block: &Block) -> TransactionStatus {
        let tx_hash = tx.hash();
        debug!("performing transaction {tx_hash}");
        self.state.add_transaction_hash(&tx.from, tx_hash);

        let action = self.classify(tx);
        match self.perform(tx, block, action) {
            Ok(status) => status,
            Err(_) => TransactionStatus::new(StatusCode::Failed, action, 0, String::new()),
        }
    }

    fn classify(&self, tx: &Transaction) -> ActionType {
        if tx.to.is_null() {
            ActionType::ContractCreation
        } else if self.state.account_type(&tx.to) == crate::core::account::AccountType::Contract {
            ActionType::ContractCall
        } else {
            ActionType::Transfer
        }
    }

    fn perform(
        &self,
        tx: &Transaction,
        block: &Block,
        action: ActionType,
    ) -> Result<TransactionStatus, StateError> {
        match action {
            ActionType::ContractCreation => self.perform_creation(tx, block),
            ActionType::ContractCall => self.perform_call(tx, block),
            _ => self.perform_transfer(tx, block),
        }
    }

    fn perform_transfer(
        &self,
        tx: &Transaction,
        block: &Block,
    ) -> Result<TransactionStatus, StateError> {
        let mut snapshot = self.state.create_copy();
        snapshot.debit(&tx.from, Balance::from(tx.fee))?;

        if !snapshot.try_transfer(&tx.from, &tx.to, tx.amount) {
            return Ok(TransactionStatus::new(
                StatusCode::NotEnoughBalance,
                ActionType::Transfer,
                tx.fee,
                String::new(),
            ));
        }

        snapshot.credit(&block.coinbase, Balance::from(tx.fee))?;
        self.state.apply_changes(snapshot);

        Ok(TransactionStatus::new(
            StatusCode::Success,
            ActionType::Transfer,
            0,
            String::new(),
        ))
    }

    fn perform_creation(
        &self,
        tx: &Transaction,
        block: &Block,
    ) -> Result<TransactionStatus, StateError> {
        let mut snapshot = self.state.create_copy();
        snapshot.debit(&tx.from, Balance::from(tx.fee))?;

        let code_hash = Hash::compute(&tx.data);
        let contract_address = snapshot.create_contract(&tx.from, code_hash)?;

        if !snapshot.try_transfer(&tx.from, &contract_address, tx.amount) {
            return Ok(TransactionStatus::new(
                StatusCode::NotEnoughBalance,
                ActionType::ContractCreation,
                tx.fee,
                String::new(),
            ));
        }

        let msg = VmMessage {
            kind: CallKind::Call,
            depth: 0,
            gas: tx.fee,
            sender: tx.from,
            destination: contract_address,
            value: tx.amount,
            input: Bytes::default(),
        };
        let result = self.call_vm(&mut snapshot, block, tx, &msg, tx.data.clone());

        match result.status {
            VmStatus::Success => {
                snapshot.set_runtime_code(&contract_address, result.output);
                debug!(
                    "deployed contract to address {}",
                    base58_encode(contract_address.as_slice())
                );
                self.settle_in_snapshot(&mut snapshot, tx, block, result.gas_left)?;
                self.state.apply_changes(snapshot);

                Ok(TransactionStatus::new(
                    StatusCode::Success,
                    ActionType::ContractCreation,
                    result.gas_left,
                    base58_encode(contract_address.as_slice()),
                ))
            }
            VmStatus::Revert => {
                drop(snapshot);
                self.settle_on_canonical(tx, block, result.gas_left)?;
                Ok(TransactionStatus::new(
                    StatusCode::Revert,
                    ActionType::ContractCreation,
                    result.gas_left,
                    String::new(),
                ))
            }
            VmStatus::Failure => {
                drop(snapshot);
                self.settle_on_canonical(tx, block, result.gas_left)?;
                Ok(TransactionStatus::new(
                    StatusCode::BadQueryForm,
                    ActionType::ContractCreation,
                    result.gas_left,
                    String::new(),
                ))
            }
        }
    }

    fn perform_call(
        &self,
        tx: &Transaction,
        block: &Block,
    ) -> Result<TransactionStatus, StateError> {
        if tx.data.is_empty() {
            return Ok(TransactionStatus::new(
                StatusCode::BadQueryForm,
                ActionType::ContractCall,
                tx.fee,
                String::new(),
            ));
        }

        let mut snapshot = self.state.create_copy();
        snapshot.debit(&tx.from, Balance::from(tx.fee))?;

        if tx.amount > Balance::zero() && !snapshot.try_transfer(&tx.from, &tx.to, tx.amount) {
            return Ok(TransactionStatus::new(
                StatusCode::NotEnoughBalance,
                ActionType::ContractCall,
                tx.fee,
                String::new(),
            ));
        }

        let code = snapshot.runtime_code(&tx.to);
        let msg = VmMessage {
            kind: CallKind::Call,
            depth: 0,
            gas: tx.fee,
            sender: tx.from,
            destination: tx.to,
            value: tx.amount,
            input: tx.data.clone(),
        };
        let result = self.call_vm(&mut snapshot, block, tx, &msg, code);

        match result.status {
            VmStatus::Success => {
                let output = base64_encode(&result.output);
                self.settle_in_snapshot(&mut snapshot, tx, block, result.gas_left)?;
                self.state.apply_changes(snapshot);

                Ok(TransactionStatus::new(
                    StatusCode::Success,
                    ActionType::ContractCall,
                    result.gas_left,
                    output,
                ))
            }
            VmStatus::Revert => {
                drop(snapshot);
                self.settle_on_canonical(tx, block, result.gas_left)?;
                Ok(TransactionStatus::new(
                    StatusCode::Revert,
                    ActionType::ContractCall,
                    result.gas_left,
                    String::new(),
                ))
            }
            VmStatus::Failure => {
                drop(snapshot);
                self.settle_on_canonical(tx, block, result.gas_left)?;
                Ok(TransactionStatus::new(
                    StatusCode::BadQueryForm,
                    ActionType::ContractCall,
                    result.gas_left,
                    String::new(),
                ))
            }
        }
    }

    /// Fee settlement for a committing execution: the snapshot already
    /// carries the full fee debit, so the coinbase receives the consumed
    /// part and the sender gets the remainder back.
    fn settle_in_snapshot(
        &self,
        snapshot: &mut StateSnapshot<'_>,
        tx: &Transaction,
        block: &Block,
        gas_left: u64,
    ) -> Result<(), StateError> {
        let consumed = tx.fee.saturating_sub(gas_left);
        snapshot.credit(&block.coinbase, Balance::from(consumed))?;
        snapshot.credit(&tx.from, Balance::from(gas_left))?;
        Ok(())
    }

    /// Fee settlement for a discarded execution: the snapshot never reached
    /// the canonical state, so only the consumed fee moves from the sender
    /// to the coinbase.
    fn settle_on_canonical(
        &self,
        tx: &Transaction,
        block: &Block,
        gas_left: u64,
    ) -> Result<(), StateError> {
        let consumed = tx.fee.saturating_sub(gas_left);
        self.state.debit(&tx.from, Balance::from(consumed))?;
        self.state.credit(&block.coinbase, Balance::from(consumed))?;
        Ok(())
    }

    fn call_vm(
        &self,
        snapshot: &mut StateSnapshot<'a>,
        block: &Block,
        tx: &Transaction,
        msg: &VmMessage,
        code: Bytes,
    ) -> VmResult {
        let mut host = ExecutionHost {
            executor: self,
            state: snapshot,
            block,
            tx,
        };
        self.evaluator.execute(&mut host, msg, &code)
    }
}

/// Per-invocation bridge between the interpreter and the node.
///
/// Constructed for one VM run and dropped when it returns, so the borrow of
/// the snapshot never outlives the transaction being executed. Every
/// callback is total: failures degrade to zero/empty results.
struct ExecutionHost<'h, 'a> {
    executor: &'h Executor<'a>,
    state: &'h mut StateSnapshot<'a>,
    block: &'h Block,
    tx: &'h Transaction,
}

impl<'h, 'a> Host for ExecutionHost<'h, 'a> {
    fn account_exists(&self, address: &Address) -> bool {
        self.state.has_account(address)
    }

    fn get_storage(&self, address: &Address, key: &Hash) -> [u8; 32] {
        if !self.state.has_account(address) {
            return [0u8; 32];
        }
        self.state.storage_value(address, key)
    }

    fn set_storage(&mut self, address: &Address, key: &Hash, value: [u8; 32]) -> StorageStatus {
        const ZERO: [u8; 32] = [0u8; 32];

        if !self.state.has_storage_value(address, key) {
            if value == ZERO {
                return StorageStatus::Unchanged;
            }
            self.state.set_storage_value(address, *key, value);
            return StorageStatus::Added;
        }

        let old = self.state.storage_value(address, key);
        if old == value {
            return StorageStatus::Unchanged;
        }
        if value == ZERO {
            self.state.delete_storage_value(address, key);
            return StorageStatus::Deleted;
        }
        self.state.set_storage_value(address, *key, value);
        StorageStatus::Modified
    }

    fn get_balance(&self, address: &Address) -> Balance {
        self.state.balance(address)
    }

    fn get_code_size(&self, address: &Address) -> usize {
        self.state.runtime_code(address).len()
    }

    fn get_code_hash(&self, address: &Address) -> Hash {
        self.state.code_hash(address)
    }

    fn copy_code(&self, address: &Address, offset: usize, buffer: &mut [u8]) -> usize {
        let code = self.state.runtime_code(address);
        if offset >= code.len() {
            return 0;
        }
        let available = code.len() - offset;
        let count = available.min(buffer.len());
        buffer[..count].copy_from_slice(&code[offset..offset + count]);
        count
    }

    fn self_destruct(&mut self, address: &Address, beneficiary: &Address) {
        let balance = self.state.balance(address);
        self.state.try_transfer(address, beneficiary, balance);
        self.state.delete_account(address);
    }

    fn call(&mut self, msg: &VmMessage) -> VmResult {
        if self.state.is_contract(&msg.destination) {
            let code = self.state.runtime_code(&msg.destination);
            let inner = VmMessage {
                depth: msg.depth + 1,
                ..msg.clone()
            };
            let evaluator = self.executor.evaluator;
            return evaluator.execute(self, &inner, &code);
        }

        // Plain transfer destination: move the value and report success
        if !self.state.try_transfer(&msg.sender, &msg.destination, msg.value) {
            return VmResult::failure(msg.gas);
        }
        VmResult::success(msg.gas, Bytes::default())
    }

    fn get_tx_context(&self) -> TxContext {
        TxContext {
            gas_price: Balance::zero(),
            origin: self.tx.from,
            block_number: self.block.depth,
            block_timestamp: self.block.timestamp,
            block_coinbase: self.block.coinbase,
            block_difficulty: difficulty_word(),
        }
    }

    fn get_block_hash(&self, depth: u64) -> Hash {
        self.executor
            .chain
            .block_hash_by_depth(depth)
            .unwrap_or_else(Hash::zero)
    }

    fn emit_log(&mut self, _address: &Address, _data: &[u8], _topics: &[Hash]) {
        debug!("emit_log is denied; contract logs are dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::Block;
    use crate::core::transaction::TransactionBuilder;
    use crate::core::transactions_set::TransactionsSet;
    use crate::crypto::keys::PrivateKey;
    use crate::utils::test_utils::{NoChain, ScriptedVm};
    use crate::vm::DisabledEvaluator;

    fn addr(tag: &[u8]) -> Address {
        Address::from_public_key_bytes(tag)
    }

    fn coinbase() -> Address {
        addr(b"coinbase")
    }

    fn block_for(tx: &Transaction) -> Block {
        let mut txs = TransactionsSet::new();
        txs.add(tx.clone());
        Block::new(6, Hash::compute(b"parent"), tx.timestamp + 1, coinbase(), txs)
    }

    fn tx(key: &PrivateKey, to: Address, amount: u64, fee: u64, data: &[u8]) -> Transaction {
        TransactionBuilder::new()
            .from(key.public_key().address())
            .to(to)
            .amount(Balance::from(amount))
            .fee(fee)
            .timestamp(1600000000)
            .data(data)
            .build_signed(key)
            .unwrap()
    }

    fn funded_state(pairs: &[(Address, u64)]) -> StateManager {
        let state = StateManager::new();
        for (address, amount) in pairs {
            state.credit(address, Balance::from(*amount)).unwrap();
        }
        state
    }

    #[test]
    fn transfer_moves_funds_without_fee() {
        let key = PrivateKey::generate();
        let a = key.public_key().address();
        let b = addr(b"b");
        let state = funded_state(&[(a, 1000), (b, 7)]);

        let vm = DisabledEvaluator;
        let executor = Executor::new(&state, &vm, &NoChain);
        let transfer = tx(&key, b, 13, 0, b"");
        let status = executor.try_perform(&transfer, &block_for(&transfer));

        assert_eq!(status.code, StatusCode::Success);
        assert_eq!(status.action, ActionType::Transfer);
        assert_eq!(state.balance(&a), Balance::from(987u64));
        assert_eq!(state.balance(&b), Balance::from(20u64));
        // fee was zero, so the coinbase gained nothing
        assert_eq!(state.balance(&coinbase()), Balance::zero());
    }

    #[test]
    fn transfer_pays_fee_to_coinbase() {
        let key = PrivateKey::generate();
        let a = key.public_key().address();
        let b = addr(b"b");
        let state = funded_state(&[(a, 1000)]);

        let vm = DisabledEvaluator;
        let executor = Executor::new(&state, &vm, &NoChain);
        let transfer = tx(&key, b, 100, 5, b"");
        let status = executor.try_perform(&transfer, &block_for(&transfer));

        assert_eq!(status.code, StatusCode::Success);
        assert_eq!(state.balance(&a), Balance::from(895u64));
        assert_eq!(state.balance(&b), Balance::from(100u64));
        assert_eq!(state.balance(&coinbase()), Balance::from(5u64));
    }

    #[test]
    fn overdraft_leaves_balances_untouched() {
        let key = PrivateKey::generate();
        let a = key.public_key().address();
        let b = addr(b"b");
        let state = funded_state(&[(a, 10)]);

        let vm = DisabledEvaluator;
        let executor = Executor::new(&state, &vm, &NoChain);
        let transfer = tx(&key, b, 100, 1, b"");
        let status = executor.try_perform(&transfer, &block_for(&transfer));

        assert_eq!(status.code, StatusCode::NotEnoughBalance);
        assert_eq!(status.action, ActionType::Transfer);
        assert_eq!(state.balance(&a), Balance::from(10u64));
        assert_eq!(state.balance(&b), Balance::zero());
    }

    #[test]
    fn contract_creation_deploys_echoed_code() {
        let key = PrivateKey::generate();
        let creator = key.public_key().address();
        let state = funded_state(&[(creator, 10_000)]);

        // Evaluator returning its own code as runtime output, burning 30 gas
        let vm = ScriptedVm::deploy_echo(30);
        let executor = Executor::new(&state, &vm, &NoChain);

        let code = b"trivial evm stub";
        let create = tx(&key, Address::null(), 0, 100, code);
        let status = executor.try_perform(&create, &block_for(&create));

        assert_eq!(status.code, StatusCode::Success);
        assert_eq!(status.action, ActionType::ContractCreation);
        assert_eq!(status.gas_left, 70);

        let expected = Address::for_contract(&creator, &Hash::compute(code));
        assert_eq!(status.message, base58_encode(expected.as_slice()));

        let snapshot = state.create_copy();
        assert!(snapshot.is_contract(&expected));
        assert_eq!(snapshot.runtime_code(&expected).as_slice(), code);

        // fee split: 30 consumed to coinbase, 70 refunded
        assert_eq!(state.balance(&creator), Balance::from(9_970u64));
        assert_eq!(state.balance(&coinbase()), Balance::from(30u64));
    }

    #[test]
    fn creation_with_value_endows_contract() {
        let key = PrivateKey::generate();
        let creator = key.public_key().address();
        let state = funded_state(&[(creator, 1_000)]);

        let vm = ScriptedVm::deploy_echo(10);
        let executor = Executor::new(&state, &vm, &NoChain);
        let create = tx(&key, Address::null(), 500, 100, b"code");
        let status = executor.try_perform(&create, &block_for(&create));

        assert_eq!(status.code, StatusCode::Success);
        let contract = Address::for_contract(&creator, &Hash::compute(b"code"));
        assert_eq!(state.balance(&contract), Balance::from(500u64));
        assert_eq!(state.balance(&creator), Balance::from(410u64));
    }

    #[test]
    fn creation_unaffordable_endowment_fails() {
        let key = PrivateKey::generate();
        let creator = key.public_key().address();
        let state = funded_state(&[(creator, 100)]);

        let vm = ScriptedVm::deploy_echo(10);
        let executor = Executor::new(&state, &vm, &NoChain);
        // fee 50 is coverable, but amount 500 is not
        let create = tx(&key, Address::null(), 500, 50, b"code");
        let status = executor.try_perform(&create, &block_for(&create));

        assert_eq!(status.code, StatusCode::NotEnoughBalance);
        assert_eq!(status.action, ActionType::ContractCreation);
        assert_eq!(state.balance(&creator), Balance::from(100u64));
    }

    #[test]
    fn reverted_creation_charges_only_consumed_fee() {
        let key = PrivateKey::generate();
        let creator = key.public_key().address();
        let state = funded_state(&[(creator, 1_000)]);

        let vm = ScriptedVm::reverting(40);
        let executor = Executor::new(&state, &vm, &NoChain);
        let create = tx(&key, Address::null(), 0, 100, b"code");
        let status = executor.try_perform(&create, &block_for(&create));

        assert_eq!(status.code, StatusCode::Revert);
        assert_eq!(status.gas_left, 60);

        // No contract account came into existence
        let contract = Address::for_contract(&creator, &Hash::compute(b"code"));
        assert!(!state.has_account(&contract));

        // Only the consumed 40 moved
        assert_eq!(state.balance(&creator), Balance::from(960u64));
        assert_eq!(state.balance(&coinbase()), Balance::from(40u64));
    }

    #[test]
    fn contract_call_runs_runtime_code() {
        let key = PrivateKey::generate();
        let caller = key.public_key().address();
        let state = funded_state(&[(caller, 10_000)]);

        let deploy_vm = ScriptedVm::deploy_echo(10);
        let executor = Executor::new(&state, &deploy_vm, &NoChain);
        let create = tx(&key, Address::null(), 0, 100, b"runtime blob");
        assert_eq!(
            executor
                .try_perform(&create, &block_for(&create))
                .code,
            StatusCode::Success
        );
        let contract = Address::for_contract(&caller, &Hash::compute(b"runtime blob"));

        // Call evaluator: succeed, return the input reversed, burn 25 gas
        let call_vm = ScriptedVm::new(|_host: &mut dyn Host, msg: &VmMessage, code: &[u8]| {
            assert_eq!(code, b"runtime blob");
            let mut reversed = msg.input.to_vec();
            reversed.reverse();
            VmResult::success(msg.gas - 25, Bytes::from_vec(reversed))
        });
        let executor = Executor::new(&state, &call_vm, &NoChain);
        let call = tx(&key, contract, 0, 50, b"abc");
        let status = executor.try_perform(&call, &block_for(&call));

        assert_eq!(status.code, StatusCode::Success);
        assert_eq!(status.action, ActionType::ContractCall);
        assert_eq!(status.gas_left, 25);
        assert_eq!(status.message, base64_encode(b"cba"));
    }

    #[test]
    fn contract_call_without_data_is_malformed() {
        let key = PrivateKey::generate();
        let caller = key.public_key().address();
        let state = funded_state(&[(caller, 10_000)]);

        let vm = ScriptedVm::deploy_echo(10);
        let executor = Executor::new(&state, &vm, &NoChain);
        let create = tx(&key, Address::null(), 0, 100, b"code");
        executor.try_perform(&create, &block_for(&create));
        let contract = Address::for_contract(&caller, &Hash::compute(b"code"));
        let balance_after_deploy = state.balance(&caller);

        let call = tx(&key, contract, 0, 50, b"");
        let status = executor.try_perform(&call, &block_for(&call));

        assert_eq!(status.code, StatusCode::BadQueryForm);
        assert_eq!(status.action, ActionType::ContractCall);
        // Nothing was charged
        assert_eq!(state.balance(&caller), balance_after_deploy);
    }

    #[test]
    fn reverted_call_keeps_contract_state() {
        let key = PrivateKey::generate();
        let caller = key.public_key().address();
        let state = funded_state(&[(caller, 10_000)]);

        let deploy_vm = ScriptedVm::deploy_echo(10);
        let executor = Executor::new(&state, &deploy_vm, &NoChain);
        let create = tx(&key, Address::null(), 0, 100, b"code");
        executor.try_perform(&create, &block_for(&create));
        let contract = Address::for_contract(&caller, &Hash::compute(b"code"));

        // The call writes storage, then reverts
        let call_vm = ScriptedVm::new(move |host: &mut dyn Host, msg: &VmMessage, _: &[u8]| {
            host.set_storage(&msg.destination, &Hash::compute(b"slot"), [1u8; 32]);
            VmResult {
                status: VmStatus::Revert,
                gas_left: msg.gas - 5,
                output: Bytes::default(),
            }
        });
        let executor = Executor::new(&state, &call_vm, &NoChain);
        let before = state.balance(&caller);
        let call = tx(&key, contract, 0, 20, b"do it");
        let status = executor.try_perform(&call, &block_for(&call));

        assert_eq!(status.code, StatusCode::Revert);
        // Storage write was discarded with the snapshot
        let snapshot = state.create_copy();
        assert!(!snapshot.has_storage_value(&contract, &Hash::compute(b"slot")));
        // Sender paid exactly the consumed 5
        assert_eq!(state.balance(&caller), before - Balance::from(5u64));
        assert_eq!(state.balance(&coinbase()), Balance::from(10 + 5u64));
    }

    #[test]
    fn host_storage_status_classification() {
        let key = PrivateKey::generate();
        let caller = key.public_key().address();
        let state = funded_state(&[(caller, 1_000)]);

        let vm = ScriptedVm::new(|host: &mut dyn Host, msg: &VmMessage, _: &[u8]| {
            let contract = msg.destination;
            let slot = Hash::compute(b"s");
            const ZERO: [u8; 32] = [0u8; 32];

            assert_eq!(host.set_storage(&contract, &slot, ZERO), StorageStatus::Unchanged);
            assert_eq!(host.set_storage(&contract, &slot, [1u8; 32]), StorageStatus::Added);
            assert_eq!(host.set_storage(&contract, &slot, [1u8; 32]), StorageStatus::Unchanged);
            assert_eq!(host.set_storage(&contract, &slot, [2u8; 32]), StorageStatus::Modified);
            assert_eq!(host.set_storage(&contract, &slot, ZERO), StorageStatus::Deleted);

            VmResult::success(msg.gas, Bytes::new(b"out".as_slice()))
        });

        let executor = Executor::new(&state, &vm, &NoChain);
        let create = tx(&key, Address::null(), 0, 10, b"code");
        let status = executor.try_perform(&create, &block_for(&create));
        assert_eq!(status.code, StatusCode::Success);
    }

    #[test]
    fn host_tx_context_reflects_block() {
        let key = PrivateKey::generate();
        let caller = key.public_key().address();
        let state = funded_state(&[(caller, 1_000)]);

        let expected_origin = caller;
        let vm = ScriptedVm::new(move |host: &mut dyn Host, msg: &VmMessage, _: &[u8]| {
            let ctx = host.get_tx_context();
            assert_eq!(ctx.origin, expected_origin);
            assert_eq!(ctx.block_number, 6);
            assert_eq!(ctx.block_coinbase, Address::from_public_key_bytes(b"coinbase"));
            assert_eq!(ctx.gas_price, Balance::zero());
            assert_eq!(ctx.block_difficulty[2], 0x28);
            VmResult::success(msg.gas, Bytes::new(b"ok".as_slice()))
        });

        let executor = Executor::new(&state, &vm, &NoChain);
        let create = tx(&key, Address::null(), 0, 10, b"code");
        assert_eq!(
            executor.try_perform(&create, &block_for(&create)).code,
            StatusCode::Success
        );
    }

    #[test]
    fn host_self_destruct_pays_beneficiary() {
        let key = PrivateKey::generate();
        let caller = key.public_key().address();
        let heir = addr(b"heir");
        let state = funded_state(&[(caller, 1_000)]);

        let vm = ScriptedVm::new(move |host: &mut dyn Host, msg: &VmMessage, _: &[u8]| {
            host.self_destruct(&msg.destination, &heir);
            VmResult::success(msg.gas, Bytes::new(b"gone".as_slice()))
        });

        let executor = Executor::new(&state, &vm, &NoChain);
        // Endow the contract with 200 so the beneficiary inherits it
        let create = tx(&key, Address::null(), 200, 10, b"code");
        let status = executor.try_perform(&create, &block_for(&create));
        assert_eq!(status.code, StatusCode::Success);

        let contract = Address::for_contract(&caller, &Hash::compute(b"code"));
        assert!(!state.has_account(&contract));
        assert_eq!(state.balance(&heir), Balance::from(200u64));
    }

    #[test]
    fn host_nested_call_to_client_transfers_value() {
        let key = PrivateKey::generate();
        let caller = key.public_key().address();
        let sidecar = addr(b"sidecar");
        let state = funded_state(&[(caller, 1_000)]);

        let vm = ScriptedVm::new(move |host: &mut dyn Host, msg: &VmMessage, _: &[u8]| {
            let inner = VmMessage {
                kind: CallKind::Call,
                depth: msg.depth,
                gas: msg.gas,
                sender: msg.destination,
                destination: sidecar,
                value: Balance::from(30u64),
                input: Bytes::default(),
            };
            let result = host.call(&inner);
            assert_eq!(result.status, VmStatus::Success);
            assert_eq!(result.gas_left, msg.gas);
            VmResult::success(msg.gas, Bytes::new(b"done".as_slice()))
        });

        let executor = Executor::new(&state, &vm, &NoChain);
        let create = tx(&key, Address::null(), 100, 10, b"code");
        assert_eq!(
            executor.try_perform(&create, &block_for(&create)).code,
            StatusCode::Success
        );

        assert_eq!(state.balance(&sidecar), Balance::from(30u64));
        let contract = Address::for_contract(&caller, &Hash::compute(b"code"));
        assert_eq!(state.balance(&contract), Balance::from(70u64));
    }

    #[test]
    fn failed_vm_statuses_map_to_bad_query_form() {
        let key = PrivateKey::generate();
        let caller = key.public_key().address();
        let state = funded_state(&[(caller, 1_000)]);

        let vm = DisabledEvaluator;
        let executor = Executor::new(&state, &vm, &NoChain);
        let create = tx(&key, Address::null(), 0, 100, b"code");
        let status = executor.try_perform(&create, &block_for(&create));

        assert_eq!(status.code, StatusCode::BadQueryForm);
        assert_eq!(status.action, ActionType::ContractCreation);
        // DisabledEvaluator returns the full gas, so nothing was consumed
        assert_eq!(status.gas_left, 100);
        assert_eq!(state.balance(&caller), Balance::from(1_000u64));
    }

    #[test]
    fn sender_transaction_history_is_recorded() {
        let key = PrivateKey::generate();
        let a = key.public_key().address();
        let state = funded_state(&[(a, 100)]);

        let vm = DisabledEvaluator;
        let executor = Executor::new(&state, &vm, &NoChain);
        let transfer = tx(&key, addr(b"b"), 10, 0, b"");
        executor.try_perform(&transfer, &block_for(&transfer));

        let info = state.account_info(&a);
        assert_eq!(info.transaction_hashes, vec![transfer.hash()]);
    }
}
