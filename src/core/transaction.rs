//! Signed value transfers and contract invocations.

use crate::crypto::keys::{PrivateKey, PublicKey, Signature};
use crate::types::address::Address;
use crate::types::balance::Balance;
use crate::types::bytes::Bytes;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use peerchain_derive::BinaryCodec;
use std::fmt;

/// Sender authentication attached to a transaction.
///
/// Carries the compressed public key so receivers can both verify the
/// signature and check that the key matches the declared sender address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub struct Sign {
    /// Compressed secp256k1 public key of the sender.
    pub public_key: PublicKey,
    /// Recoverable signature over the transaction header hash.
    pub signature: Signature,
}

/// A transfer of value and/or a contract interaction.
///
/// Immutable once signed; the signature covers every field except itself.
/// A null `to` address requests contract creation with `data` as the init
/// code. `amount == 0` is only meaningful for pure contract calls, so it
/// requires non-empty `data`.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Transaction {
    /// Sender account; must match the address derived from the signing key.
    pub from: Address,
    /// Recipient account, or the null address for contract creation.
    pub to: Address,
    /// Native value moved from sender to recipient.
    pub amount: Balance,
    /// Fee offered to the block's coinbase; doubles as the VM gas budget.
    pub fee: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u32,
    /// Opaque payload: init code, call data, or empty for plain transfers.
    pub data: Bytes,
    /// Signature; `None` only for the genesis grant.
    pub sign: Option<Sign>,
}

impl Transaction {
    /// Hash of the signable header: every field except the signature.
    pub fn header_hash(&self) -> Hash {
        let mut h = Hash::sha256();
        self.from.encode(&mut h);
        self.to.encode(&mut h);
        self.amount.encode(&mut h);
        self.fee.encode(&mut h);
        self.timestamp.encode(&mut h);
        self.data.encode(&mut h);
        h.finalize()
    }

    /// Hash identifying this transaction, signature included.
    pub fn hash(&self) -> Hash {
        let mut h = Hash::sha256();
        self.encode(&mut h);
        h.finalize()
    }

    /// Signs the transaction in place with the given key.
    ///
    /// The declared `from` address is left untouched; verification will
    /// reject the transaction if the key does not match it.
    pub fn sign_with(&mut self, key: &PrivateKey) {
        let header = self.header_hash();
        self.sign = Some(Sign {
            public_key: key.public_key(),
            signature: key.sign(&header),
        });
    }

    /// Verifies the signature and the sender binding.
    ///
    /// Returns `false` when the transaction is unsigned, when the embedded
    /// key does not derive the declared sender, or when the signature does
    /// not cover the header hash.
    pub fn check_sign(&self) -> bool {
        let Some(sign) = &self.sign else {
            return false;
        };
        if sign.public_key.address() != self.from {
            return false;
        }
        sign.public_key.verify(&self.header_hash(), &sign.signature)
    }

    /// True when this transaction requests contract creation.
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_null()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tx from={} to={} amount={} fee={}",
            self.from, self.to, self.amount, self.fee
        )
    }
}

/// Step-by-step construction of a signed transaction.
pub struct TransactionBuilder {
    from: Option<Address>,
    to: Option<Address>,
    amount: Option<Balance>,
    fee: Option<u64>,
    timestamp: Option<u32>,
    data: Bytes,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            from: None,
            to: None,
            amount: None,
            fee: None,
            timestamp: None,
            data: Bytes::default(),
        }
    }

    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    pub fn amount(mut self, amount: Balance) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Builds an unsigned transaction; every scalar field must be set.
    pub fn build(self) -> Option<Transaction> {
        Some(Transaction {
            from: self.from?,
            to: self.to?,
            amount: self.amount?,
            fee: self.fee?,
            timestamp: self.timestamp?,
            data: self.data,
            sign: None,
        })
    }

    /// Builds and signs in one step.
    pub fn build_signed(self, key: &PrivateKey) -> Option<Transaction> {
        let mut tx = self.build()?;
        tx.sign_with(key);
        Some(tx)
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome classification for an executed or rejected transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub enum StatusCode {
    /// Accepted into the pending pool, not yet in a block.
    Pending,
    /// Executed and committed.
    Success,
    /// The VM rolled the call back; the consumed fee was still charged.
    Revert,
    /// An internal error aborted processing.
    Failed,
    /// The sender could not cover `amount + fee`.
    NotEnoughBalance,
    /// Signature missing, malformed, or not matching the sender.
    BadSign,
    /// Malformed request, e.g. calling a contract without call data.
    BadQueryForm,
}

/// What kind of operation the status refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub enum ActionType {
    None,
    Transfer,
    ContractCreation,
    ContractCall,
}

/// Stored verdict for a processed transaction.
///
/// Queries about the same transaction hash always return the same status,
/// so clients can poll without re-triggering execution.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct TransactionStatus {
    pub code: StatusCode,
    pub action: ActionType,
    /// Unused gas returned to the sender (fee units).
    pub gas_left: u64,
    /// Action-specific payload: contract address or base64 call output.
    pub message: String,
}

impl TransactionStatus {
    pub fn new(code: StatusCode, action: ActionType, gas_left: u64, message: String) -> Self {
        Self {
            code,
            action,
            gas_left,
            message,
        }
    }
}
