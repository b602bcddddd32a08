//! 20-byte account addresses derived from public keys.

use crate::types::hash::Hash;
use peerchain_derive::BinaryCodec;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::fmt;

/// Address length in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Fixed-size 20-byte address identifying an account.
///
/// Derived from a public key as `RIPEMD160(SHA256(pubkey_bytes))` and
/// rendered as base58 for display. This type is `Copy` for cheap passing
/// in validation and lookup paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec, Default, Hash, Ord, PartialOrd)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero sentinel.
    ///
    /// Used as the transaction recipient for contract creation and as the
    /// coinbase of the genesis block.
    pub const fn null() -> Address {
        Address([0u8; ADDRESS_LEN])
    }

    /// Returns true if this is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Returns the address as a byte slice.
    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Derives an address from serialized public key bytes.
    pub fn from_public_key_bytes(pubkey_bytes: &[u8]) -> Address {
        let sha = Sha256::digest(pubkey_bytes);
        let ripemd: [u8; ADDRESS_LEN] = Ripemd160::digest(sha).into();
        Address(ripemd)
    }

    /// Derives the deterministic address of a contract account.
    ///
    /// `RIPEMD160(SHA256(creator_bytes ++ code_hash))` - the code hash is
    /// itself `SHA256(init code)`, so redeploying identical code from the
    /// same creator lands on the same address.
    pub fn for_contract(creator: &Address, code_hash: &Hash) -> Address {
        let mut hasher = Sha256::new();
        hasher.update(creator.as_slice());
        hasher.update(code_hash.as_slice());
        let sha: [u8; 32] = hasher.finalize().into();
        let ripemd: [u8; ADDRESS_LEN] = Ripemd160::digest(sha).into();
        Address(ripemd)
    }

    /// Parses an address from its base58 rendering.
    pub fn from_base58(s: &str) -> Option<Address> {
        let bytes = bs58::decode(s).into_vec().ok()?;
        if bytes.len() != ADDRESS_LEN {
            return None;
        }
        let mut addr = [0u8; ADDRESS_LEN];
        addr.copy_from_slice(&bytes);
        Some(Address(addr))
    }

    /// Renders the address as base58.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}
