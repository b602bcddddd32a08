//! Cryptographic primitives: digests, signatures, ciphers and the key vault.

pub mod cipher;
pub mod keys;
pub mod vault;

use crate::types::address::ADDRESS_LEN;
use crate::types::hash::{Hash, HASH_LEN};
use base64::Engine;
use peerchain_derive::Error;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material could not be parsed or generated.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// A signature is malformed or does not verify.
    #[error("invalid signature")]
    InvalidSignature,
    /// Plaintext exceeds the cipher's capacity.
    #[error("message too long: {actual} bytes, limit {limit}")]
    MessageTooLong { actual: usize, limit: usize },
    /// Ciphertext is malformed or fails decryption.
    #[error("decryption failed")]
    DecryptionFailed,
    /// Key files on disk are missing or unreadable.
    #[error("key storage error: {0}")]
    Storage(String),
}

/// Computes the SHA-256 digest of the input.
pub fn sha256(data: &[u8]) -> [u8; HASH_LEN] {
    Sha256::digest(data).into()
}

/// Computes the RIPEMD-160 digest of the input.
pub fn ripemd160(data: &[u8]) -> [u8; ADDRESS_LEN] {
    Ripemd160::digest(data).into()
}

/// Renders arbitrary bytes as base58.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decodes a base58 string into bytes.
pub fn base58_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    bs58::decode(s)
        .into_vec()
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Renders arbitrary bytes as standard base64.
pub fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decodes a standard base64 string into bytes.
pub fn base64_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Convenience wrapper returning the digest as a [`Hash`].
pub fn sha256_hash(data: &[u8]) -> Hash {
    Hash(sha256(data))
}
