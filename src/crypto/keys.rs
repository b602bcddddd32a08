//! secp256k1 key pairs and recoverable signatures.

use crate::crypto::CryptoError;
use crate::types::address::Address;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::Hash;
use peerchain_derive::BinaryCodec;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, SecretKey};
use std::fmt;

/// Compressed public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 33;
/// Recoverable signature length: 64-byte compact form plus 1 recovery byte.
pub const SIGNATURE_LEN: usize = 65;

/// Private signing key on secp256k1.
///
/// Generated from OS entropy. Never serialized onto the wire.
#[derive(Clone)]
pub struct PrivateKey {
    key: SecretKey,
}

impl PrivateKey {
    /// Generates a new random private key.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, _) = secp.generate_keypair(&mut rand::thread_rng());
        Self { key: secret_key }
    }

    /// Creates a private key from raw bytes.
    ///
    /// Fails if the bytes are not a valid curve scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        SecretKey::from_slice(bytes)
            .map(|key| Self { key })
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Returns the raw scalar bytes.
    ///
    /// Handle with care; never log or transmit these bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.key.secret_bytes()
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey::from_inner(secp256k1::PublicKey::from_secret_key(&secp, &self.key))
    }

    /// Signs a 32-byte digest, producing a recoverable signature.
    pub fn sign(&self, digest: &Hash) -> Signature {
        let secp = Secp256k1::new();
        let message = Message::from_digest(digest.0);
        let recoverable = secp.sign_ecdsa_recoverable(&message, &self.key);
        Signature::from_recoverable(&recoverable)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secret material stays out of debug output
        write!(f, "PrivateKey(..)")
    }
}

/// Public key for signature verification and address derivation.
///
/// Carries the derived address so validation paths never recompute the
/// two digests.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key: secp256k1::PublicKey,
    address: Address,
}

impl PublicKey {
    fn from_inner(key: secp256k1::PublicKey) -> Self {
        let address = Address::from_public_key_bytes(&key.serialize());
        PublicKey { key, address }
    }

    /// Parses a compressed 33-byte public key.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        secp256k1::PublicKey::from_slice(bytes)
            .map(Self::from_inner)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Returns the compressed 33-byte serialization.
    pub fn serialize(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.key.serialize()
    }

    /// Returns the uncompressed coordinates without the format prefix.
    pub fn serialize_uncompressed(&self) -> [u8; 64] {
        let full = self.key.serialize_uncompressed();
        let mut out = [0u8; 64];
        out.copy_from_slice(&full[1..]);
        out
    }

    /// Returns the address derived from this key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Verifies a recoverable signature over a 32-byte digest.
    pub fn verify(&self, digest: &Hash, signature: &Signature) -> bool {
        let Ok(compact) = signature.to_standard() else {
            return false;
        };
        let secp = Secp256k1::new();
        let message = Message::from_digest(digest.0);
        secp.verify_ecdsa(&message, &compact, &self.key).is_ok()
    }
}

impl Encode for PublicKey {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.serialize());
    }
}

impl Decode for PublicKey {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = <[u8; PUBLIC_KEY_LEN]>::decode(input)?;
        PublicKey::from_slice(&bytes).map_err(|_| DecodeError::InvalidValue)
    }
}

/// 65-byte recoverable ECDSA signature: compact form plus recovery id.
#[derive(Clone, Copy, PartialEq, Eq, BinaryCodec)]
pub struct Signature(pub [u8; SIGNATURE_LEN]);

impl Signature {
    fn from_recoverable(sig: &RecoverableSignature) -> Self {
        let (rec_id, compact) = sig.serialize_compact();
        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&compact);
        out[64] = rec_id.to_i32() as u8;
        Signature(out)
    }

    fn to_recoverable(&self) -> Result<RecoverableSignature, CryptoError> {
        let rec_id = RecoveryId::from_i32(self.0[64] as i32)
            .map_err(|_| CryptoError::InvalidSignature)?;
        RecoverableSignature::from_compact(&self.0[..64], rec_id)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    fn to_standard(&self) -> Result<secp256k1::ecdsa::Signature, CryptoError> {
        secp256k1::ecdsa::Signature::from_compact(&self.0[..64])
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Recovers the signing public key from the signature and digest.
    pub fn recover(&self, digest: &Hash) -> Result<PublicKey, CryptoError> {
        let secp = Secp256k1::new();
        let message = Message::from_digest(digest.0);
        let recoverable = self.to_recoverable()?;
        secp.recover_ecdsa(&message, &recoverable)
            .map(PublicKey::from_inner)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(")?;
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(data: &[u8]) -> Hash {
        Hash::compute(data)
    }

    #[test]
    fn sign_and_verify() {
        let key = PrivateKey::generate();
        let public = key.public_key();
        let hash = digest(b"message");

        let sig = key.sign(&hash);
        assert!(public.verify(&hash, &sig));
    }

    #[test]
    fn verify_fails_for_wrong_digest() {
        let key = PrivateKey::generate();
        let sig = key.sign(&digest(b"signed"));
        assert!(!key.public_key().verify(&digest(b"other"), &sig));
    }

    #[test]
    fn verify_fails_for_wrong_key() {
        let signer = PrivateKey::generate();
        let other = PrivateKey::generate();
        let hash = digest(b"message");

        let sig = signer.sign(&hash);
        assert!(!other.public_key().verify(&hash, &sig));
    }

    #[test]
    fn recover_returns_signer() {
        let key = PrivateKey::generate();
        let hash = digest(b"recover me");
        let sig = key.sign(&hash);

        let recovered = sig.recover(&hash).expect("recovery failed");
        assert_eq!(recovered, key.public_key());
        assert_eq!(recovered.address(), key.public_key().address());
    }

    #[test]
    fn private_key_roundtrip() {
        let key = PrivateKey::generate();
        let restored = PrivateKey::from_bytes(&key.to_bytes()).expect("valid scalar");
        assert_eq!(restored.public_key(), key.public_key());
    }

    #[test]
    fn public_key_codec_roundtrip() {
        let public = PrivateKey::generate().public_key();
        let encoded = public.to_bytes();
        assert_eq!(encoded.len(), PUBLIC_KEY_LEN);
        let decoded = PublicKey::from_bytes(encoded.as_slice()).expect("decode failed");
        assert_eq!(decoded, public);
        assert_eq!(decoded.address(), public.address());
    }

    #[test]
    fn public_key_decode_rejects_garbage() {
        let garbage = [0u8; PUBLIC_KEY_LEN];
        assert!(PublicKey::from_bytes(&garbage).is_err());
    }

    #[test]
    fn uncompressed_serialization_is_64_bytes() {
        let public = PrivateKey::generate().public_key();
        assert_eq!(public.serialize_uncompressed().len(), 64);
    }

    #[test]
    fn address_matches_manual_derivation() {
        let public = PrivateKey::generate().public_key();
        let manual = Address::from_public_key_bytes(&public.serialize());
        assert_eq!(public.address(), manual);
    }
}
