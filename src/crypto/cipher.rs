//! RSA and AES ciphers used for operator key material and sealed payloads.
//!
//! RSA uses OAEP padding over SHA-1; a key of `k` bytes can seal at most
//! `k - 42` bytes directly. Larger payloads go through the hybrid envelope:
//! a fresh AES key is RSA-sealed and the payload AES-encrypted.
//! AES runs in CBC mode with a random 16-byte IV prepended to the
//! ciphertext and PKCS7 padding.

use crate::crypto::CryptoError;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use zeroize::Zeroizing;

/// OAEP-SHA1 padding overhead in bytes.
const OAEP_OVERHEAD: usize = 42;

/// CBC initialization vector length.
pub const IV_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Generates a fresh RSA key pair of the given modulus size in bits.
pub fn generate_rsa_keys(bits: usize) -> Result<(RsaPublicKey, RsaPrivateKey), CryptoError> {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let public = RsaPublicKey::from(&private);
    Ok((public, private))
}

/// Largest plaintext the given public key can seal in one OAEP block.
pub fn max_encrypt_size(key: &RsaPublicKey) -> usize {
    use rsa::traits::PublicKeyParts;
    key.size().saturating_sub(OAEP_OVERHEAD)
}

/// Seals a message with RSA-OAEP(SHA-1).
///
/// The ciphertext length equals the key's modulus size.
pub fn rsa_encrypt(key: &RsaPublicKey, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let limit = max_encrypt_size(key);
    if message.len() > limit {
        return Err(CryptoError::MessageTooLong {
            actual: message.len(),
            limit,
        });
    }
    key.encrypt(&mut rand::thread_rng(), Oaep::new::<Sha1>(), message)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Opens an RSA-OAEP(SHA-1) ciphertext.
pub fn rsa_decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    key.decrypt(Oaep::new::<Sha1>(), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Supported AES key sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AesKeySize {
    K128,
    K256,
}

impl AesKeySize {
    fn byte_len(self) -> usize {
        match self {
            AesKeySize::K128 => 16,
            AesKeySize::K256 => 32,
        }
    }
}

/// Symmetric AES key for CBC encryption.
#[derive(Clone)]
pub struct AesKey {
    key: Zeroizing<Vec<u8>>,
}

impl AesKey {
    /// Generates a random key of the requested size.
    pub fn generate(size: AesKeySize) -> AesKey {
        let mut key = vec![0u8; size.byte_len()];
        rand::thread_rng().fill_bytes(&mut key);
        AesKey {
            key: Zeroizing::new(key),
        }
    }

    /// Wraps existing key bytes; only 16- and 32-byte keys are accepted.
    pub fn from_bytes(bytes: &[u8]) -> Result<AesKey, CryptoError> {
        match bytes.len() {
            16 | 32 => Ok(AesKey {
                key: Zeroizing::new(bytes.to_vec()),
            }),
            other => Err(CryptoError::InvalidKey(format!(
                "unsupported AES key length {other}"
            ))),
        }
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Encrypts data, returning `IV ++ ciphertext`.
    pub fn encrypt(&self, data: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        // Key and IV lengths are guaranteed by construction
        let ciphertext = match self.key.len() {
            16 => Aes128CbcEnc::new_from_slices(&self.key, &iv)
                .expect("validated key and iv lengths")
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            _ => Aes256CbcEnc::new_from_slices(&self.key, &iv)
                .expect("validated key and iv lengths")
                .encrypt_padded_vec_mut::<Pkcs7>(data),
        };

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Decrypts `IV ++ ciphertext` produced by [`AesKey::encrypt`].
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < IV_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let (iv, ciphertext) = data.split_at(IV_LEN);

        let result = match self.key.len() {
            16 => Aes128CbcDec::new_from_slices(&self.key, iv)
                .map_err(|_| CryptoError::DecryptionFailed)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            _ => Aes256CbcDec::new_from_slices(&self.key, iv)
                .map_err(|_| CryptoError::DecryptionFailed)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        };

        result.map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Seals a message of arbitrary length under an RSA public key.
///
/// Layout: `[u32 BE sealed-key length][RSA(aes key)][AES-CBC(message)]`.
pub fn encrypt_with_aes(key: &RsaPublicKey, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let aes = AesKey::generate(AesKeySize::K256);
    let sealed_key = rsa_encrypt(key, aes.as_bytes())?;
    let sealed_message = aes.encrypt(message);

    let mut out = Vec::with_capacity(4 + sealed_key.len() + sealed_message.len());
    out.extend_from_slice(&(sealed_key.len() as u32).to_be_bytes());
    out.extend_from_slice(&sealed_key);
    out.extend_from_slice(&sealed_message);
    Ok(out)
}

/// Opens an envelope produced by [`encrypt_with_aes`].
pub fn decrypt_with_aes(key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < 4 {
        return Err(CryptoError::DecryptionFailed);
    }
    let key_len = u32::from_be_bytes(data[..4].try_into().unwrap()) as usize;
    if data.len() < 4 + key_len {
        return Err(CryptoError::DecryptionFailed);
    }

    let aes_key_bytes = rsa_decrypt(key, &data[4..4 + key_len])?;
    let aes = AesKey::from_bytes(&aes_key_bytes)?;
    aes.decrypt(&data[4 + key_len..])
}
