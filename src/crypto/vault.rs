//! On-disk RSA key vault.
//!
//! Two PEM files under the configured key directory hold the node
//! operator's RSA pair. They are loaded once per process; a missing pair is
//! generated and written on first start.

use crate::crypto::{cipher, CryptoError};
use crate::info;
use crate::types::address::Address;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the public half.
const PUBLIC_KEY_FILE: &str = "public.pem";
/// File name of the private half.
const PRIVATE_KEY_FILE: &str = "private.pem";
/// Modulus size for generated pairs.
const GENERATED_KEY_BITS: usize = 2048;

/// The node's long-lived RSA key pair.
pub struct KeyVault {
    public: RsaPublicKey,
    private: RsaPrivateKey,
    node_address: Address,
}

impl KeyVault {
    /// Loads the vault from `keys_dir`, generating a fresh pair if absent.
    pub fn open(keys_dir: &Path) -> Result<KeyVault, CryptoError> {
        let public_path = keys_dir.join(PUBLIC_KEY_FILE);
        let private_path = keys_dir.join(PRIVATE_KEY_FILE);

        let (public, private) = if public_path.exists() && private_path.exists() {
            (
                Self::load_public(&public_path)?,
                Self::load_private(&private_path)?,
            )
        } else {
            info!("no key pair found, generating a new one");
            let (public, private) = cipher::generate_rsa_keys(GENERATED_KEY_BITS)?;
            Self::save(&public, &private, &public_path, &private_path)?;
            (public, private)
        };

        let node_address = Self::derive_address(&public)?;
        Ok(KeyVault {
            public,
            private,
            node_address,
        })
    }

    /// Returns the public half.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Returns the private half.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// The address this node signs blocks for (its coinbase).
    pub fn node_address(&self) -> Address {
        self.node_address
    }

    fn derive_address(public: &RsaPublicKey) -> Result<Address, CryptoError> {
        let der = public
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Address::from_public_key_bytes(der.as_bytes()))
    }

    fn load_public(path: &PathBuf) -> Result<RsaPublicKey, CryptoError> {
        let pem = fs::read_to_string(path).map_err(|e| CryptoError::Storage(e.to_string()))?;
        RsaPublicKey::from_public_key_pem(&pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    fn load_private(path: &PathBuf) -> Result<RsaPrivateKey, CryptoError> {
        let pem = fs::read_to_string(path).map_err(|e| CryptoError::Storage(e.to_string()))?;
        RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    fn save(
        public: &RsaPublicKey,
        private: &RsaPrivateKey,
        public_path: &PathBuf,
        private_path: &PathBuf,
    ) -> Result<(), CryptoError> {
        if let Some(parent) = public_path.parent() {
            fs::create_dir_all(parent).map_err(|e| CryptoError::Storage(e.to_string()))?;
        }

        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        fs::write(public_path, public_pem).map_err(|e| CryptoError::Storage(e.to_string()))?;

        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        fs::write(private_path, private_pem.as_bytes())
            .map_err(|e| CryptoError::Storage(e.to_string()))?;

        info!("key pair written to {}", public_path.display());
        Ok(())
    }
}
