//! # Key Management
//!
//! secp256k1 keys for local signing: test fixtures, the CLI's `sign`
//! command, and off-line proposal tooling. The engine itself never holds a
//! private key; it only recovers addresses.
//!
//! ## Security considerations
//!
//! - Key generation uses `OsRng`.
//! - Key bytes are never logged or serialized. `LocalSigner` deliberately has
//!   no `Serialize` impl and a redacted `Debug`.

use alloy_primitives::{Address, B256};
use k256::ecdsa::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::hash::keccak256;
use super::signatures::Signature;

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: not a valid secp256k1 scalar")]
    InvalidSecretKey,

    #[error("invalid hex encoding for secret key")]
    InvalidHex,

    #[error("signing failed")]
    SigningFailed,
}

/// Ethereum address of a public key: the last 20 bytes of
/// `keccak256(uncompressed_point[1..])`.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// A secp256k1 private key that signs typed-data digests.
#[derive(Clone)]
pub struct LocalSigner {
    signing_key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Load a key from 32 raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Load a key from hex, with or without a `0x` prefix.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let raw = hex::decode(hex_str.trim().trim_start_matches("0x"))
            .map_err(|_| KeyError::InvalidHex)?;
        let bytes: [u8; 32] = raw.try_into().map_err(|_| KeyError::InvalidSecretKey)?;
        Self::from_bytes(&bytes)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_of(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// The address this key signs as.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest. Produces a low-`s` signature with `v ∈ {27, 28}`.
    pub fn sign_digest(&self, digest: B256) -> Result<Signature, KeyError> {
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|_| KeyError::SigningFailed)?;
        let bytes = sig.to_bytes();
        Ok(Signature::new(
            27 + recovery_id.to_byte(),
            B256::from_slice(&bytes[..32]),
            B256::from_slice(&bytes[32..]),
        ))
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
