//! # Signature Recovery
//!
//! secp256k1 ECDSA recovery, the way externally-owned accounts authorize
//! a proposal.
//!
//! A [`Signature`] carries `(v, r, s)` plus an optional `extra_data` suffix.
//! The suffix exists for contract-account signers, which receive the packed
//! bytes `r ‖ s ‖ v ‖ extra_data` and may use the tail for their own
//! scheme. Recovery here only ever looks at `(v, r, s)`, so a suffix glued
//! onto an EOA signature changes nothing.
//!
//! ## Strictness
//!
//! Recovery fails closed. Any of the following yields no signer at all,
//! never the zero address and never a guess:
//!
//! - `v` outside `{0, 1, 27, 28}`
//! - `r` or `s` equal to zero or outside the curve order
//! - `s` in the upper half of the order (the malleable twin)
//! - a point that doesn't recover

use alloy_primitives::{Address, Bytes, B256, U256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::keys::address_of;
use crate::config::SECP256K1_HALF_ORDER;

/// Why a signature did not recover.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("invalid recovery byte v={0}")]
    InvalidV(u8),

    #[error("signature s value is in the upper half of the curve order")]
    HighS,

    #[error("invalid signature scalars")]
    InvalidScalars,

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("invalid signature length: expected at least 65 bytes, got {0}")]
    InvalidLength(usize),
}

/// An ECDSA signature as submitted alongside a proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Recovery byte, conventionally 27 or 28.
    pub v: u8,
    /// `r` scalar.
    pub r: B256,
    /// `s` scalar.
    pub s: B256,
    /// Appended only when a contract account validates the signature.
    #[serde(default)]
    pub extra_data: Bytes,
}

impl Signature {
    /// Build a signature with no suffix.
    pub fn new(v: u8, r: B256, s: B256) -> Self {
        Self {
            v,
            r,
            s,
            extra_data: Bytes::new(),
        }
    }

    /// Attach a suffix for a contract-account signer.
    pub fn with_extra_data(mut self, extra_data: impl Into<Bytes>) -> Self {
        self.extra_data = extra_data.into();
        self
    }

    /// Parse `r ‖ s ‖ v [‖ extra_data]`.
    pub fn from_packed(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() < 65 {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }
        Ok(Self {
            v: bytes[64],
            r: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..64]),
            extra_data: Bytes::copy_from_slice(&bytes[65..]),
        })
    }

    /// The bytes handed to a contract-account validator:
    /// `r ‖ s ‖ v ‖ extra_data`.
    pub fn packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(65 + self.extra_data.len());
        out.extend_from_slice(self.r.as_slice());
        out.extend_from_slice(self.s.as_slice());
        out.push(self.v);
        out.extend_from_slice(&self.extra_data);
        out
    }

    /// Recovery id after normalising Ethereum's `27/28` convention.
    fn recovery_id(&self) -> Result<RecoveryId, SignatureError> {
        let parity = match self.v {
            0 | 1 => self.v,
            27 | 28 => self.v - 27,
            other => return Err(SignatureError::InvalidV(other)),
        };
        RecoveryId::from_byte(parity).ok_or(SignatureError::InvalidV(self.v))
    }
}

/// Recover the signer of `digest`, explaining any failure.
pub fn try_recover(digest: B256, signature: &Signature) -> Result<Address, SignatureError> {
    let recovery_id = signature.recovery_id()?;

    if U256::from_be_bytes(signature.s.0) > SECP256K1_HALF_ORDER {
        return Err(SignatureError::HighS);
    }

    let ecdsa = EcdsaSignature::from_scalars(signature.r.0, signature.s.0)
        .map_err(|_| SignatureError::InvalidScalars)?;

    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &ecdsa, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    let address = address_of(&key);
    if address == Address::ZERO {
        return Err(SignatureError::RecoveryFailed);
    }
    Ok(address)
}

/// Recover the signer of `digest`, or `None` if the signature is malformed.
///
/// `None` is never an authorization. Callers that accept contract-account
/// signatures fall back to asking the contract; everyone else rejects.
pub fn recover(digest: B256, signature: &Signature) -> Option<Address> {
    match try_recover(digest, signature) {
        Ok(address) => Some(address),
        Err(err) => {
            tracing::debug!(%digest, error = %err, "signature did not recover");
            None
        }
    }
}
