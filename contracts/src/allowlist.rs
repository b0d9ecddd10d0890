//! # Allow-Lists
//!
//! Admin-curated sets of addresses: payable currencies, collateral contracts
//! and predicate verifiers. Membership is checked on every proposal, so a
//! removal takes effect for proposals that were signed before it.
//!
//! Batch mutations are all-or-nothing. The whole batch is checked before any
//! member changes, and a batch must carry between 1 and
//! [`MAX_BATCH_ELEMENTS`] addresses.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use alloy_primitives::Address;
use pledge_protocol::config::MAX_BATCH_ELEMENTS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An administrative mutation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    /// Only the configured admin may mutate allow-lists.
    #[error("{0} is not the admin")]
    NotAdmin(Address),

    #[error("batch is empty")]
    ZeroArrayElements,

    #[error("batch of {len} exceeds the limit of {max}")]
    ArrayTooManyElements { len: usize, max: usize },

    #[error("batch has {addresses} addresses but {flags} flags")]
    BatchLengthMismatch { addresses: usize, flags: usize },

    #[error("zero address in {0} batch")]
    ZeroAddress(ListKind),

    #[error("{address} is already an allowed {kind}")]
    AlreadyAllowed { kind: ListKind, address: Address },

    #[error("{address} is not an allowed {kind}")]
    DoesNotExist { kind: ListKind, address: Address },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which list a set of addresses belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Currency,
    Collateral,
    Verifier,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKind::Currency => write!(f, "currency"),
            ListKind::Collateral => write!(f, "collateral"),
            ListKind::Verifier => write!(f, "verifier"),
        }
    }
}

/// A set of allowed addresses of one kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    kind: ListKind,
    members: BTreeSet<Address>,
}

/// Batch size must be in `1..=MAX_BATCH_ELEMENTS`.
pub fn check_batch_len(len: usize) -> Result<(), AdminError> {
    if len == 0 {
        return Err(AdminError::ZeroArrayElements);
    }
    if len > MAX_BATCH_ELEMENTS {
        return Err(AdminError::ArrayTooManyElements {
            len,
            max: MAX_BATCH_ELEMENTS,
        });
    }
    Ok(())
}

impl AllowList {
    pub fn new(kind: ListKind) -> Self {
        Self {
            kind,
            members: BTreeSet::new(),
        }
    }

    /// A list seeded from configuration. Zero addresses are refused.
    pub fn seeded(kind: ListKind, addresses: &[Address]) -> Result<Self, AdminError> {
        let mut list = Self::new(kind);
        for &address in addresses {
            if address == Address::ZERO {
                return Err(AdminError::ZeroAddress(kind));
            }
            list.members.insert(address);
        }
        Ok(list)
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    pub fn contains(&self, address: Address) -> bool {
        self.members.contains(&address)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &Address> {
        self.members.iter()
    }

    /// Set membership of each address to the paired flag.
    ///
    /// Setting an address to the state it is already in is not an error.
    pub fn set(&mut self, addresses: &[Address], allowed: &[bool]) -> Result<(), AdminError> {
        check_batch_len(addresses.len())?;
        if addresses.len() != allowed.len() {
            return Err(AdminError::BatchLengthMismatch {
                addresses: addresses.len(),
                flags: allowed.len(),
            });
        }
        self.reject_zero(addresses)?;

        for (&address, &flag) in addresses.iter().zip(allowed) {
            if flag {
                self.members.insert(address);
            } else {
                self.members.remove(&address);
            }
        }
        Ok(())
    }

    /// Add every address. Fails if any is already a member or repeats.
    pub fn allow(&mut self, addresses: &[Address]) -> Result<(), AdminError> {
        check_batch_len(addresses.len())?;
        self.reject_zero(addresses)?;

        let mut seen = HashSet::with_capacity(addresses.len());
        for &address in addresses {
            if self.members.contains(&address) || !seen.insert(address) {
                return Err(AdminError::AlreadyAllowed {
                    kind: self.kind,
                    address,
                });
            }
        }

        self.members.extend(addresses.iter().copied());
        Ok(())
    }

    /// Remove every address. Fails if any is not a member or repeats.
    pub fn remove(&mut self, addresses: &[Address]) -> Result<(), AdminError> {
        check_batch_len(addresses.len())?;
        self.reject_zero(addresses)?;

        let mut seen = HashSet::with_capacity(addresses.len());
        for &address in addresses {
            if !self.members.contains(&address) || !seen.insert(address) {
                return Err(AdminError::DoesNotExist {
                    kind: self.kind,
                    address,
                });
            }
        }

        for address in addresses {
            self.members.remove(address);
        }
        Ok(())
    }

    fn reject_zero(&self, addresses: &[Address]) -> Result<(), AdminError> {
        if addresses.contains(&Address::ZERO) {
            return Err(AdminError::ZeroAddress(self.kind));
        }
        Ok(())
    }
}
