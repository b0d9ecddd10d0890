//! Loan value types shared by the hasher, the validator and the engine.
//!
//! Everything here is a plain value: constructed from a proposal, checked,
//! hashed, and dropped at the end of the call. Nothing in this file owns state.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the ledger of record assigns to a loan.
pub type LoanId = u64;

/// The terms two counterparties agree on before either of them touches a
/// transaction. Immutable once signed: any change invalidates the signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Length of the loan in seconds.
    pub duration_secs: u64,
    /// Amount lent, in the payable currency's smallest unit.
    pub principal: U256,
    /// Interest over the full term, fixed point with `1e18 == 1%`.
    pub interest_rate: U256,
    /// Contract of the collateral token (or vault factory, for bundles).
    pub collateral_address: Address,
    /// Token id of the collateral within `collateral_address`.
    pub collateral_id: U256,
    /// Fungible token the loan is denominated in.
    pub payable_currency: Address,
    /// Unix timestamp after which the proposal is void.
    pub deadline: u64,
    /// Free-form tag for referral attribution. Signed like every other field.
    #[serde(default)]
    pub affiliate_code: B256,
}

/// Replay controls attached to a signature. Nonce storage belongs to the
/// ledger of record; the engine only forwards consumption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigProperties {
    /// Signer-chosen nonce.
    pub nonce: U256,
    /// How many loans the same `(signer, nonce)` may originate.
    pub max_uses: u64,
}

impl SigProperties {
    /// A single-use nonce, the common case.
    pub fn single_use(nonce: u64) -> Self {
        Self {
            nonce: U256::from(nonce),
            max_uses: 1,
        }
    }
}

/// Which role a signature authorizes.
///
/// Never taken from the signer: the engine infers it from who submits the
/// transaction and hashes it into the digest, so a borrower's signature can
/// never be replayed as a lender's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Signed by (or for) the borrower.
    Borrow,
    /// Signed by (or for) the lender.
    Lend,
}

impl Side {
    /// Value hashed into the typed-data digest (`uint8`).
    pub fn as_u8(self) -> u8 {
        match self {
            Side::Borrow => 0,
            Side::Lend => 1,
        }
    }

    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            Side::Borrow => Side::Lend,
            Side::Lend => Side::Borrow,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Borrow => write!(f, "borrow"),
            Side::Lend => write!(f, "lend"),
        }
    }
}

/// A rule over collateral contents, evaluated by the verifier at `verifier`.
///
/// `data` is opaque to the engine. Only the named verifier interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// Address of the verifier contract.
    pub verifier: Address,
    /// Verifier-specific payload.
    pub data: Bytes,
}

/// Lifecycle of a loan as recorded by the ledger of record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanState {
    /// Principal is out, collateral is held.
    Active,
    /// Closed by repayment or replaced by a rollover.
    Repaid,
    /// Collateral claimed by the lender.
    Defaulted,
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanState::Active => write!(f, "Active"),
            LoanState::Repaid => write!(f, "Repaid"),
            LoanState::Defaulted => write!(f, "Defaulted"),
        }
    }
}

/// What the ledger of record knows about an existing loan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanData {
    /// Current lifecycle state.
    pub state: LoanState,
    /// The terms the loan was originated with.
    pub terms: LoanTerms,
    /// Unix timestamp of origination.
    pub start_date: u64,
    /// Outstanding principal.
    pub balance: U256,
    /// Interest already paid against this loan.
    #[serde(default)]
    pub interest_amount_paid: U256,
}

impl LoanData {
    /// A freshly started loan with nothing repaid.
    pub fn active(terms: LoanTerms, start_date: u64) -> Self {
        let balance = terms.principal;
        Self {
            state: LoanState::Active,
            terms,
            start_date,
            balance,
            interest_amount_paid: U256::ZERO,
        }
    }
}
