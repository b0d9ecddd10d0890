//! # Collaborators
//!
//! The engine decides; other components act. Everything the origination
//! controller needs from the outside world comes through one of the traits
//! below:
//!
//! - **LoanCore** — the ledger of record. Loans, notes and nonces live there.
//! - **FeeController** — fee schedule and treasury.
//! - **AssetCustody** — moves fungible funds and collateral.
//! - **AssetView** — read-only balances and vault lookups, for verifiers.
//! - **ContractDirectory** — finds code deployed at an address: contract
//!   account signature validators and predicate verifiers.
//! - **Clock** — current unix time.
//!
//! All methods take `&self`. Implementations use interior mutability, which
//! is also what lets a misbehaving implementation try to call back into the
//! engine mid-operation.
//!
//! Contract code (validators and verifiers) is untrusted. Calls into it go
//! through [`guarded_call`], so a panic in third-party code surfaces as an
//! [`ExternalCallError`] instead of unwinding through the engine.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use pledge_protocol::crypto::Signature;
use pledge_protocol::loan::{LoanData, LoanId, LoanState, LoanTerms};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A call into contract code did not produce a usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalCallError {
    /// The callee reverted.
    #[error("call reverted: {0}")]
    Reverted(String),

    /// The callee returned data that does not decode.
    #[error("malformed return data: {0}")]
    MalformedReturn(String),

    /// The callee panicked.
    #[error("callee aborted")]
    Aborted,
}

/// The ledger of record refused an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("loan {0} does not exist")]
    LoanNotFound(LoanId),

    #[error("loan {loan_id} is {state}, expected Active")]
    LoanNotActive { loan_id: LoanId, state: LoanState },

    /// The nonce has been used up or cancelled.
    #[error("nonce {nonce} already used by {user}")]
    NonceUsed { user: Address, nonce: U256 },

    #[error("max uses must be at least 1")]
    InvalidMaxUses,

    /// Nothing to release: no use of the nonce is on record.
    #[error("nonce {nonce} of {user} has no recorded use")]
    NonceNotConsumed { user: Address, nonce: U256 },

    #[error("collateral {collateral}#{id} already backs an active loan")]
    CollateralInUse { collateral: Address, id: U256 },
}

/// Custody refused to move an asset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    #[error("{owner} holds {available} of {token}, needs {required}")]
    InsufficientBalance {
        token: Address,
        owner: Address,
        required: U256,
        available: U256,
    },

    #[error("{from} does not own {collateral}#{id}")]
    NotOwner {
        collateral: Address,
        id: U256,
        from: Address,
    },

    #[error("{operator} is not approved to move {collateral}#{id}")]
    NotApproved {
        collateral: Address,
        id: U256,
        operator: Address,
    },

    /// A collateral permit was expired, malformed or signed by someone else.
    #[error("collateral permit rejected: {0}")]
    PermitRejected(String),
}

// ---------------------------------------------------------------------------
// Ledger of record
// ---------------------------------------------------------------------------

/// Everything the ledger needs to replace one loan with another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverEntry {
    pub old_loan_id: LoanId,
    pub borrower: Address,
    pub lender: Address,
    pub terms: LoanTerms,
    /// Total collected by the engine to close the old loan.
    pub settled_amount: U256,
    pub amount_to_old_lender: U256,
    pub amount_to_lender: U256,
    pub amount_to_borrower: U256,
}

/// Ledger of record for loans, promissory notes and signature nonces.
pub trait LoanCore: Send + Sync {
    /// Account that holds collateral while a loan is open.
    fn custodian(&self) -> Address;

    fn get_loan(&self, loan_id: LoanId) -> Result<LoanData, LedgerError>;

    /// Current holder of the borrower note.
    fn borrower_of(&self, loan_id: LoanId) -> Result<Address, LedgerError>;

    /// Current holder of the lender note.
    fn lender_of(&self, loan_id: LoanId) -> Result<Address, LedgerError>;

    /// Record one use of `(user, nonce)`. Fails once `max_uses` is reached.
    fn consume_nonce(&self, user: Address, nonce: U256, max_uses: u64) -> Result<(), LedgerError>;

    /// Take back one use recorded by [`LoanCore::consume_nonce`] when the
    /// operation that consumed it did not complete.
    fn release_nonce(&self, user: Address, nonce: U256) -> Result<(), LedgerError>;

    fn start_loan(
        &self,
        lender: Address,
        borrower: Address,
        terms: &LoanTerms,
    ) -> Result<LoanId, LedgerError>;

    /// Close `entry.old_loan_id` and open a loan on the new terms.
    fn rollover(&self, entry: &RolloverEntry) -> Result<LoanId, LedgerError>;
}

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

pub trait FeeController: Send + Sync {
    fn origination_fee_bps(&self) -> u64;
    fn rollover_fee_bps(&self) -> u64;
    /// Account that receives protocol fees.
    fn treasury(&self) -> Address;
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Moves assets on the engine's instruction.
pub trait AssetCustody: Send + Sync {
    fn transfer_erc20(
        &self,
        currency: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CustodyError>;

    /// Move collateral `id` from `from` to `to`. `operator` must own it or be
    /// approved for it.
    fn transfer_collateral(
        &self,
        operator: Address,
        collateral: Address,
        id: U256,
        from: Address,
        to: Address,
    ) -> Result<(), CustodyError>;

    /// Apply an owner-signed approval of `spender` for collateral `id`.
    fn permit_collateral(
        &self,
        collateral: Address,
        id: U256,
        owner: Address,
        spender: Address,
        deadline: u64,
        signature: &Signature,
    ) -> Result<(), CustodyError>;
}

/// Read-only asset state, as seen by predicate verifiers.
pub trait AssetView: Send + Sync {
    /// Vault deployed by `factory` under token id `id`, if any.
    fn instance_at(&self, factory: Address, id: U256) -> Option<Address>;

    fn owner_of(&self, token: Address, id: U256) -> Option<Address>;

    fn erc721_balance_of(&self, token: Address, owner: Address) -> U256;

    fn erc1155_balance_of(&self, token: Address, owner: Address, id: U256) -> U256;

    fn erc20_balance_of(&self, token: Address, owner: Address) -> U256;
}

// ---------------------------------------------------------------------------
// Contract code
// ---------------------------------------------------------------------------

/// Code at a contract account that can vouch for signatures (ERC-1271).
pub trait ContractSignatureValidator: Send + Sync {
    /// Raw return data of `isValidSignature(digest, signature)`.
    fn is_valid_signature(&self, digest: B256, signature: &[u8])
        -> Result<Vec<u8>, ExternalCallError>;
}

/// The facts a predicate is checked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateContext {
    pub borrower: Address,
    pub lender: Address,
    pub collateral_address: Address,
    pub collateral_id: U256,
}

/// Code that decides whether collateral satisfies a signed predicate.
pub trait PredicateVerifier: Send + Sync {
    fn verify(&self, context: &PredicateContext, data: &[u8]) -> Result<bool, ExternalCallError>;
}

/// Looks up code deployed at an address.
pub trait ContractDirectory: Send + Sync {
    /// `None` when `account` is not a contract or has no validator.
    fn signature_validator(&self, account: Address) -> Option<Arc<dyn ContractSignatureValidator>>;

    /// `None` when nothing is deployed at `verifier`.
    fn predicate_verifier(&self, verifier: Address) -> Option<Arc<dyn PredicateVerifier>>;
}

/// Run untrusted contract code, turning a panic into [`ExternalCallError::Aborted`].
pub fn guarded_call<T>(
    call: impl FnOnce() -> Result<T, ExternalCallError>,
) -> Result<T, ExternalCallError> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or(Err(ExternalCallError::Aborted))
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

pub trait Clock: Send + Sync {
    /// Seconds since the unix epoch.
    fn now(&self) -> u64;
}
