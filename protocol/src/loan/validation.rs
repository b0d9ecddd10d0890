//! # Term Validation
//!
//! Protocol-level bounds on proposed loan terms. This runs before any
//! signature work on every origination and every rollover, always against the
//! *new* terms, and stops at the first violated bound.
//!
//! Check order is fixed so the same bad proposal always reports the same
//! error:
//!
//! 1. principal ≥ configured minimum
//! 2. duration within `[MIN_LOAN_DURATION_SECS, MAX_LOAN_DURATION_SECS]`
//! 3. interest rate within `[MIN_INTEREST_RATE, MAX_INTEREST_RATE]`
//! 4. deadline not in the past
//! 5. payable currency allow-listed
//! 6. collateral allow-listed

use alloy_primitives::{Address, U256};
use thiserror::Error;

use super::types::LoanTerms;
use crate::config::{
    MAX_INTEREST_RATE, MAX_LOAN_DURATION_SECS, MIN_INTEREST_RATE, MIN_LOAN_DURATION_SECS,
};

/// A proposal failed protocol bounds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TermsError {
    #[error("principal {principal} is below the minimum of {minimum}")]
    PrincipalTooLow { principal: U256, minimum: U256 },

    #[error("loan duration {0}s is outside the allowed range")]
    InvalidLoanDuration(u64),

    #[error("interest rate {0} is outside the allowed range")]
    InvalidInterestRate(U256),

    #[error("proposal expired at {deadline} (now {now})")]
    SignatureIsExpired { deadline: u64, now: u64 },

    #[error("payable currency {0} is not allowed")]
    InvalidCurrency(Address),

    #[error("collateral {0} is not allowed")]
    InvalidCollateral(Address),

    #[error("rollover changes the payable currency from {old} to {new}")]
    RolloverCurrencyMismatch { old: Address, new: Address },

    #[error("rollover changes the collateral from {old_address}#{old_id} to {new_address}#{new_id}")]
    RolloverCollateralMismatch {
        old_address: Address,
        old_id: U256,
        new_address: Address,
        new_id: U256,
    },
}

/// Read access to the currency and collateral allow-lists.
pub trait TermsAllowList {
    /// Whether loans may be denominated in `currency`.
    fn is_currency_allowed(&self, currency: Address) -> bool;
    /// Whether `collateral` may back a loan.
    fn is_collateral_allowed(&self, collateral: Address) -> bool;
}

/// Checks the numeric bounds only. No clock, no allow-lists.
pub fn validate_bounds(terms: &LoanTerms, min_principal: U256) -> Result<(), TermsError> {
    if terms.principal < min_principal {
        return Err(TermsError::PrincipalTooLow {
            principal: terms.principal,
            minimum: min_principal,
        });
    }

    if terms.duration_secs < MIN_LOAN_DURATION_SECS || terms.duration_secs > MAX_LOAN_DURATION_SECS
    {
        return Err(TermsError::InvalidLoanDuration(terms.duration_secs));
    }

    if terms.interest_rate < MIN_INTEREST_RATE || terms.interest_rate > MAX_INTEREST_RATE {
        return Err(TermsError::InvalidInterestRate(terms.interest_rate));
    }

    Ok(())
}

/// Full validation of a proposal at time `now`.
pub fn validate_loan_terms<A: TermsAllowList + ?Sized>(
    terms: &LoanTerms,
    now: u64,
    min_principal: U256,
    allow: &A,
) -> Result<(), TermsError> {
    validate_bounds(terms, min_principal)?;

    if terms.deadline < now {
        return Err(TermsError::SignatureIsExpired {
            deadline: terms.deadline,
            now,
        });
    }

    if !allow.is_currency_allowed(terms.payable_currency) {
        return Err(TermsError::InvalidCurrency(terms.payable_currency));
    }

    if !allow.is_collateral_allowed(terms.collateral_address) {
        return Err(TermsError::InvalidCollateral(terms.collateral_address));
    }

    Ok(())
}

/// A rollover must keep the collateral and currency of the loan it replaces.
///
/// The collateral never leaves custody during a rollover, so the id must match
/// even for items proposals, where the signer committed to predicates rather
/// than to the id.
pub fn validate_rollover(old: &LoanTerms, new: &LoanTerms) -> Result<(), TermsError> {
    if old.payable_currency != new.payable_currency {
        return Err(TermsError::RolloverCurrencyMismatch {
            old: old.payable_currency,
            new: new.payable_currency,
        });
    }

    if old.collateral_address != new.collateral_address || old.collateral_id != new.collateral_id {
        return Err(TermsError::RolloverCollateralMismatch {
            old_address: old.collateral_address,
            old_id: old.collateral_id,
            new_address: new.collateral_address,
            new_id: new.collateral_id,
        });
    }

    Ok(())
}
