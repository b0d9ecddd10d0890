//! # Collateral Predicates
//!
//! Items proposals commit to a list of predicates rather than to a single
//! collateral id. At origination each predicate is handed to its verifier
//! together with the collateral actually on offer, and every one must pass.
//!
//! The verifier list is read from the same snapshot as the rest of the
//! authorization, so a verifier removed from the allow-list fails any proposal
//! still naming it.

use alloy_primitives::{Address, U256};
use pledge_protocol::loan::Predicate;
use thiserror::Error;
use tracing::{debug, warn};

use crate::allowlist::AllowList;
use crate::collaborators::{guarded_call, ContractDirectory, PredicateContext};

/// Collateral did not satisfy a signed predicate list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredicateError {
    /// An empty list would authorize any collateral at all.
    #[error("predicate list is empty")]
    PredicatesArrayEmpty,

    #[error("verifier {0} is not allowed")]
    InvalidVerifier(Address),

    #[error("predicate at index {index} (verifier {verifier}) failed for {collateral_address}#{collateral_id}")]
    PredicateFailed {
        index: usize,
        verifier: Address,
        collateral_address: Address,
        collateral_id: U256,
    },
}

/// Run every predicate against `context`. Stops at the first failure.
pub fn verify_predicates(
    verifiers: &AllowList,
    contracts: &dyn ContractDirectory,
    context: &PredicateContext,
    predicates: &[Predicate],
) -> Result<(), PredicateError> {
    if predicates.is_empty() {
        return Err(PredicateError::PredicatesArrayEmpty);
    }

    for (index, predicate) in predicates.iter().enumerate() {
        if !verifiers.contains(predicate.verifier) {
            return Err(PredicateError::InvalidVerifier(predicate.verifier));
        }

        let failed = PredicateError::PredicateFailed {
            index,
            verifier: predicate.verifier,
            collateral_address: context.collateral_address,
            collateral_id: context.collateral_id,
        };

        // Allowed but nothing deployed there: treated like a call into an
        // empty account, which cannot return true.
        let Some(verifier) = contracts.predicate_verifier(predicate.verifier) else {
            warn!(verifier = %predicate.verifier, "allowed verifier has no code");
            return Err(failed);
        };

        match guarded_call(|| verifier.verify(context, &predicate.data)) {
            Ok(true) => {}
            Ok(false) => {
                debug!(index, verifier = %predicate.verifier, "predicate not satisfied");
                return Err(failed);
            }
            Err(e) => {
                warn!(index, verifier = %predicate.verifier, error = %e, "predicate verifier failed");
                return Err(failed);
            }
        }
    }

    Ok(())
}
