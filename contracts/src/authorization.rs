//! # Counterparty Authorization
//!
//! Decides whether the account submitting a proposal and the account that
//! signed it are legitimate, opposing representatives of the two sides of a
//! loan.
//!
//! ## Roles
//!
//! Every proposal names a borrower and a lender. One of them (or a delegate)
//! signs, the other (or a delegate) submits. The signing side is never taken
//! from the signer; it is inferred from who is calling:
//!
//! ```text
//!   caller is borrower or borrower's delegate  →  lender side must have signed
//!   anyone else                                →  borrower side must have signed
//! ```
//!
//! ## Checks, in order
//!
//! 1. Self-deal: the signer is the caller, or the caller is the signing
//!    principal itself.
//! 2. Caller legitimacy: the caller is the calling principal or its delegate,
//!    or the calling principal is a contract that accepts the signature.
//! 3. Signer legitimacy: the signer is the signing principal or its delegate,
//!    or the signing principal is a contract that accepts the signature.
//! 4. Side mismatch: the signer is the calling principal.
//!
//! ## Contract accounts
//!
//! A counterparty with code is asked (ERC-1271) whether it stands behind the
//! digest. The answer is tri-state. Only an exact magic-value return counts as
//! acceptance. A revert, a short or malformed return, or a panic in the
//! validator is [`ContractVerdict::Indeterminate`], which authorizes nothing.

use alloy_primitives::{Address, B256};
use pledge_protocol::config::ERC1271_MAGIC_VALUE;
use pledge_protocol::crypto::Signature;
use pledge_protocol::loan::Side;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::approvals::ApprovalRelation;
use crate::collaborators::{guarded_call, ContractDirectory};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A proposal's counterparties did not check out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// The caller is trying to accept its own side's proposal.
    #[error("{0} cannot approve its own loan")]
    ApprovedOwnLoan(Address),

    /// The caller does not represent the calling side.
    #[error("{0} is not a participant in this loan")]
    CallerNotParticipant(Address),

    /// Nobody entitled to sign for the signing side produced this signature.
    #[error("invalid signature for {signing_counterparty} (recovered {signer:?})")]
    InvalidSignature {
        signing_counterparty: Address,
        signer: Option<Address>,
    },

    /// The signature came from the calling side.
    #[error("signature from {0} belongs to the calling side")]
    SideMismatch(Address),

    #[error("{0} cannot approve itself")]
    SelfApprove(Address),

    /// The borrower's collateral permit was refused by the collateral contract.
    #[error("collateral permit rejected: {0}")]
    InvalidCollateralPermit(String),
}

// ---------------------------------------------------------------------------
// Contract signature oracle
// ---------------------------------------------------------------------------

/// Outcome of asking a contract account about a signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractVerdict {
    /// Returned the magic value.
    Accepted,
    /// Not a contract, or answered with something other than the magic value.
    Rejected,
    /// The call failed.
    Indeterminate,
}

impl ContractVerdict {
    pub fn is_accepted(self) -> bool {
        self == ContractVerdict::Accepted
    }
}

/// Return data must be one ABI word holding the left-aligned magic value.
fn is_magic_word(data: &[u8]) -> bool {
    data.len() >= 32 && data[..4] == ERC1271_MAGIC_VALUE && data[4..32].iter().all(|&b| b == 0)
}

/// Ask `account` whether it accepts `signature` over `digest`.
///
/// The validator receives `r ‖ s ‖ v ‖ extra_data`.
pub fn contract_signature_verdict(
    contracts: &dyn ContractDirectory,
    account: Address,
    digest: B256,
    signature: &Signature,
) -> ContractVerdict {
    let Some(validator) = contracts.signature_validator(account) else {
        return ContractVerdict::Rejected;
    };

    let packed = signature.packed();
    match guarded_call(|| validator.is_valid_signature(digest, &packed)) {
        Ok(data) if is_magic_word(&data) => ContractVerdict::Accepted,
        Ok(data) => {
            debug!(%account, len = data.len(), "contract signature rejected");
            ContractVerdict::Rejected
        }
        Err(e) => {
            warn!(%account, error = %e, "contract signature check failed");
            ContractVerdict::Indeterminate
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// The two principals named by a proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparties {
    pub borrower: Address,
    pub lender: Address,
}

impl Counterparties {
    /// The principal on `side`.
    pub fn on(&self, side: Side) -> Address {
        match side {
            Side::Borrow => self.borrower,
            Side::Lend => self.lender,
        }
    }
}

/// A proposal whose counterparties check out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub signing_side: Side,
    /// Principal on the signing side. Nonces are consumed against it.
    pub signing_counterparty: Address,
    /// Principal on the submitting side.
    pub calling_counterparty: Address,
}

/// Applies the counterparty rules against one snapshot of approvals.
pub struct AuthorizationResolver<'a> {
    approvals: &'a ApprovalRelation,
    contracts: &'a dyn ContractDirectory,
}

impl<'a> AuthorizationResolver<'a> {
    pub fn new(approvals: &'a ApprovalRelation, contracts: &'a dyn ContractDirectory) -> Self {
        Self {
            approvals,
            contracts,
        }
    }

    /// Side that must have signed, given who is calling.
    pub fn signing_side(&self, borrower: Address, caller: Address) -> Side {
        if self.approvals.is_self_or_approved(borrower, caller) {
            Side::Lend
        } else {
            Side::Borrow
        }
    }

    /// `account` is `target`, a delegate of `target`, or `target` is a contract
    /// that accepts the signature.
    pub fn is_self_or_approved_or_contract(
        &self,
        target: Address,
        account: Option<Address>,
        signature: &Signature,
        digest: B256,
    ) -> bool {
        if account.is_some_and(|a| self.approvals.is_self_or_approved(target, a)) {
            return true;
        }
        contract_signature_verdict(self.contracts, target, digest, signature).is_accepted()
    }

    /// Check `caller` and the recovered `signer` against the proposal.
    ///
    /// `digest` must have been built for `signing_side(parties.borrower, caller)`.
    pub fn resolve(
        &self,
        parties: Counterparties,
        caller: Address,
        signer: Option<Address>,
        signature: &Signature,
        digest: B256,
    ) -> Result<Resolution, AuthorizationError> {
        let signing_side = self.signing_side(parties.borrower, caller);
        let signing_counterparty = parties.on(signing_side);
        let calling_counterparty = parties.on(signing_side.opposite());

        if signer == Some(caller) || caller == signing_counterparty {
            return Err(AuthorizationError::ApprovedOwnLoan(caller));
        }

        if !self.is_self_or_approved_or_contract(calling_counterparty, Some(caller), signature, digest)
        {
            return Err(AuthorizationError::CallerNotParticipant(caller));
        }

        if !self.is_self_or_approved_or_contract(signing_counterparty, signer, signature, digest) {
            return Err(AuthorizationError::InvalidSignature {
                signing_counterparty,
                signer,
            });
        }

        if signer == Some(calling_counterparty) {
            return Err(AuthorizationError::SideMismatch(calling_counterparty));
        }

        debug!(
            %caller,
            %signing_counterparty,
            side = %signing_side,
            "counterparties authorized"
        );

        Ok(Resolution {
            signing_side,
            signing_counterparty,
            calling_counterparty,
        })
    }
}
