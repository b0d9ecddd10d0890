//! Top-level error for engine entry points.
//!
//! Each concern keeps its own enum. `OriginationError` only wraps them, so a
//! caller can match on the concern first and the specific failure second.

use pledge_protocol::loan::{LoanId, LoanState, SettlementError, TermsError};
use thiserror::Error;

use crate::allowlist::AdminError;
use crate::authorization::AuthorizationError;
use crate::collaborators::{CustodyError, LedgerError};
use crate::guard::ReentrantCall;
use crate::predicates::PredicateError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OriginationError {
    #[error(transparent)]
    Terms(#[from] TermsError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Predicate(#[from] PredicateError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("custody: {0}")]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Reentrant(#[from] ReentrantCall),

    /// Only active loans can be rolled over.
    #[error("loan {loan_id} is {state}, expected Active")]
    InvalidLoanState { loan_id: LoanId, state: LoanState },

    /// A step failed and some of the effects before it could not be undone.
    #[error("{cause}; {stuck} effect(s) could not be undone")]
    Unwind {
        cause: Box<OriginationError>,
        stuck: usize,
    },
}
