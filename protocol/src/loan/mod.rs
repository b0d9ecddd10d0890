//! # Loans
//!
//! The value types a proposal is made of, the bounds every proposal must
//! respect, and the arithmetic that settles an origination or a rollover.
//!
//! - **types** — `LoanTerms`, `SigProperties`, `Side`, `Predicate`, `LoanData`.
//! - **validation** — protocol bounds, allow-list checks, rollover compatibility.
//! - **settlement** — origination fee split and rollover netting.

pub mod settlement;
pub mod types;
pub mod validation;

pub use settlement::{
    origination_amounts, repay_amount, rollover_amounts, OriginationAmounts, RolloverAmounts,
    SettlementError,
};
pub use types::{LoanData, LoanId, LoanState, LoanTerms, Predicate, Side, SigProperties};
pub use validation::{validate_loan_terms, validate_rollover, TermsAllowList, TermsError};
