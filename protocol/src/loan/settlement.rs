//! # Settlement Arithmetic
//!
//! Exact amounts that move when a loan starts or is rolled into new terms.
//! The engine computes, the custody and ledger collaborators move.
//!
//! ## Rollover
//!
//! ```text
//!   repay        = balance + balance * rate / (1e18 * 100) - interestPaid
//!   fee          = newPrincipal * rolloverFeeBps / 10_000
//!   borrowerNet  = newPrincipal - fee
//!
//!   repay > borrowerNet  →  needFromBorrower = repay - borrowerNet
//!   otherwise            →  amountToBorrower = borrowerNet - repay
//!
//!   new lender           →  lender funds newPrincipal, old lender gets repay
//!   same lender          →  only the non-overlapping part moves
//! ```
//!
//! Every amount that flows into the engine flows back out, with the fee left
//! for the protocol:
//!
//! ```text
//!   amountFromLender + needFromBorrower
//!     == amountToOldLender + amountToLender + amountToBorrower + fee
//! ```
//!
//! All division truncates, and every derived amount is computed by
//! subtraction from a truncated value, so outflows can never exceed inflows.
//! Arithmetic is checked. An overflow is an error, never a wrap.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{LoanData, LoanTerms};
use crate::config::{BASIS_POINTS_DENOMINATOR, INTEREST_RATE_DENOMINATOR, PERCENT_DENOMINATOR};

/// Settlement could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("arithmetic overflow while computing settlement amounts")]
    Overflow,

    #[error("fee of {0} bps exceeds 100%")]
    FeeTooHigh(u64),
}

/// `amount * bps / 10_000`, truncated.
pub fn bps_of(amount: U256, bps: u64) -> Result<U256, SettlementError> {
    if bps > BASIS_POINTS_DENOMINATOR {
        return Err(SettlementError::FeeTooHigh(bps));
    }
    let scaled = amount
        .checked_mul(U256::from(bps))
        .ok_or(SettlementError::Overflow)?;
    Ok(scaled / U256::from(BASIS_POINTS_DENOMINATOR))
}

/// Interest due over the full term on `principal` at `rate`, truncated.
pub fn interest_amount(principal: U256, rate: U256) -> Result<U256, SettlementError> {
    let numerator = principal
        .checked_mul(rate)
        .ok_or(SettlementError::Overflow)?;
    let denominator = INTEREST_RATE_DENOMINATOR
        .checked_mul(PERCENT_DENOMINATOR)
        .ok_or(SettlementError::Overflow)?;
    Ok(numerator / denominator)
}

/// Principal plus full-term interest.
pub fn full_repayment_amount(principal: U256, rate: U256) -> Result<U256, SettlementError> {
    principal
        .checked_add(interest_amount(principal, rate)?)
        .ok_or(SettlementError::Overflow)
}

/// What it takes to close `loan` today: outstanding balance plus unpaid
/// interest. Interest already paid is credited, never below zero.
pub fn repay_amount(loan: &LoanData) -> Result<U256, SettlementError> {
    let interest = interest_amount(loan.balance, loan.terms.interest_rate)?;
    let unpaid = interest.saturating_sub(loan.interest_amount_paid);
    loan.balance
        .checked_add(unpaid)
        .ok_or(SettlementError::Overflow)
}

/// Funds movement for a fresh origination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginationAmounts {
    /// Paid by the lender.
    pub amount_from_lender: U256,
    /// Paid out to the borrower.
    pub amount_to_borrower: U256,
    /// Retained by the protocol.
    pub fee: U256,
}

/// Split a new loan's principal between borrower and protocol.
pub fn origination_amounts(
    principal: U256,
    origination_fee_bps: u64,
) -> Result<OriginationAmounts, SettlementError> {
    let fee = bps_of(principal, origination_fee_bps)?;
    let amount_to_borrower = principal.checked_sub(fee).ok_or(SettlementError::Overflow)?;
    Ok(OriginationAmounts {
        amount_from_lender: principal,
        amount_to_borrower,
        fee,
    })
}

/// Funds movement when an active loan is replaced by new terms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverAmounts {
    /// Amount needed to close the old loan.
    pub repay_amount: U256,
    /// Protocol rollover fee on the new principal.
    pub fee: U256,
    /// Shortfall the borrower pays in.
    pub need_from_borrower: U256,
    /// New principal net of fee and repayment, owed to the borrower.
    pub leftover_principal: U256,
    /// Fresh funding pulled from the new lender.
    pub amount_from_lender: U256,
    /// Paid to the old lender when the lender changes.
    pub amount_to_old_lender: U256,
    /// Paid to a continuing lender whose repayment exceeds the new principal.
    pub amount_to_lender: U256,
    /// Paid out to the borrower.
    pub amount_to_borrower: U256,
}

impl RolloverAmounts {
    /// Everything the engine collects.
    pub fn inflow(&self) -> Option<U256> {
        self.amount_from_lender.checked_add(self.need_from_borrower)
    }

    /// Everything the engine pays out, fee included.
    pub fn outflow(&self) -> Option<U256> {
        self.amount_to_old_lender
            .checked_add(self.amount_to_lender)?
            .checked_add(self.amount_to_borrower)?
            .checked_add(self.fee)
    }

    /// Amount handed to the ledger as settled for the old loan.
    pub fn settled_amount(&self) -> Option<U256> {
        self.inflow()
    }

    /// Inflow equals outflow.
    pub fn is_balanced(&self) -> bool {
        matches!((self.inflow(), self.outflow()), (Some(i), Some(o)) if i == o)
    }
}

/// Compute rollover settlement from the old loan to `new_terms`.
pub fn rollover_amounts(
    old_loan: &LoanData,
    new_terms: &LoanTerms,
    lender: Address,
    old_lender: Address,
    rollover_fee_bps: u64,
) -> Result<RolloverAmounts, SettlementError> {
    let repay_amount = repay_amount(old_loan)?;
    compute_rollover(
        repay_amount,
        new_terms.principal,
        lender == old_lender,
        rollover_fee_bps,
    )
}

/// The pure core of [`rollover_amounts`], in terms of the repayment figure.
pub fn compute_rollover(
    repay_amount: U256,
    new_principal: U256,
    same_lender: bool,
    rollover_fee_bps: u64,
) -> Result<RolloverAmounts, SettlementError> {
    let fee = bps_of(new_principal, rollover_fee_bps)?;
    let borrower_net = new_principal
        .checked_sub(fee)
        .ok_or(SettlementError::Overflow)?;

    let mut amounts = RolloverAmounts {
        repay_amount,
        fee,
        ..Default::default()
    };

    if repay_amount > borrower_net {
        amounts.need_from_borrower = repay_amount - borrower_net;
    } else {
        amounts.leftover_principal = borrower_net - repay_amount;
        amounts.amount_to_borrower = amounts.leftover_principal;
    }

    if same_lender {
        // The lender would pay new principal in and take repayment out.
        // Only the difference moves.
        if new_principal > repay_amount {
            amounts.amount_from_lender = new_principal - repay_amount;
        } else {
            amounts.amount_to_lender = repay_amount - new_principal;
        }
    } else {
        amounts.amount_from_lender = new_principal;
        amounts.amount_to_old_lender = repay_amount;
    }

    debug_assert!(amounts.is_balanced());
    Ok(amounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_INTEREST_RATE;
    use crate::loan::types::LoanState;
    use alloy_primitives::B256;
    use proptest::prelude::*;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    fn loan(principal: u64, rate_percent: u64) -> LoanData {
        LoanData {
            state: LoanState::Active,
            terms: LoanTerms {
                duration_secs: 86_400,
                principal: u(principal),
                interest_rate: MIN_INTEREST_RATE * u(rate_percent),
                collateral_address: Address::repeat_byte(0xC0),
                collateral_id: u(1),
                payable_currency: Address::repeat_byte(0xDA),
                deadline: 0,
                affiliate_code: B256::ZERO,
            },
            start_date: 0,
            balance: u(principal),
            interest_amount_paid: U256::ZERO,
        }
    }

    #[test]
    fn test_interest_is_percent_of_principal() {
        // 1e18 == 1%.
        assert_eq!(interest_amount(u(10_000), MIN_INTEREST_RATE).unwrap(), u(100));
        assert_eq!(full_repayment_amount(u(100), MIN_INTEREST_RATE * u(5)).unwrap(), u(105));
    }

    #[test]
    fn test_interest_truncates() {
        // 1% of 150 is 1.5, which truncates to 1.
        assert_eq!(interest_amount(u(150), MIN_INTEREST_RATE).unwrap(), u(1));
    }

    #[test]
    fn test_paid_interest_is_credited() {
        let mut l = loan(100, 5);
        l.interest_amount_paid = u(3);
        assert_eq!(repay_amount(&l).unwrap(), u(102));
        l.interest_amount_paid = u(50);
        assert_eq!(repay_amount(&l).unwrap(), u(100));
    }

    #[test]
    fn test_origination_two_percent_fee() {
        let amounts = origination_amounts(u(100), 200).unwrap();
        assert_eq!(amounts.amount_from_lender, u(100));
        assert_eq!(amounts.amount_to_borrower, u(98));
        assert_eq!(amounts.fee, u(2));
    }

    #[test]
    fn test_origination_without_fee_is_identity() {
        let amounts = origination_amounts(u(5_000_000), 0).unwrap();
        assert_eq!(amounts.amount_to_borrower, u(5_000_000));
        assert_eq!(amounts.fee, U256::ZERO);
    }

    #[test]
    fn test_fee_above_whole_rejected() {
        assert_eq!(bps_of(u(100), 10_001), Err(SettlementError::FeeTooHigh(10_001)));
    }

    #[test]
    fn test_rollover_shortfall_new_lender() {
        // Old loan of 100 at 5% → 105 due. New loan of 100, no fee.
        let old = loan(100, 5);
        let new_terms = old.terms.clone();
        let a = rollover_amounts(&old, &new_terms, Address::repeat_byte(2), Address::repeat_byte(1), 0)
            .unwrap();
        assert_eq!(a.repay_amount, u(105));
        assert_eq!(a.need_from_borrower, u(5));
        assert_eq!(a.amount_to_borrower, U256::ZERO);
        assert_eq!(a.amount_from_lender, u(100));
        assert_eq!(a.amount_to_old_lender, u(105));
        assert_eq!(a.amount_to_lender, U256::ZERO);
        assert!(a.is_balanced());
    }

    #[test]
    fn test_rollover_shortfall_same_lender() {
        let old = loan(100, 5);
        let lender = Address::repeat_byte(1);
        let a = rollover_amounts(&old, &old.terms, lender, lender, 0).unwrap();
        assert_eq!(a.need_from_borrower, u(5));
        assert_eq!(a.amount_from_lender, U256::ZERO);
        assert_eq!(a.amount_to_old_lender, U256::ZERO);
        assert_eq!(a.amount_to_lender, u(5));
        assert_eq!(a.settled_amount(), Some(u(5)));
        assert!(a.is_balanced());
    }

    #[test]
    fn test_rollover_leftover_to_borrower() {
        // 105 due, new principal 200 at 1% fee → fee 2, net 198, leftover 93.
        let a = compute_rollover(u(105), u(200), false, 100).unwrap();
        assert_eq!(a.fee, u(2));
        assert_eq!(a.need_from_borrower, U256::ZERO);
        assert_eq!(a.leftover_principal, u(93));
        assert_eq!(a.amount_to_borrower, u(93));
        assert_eq!(a.amount_from_lender, u(200));
        assert_eq!(a.amount_to_old_lender, u(105));
        assert!(a.is_balanced());

        let same = compute_rollover(u(105), u(200), true, 100).unwrap();
        assert_eq!(same.amount_from_lender, u(95));
        assert_eq!(same.amount_to_borrower, u(93));
        assert!(same.is_balanced());
    }

    #[test]
    fn test_rollover_fee_pushes_borrower_into_shortfall() {
        // Repay 99, new principal 100 at 5% fee → net 95, borrower owes 4.
        let same = compute_rollover(u(99), u(100), true, 500).unwrap();
        assert_eq!(same.need_from_borrower, u(4));
        assert_eq!(same.amount_from_lender, u(1));
        assert_eq!(same.amount_to_lender, U256::ZERO);
        assert!(same.is_balanced());
    }

    #[test]
    fn test_rollover_overflow_is_error() {
        assert_eq!(
            compute_rollover(u(1), U256::MAX, false, 100),
            Err(SettlementError::Overflow)
        );
    }

    proptest! {
        #[test]
        fn test_rollover_conserves_value(
            repay in 0u128..=u128::MAX / 2,
            principal in 0u128..=u128::MAX / 2,
            same_lender in any::<bool>(),
            bps in 0u64..=10_000,
        ) {
            let a = compute_rollover(U256::from(repay), U256::from(principal), same_lender, bps).unwrap();
            prop_assert!(a.is_balanced());
            // Exactly one of shortfall / leftover is non-zero (or both zero).
            prop_assert!(a.need_from_borrower.is_zero() || a.amount_to_borrower.is_zero());
            // Only one lender leg is used at a time.
            if same_lender {
                prop_assert!(a.amount_to_old_lender.is_zero());
                prop_assert!(a.amount_from_lender.is_zero() || a.amount_to_lender.is_zero());
            } else {
                prop_assert_eq!(a.amount_from_lender, U256::from(principal));
                prop_assert_eq!(a.amount_to_old_lender, U256::from(repay));
                prop_assert!(a.amount_to_lender.is_zero());
            }
        }

        #[test]
        fn test_fee_never_exceeds_principal(principal in any::<u128>(), bps in 0u64..=10_000) {
            let fee = bps_of(U256::from(principal), bps).unwrap();
            prop_assert!(fee <= U256::from(principal));
            let o = origination_amounts(U256::from(principal), bps).unwrap();
            prop_assert_eq!(o.amount_to_borrower + o.fee, o.amount_from_lender);
        }
    }
}
