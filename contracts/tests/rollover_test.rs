//! Integration tests for rollovers and for reentrancy during settlement.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use alloy_primitives::{Address, B256, U256};
use common::*;
use parking_lot::Mutex;
use pledge_contracts::authorization::AuthorizationError;
use pledge_contracts::collaborators::{AssetCustody, CustodyError, LedgerError, LoanCore};
use pledge_contracts::guard::ReentrantCall;
use pledge_contracts::memory::{AssetLedger, FixedFees};
use pledge_contracts::{OriginationController, OriginationError, RolloverRequest};
use pledge_protocol::crypto::{LocalSigner, Signature};
use pledge_protocol::loan::{LoanState, LoanTerms, Side, SigProperties, TermsError};

fn rollover_request(
    h: &Harness,
    signer: &LocalSigner,
    terms: LoanTerms,
    lender: Address,
    nonce: u64,
    side: Side,
) -> RolloverRequest {
    let props = SigProperties::single_use(nonce);
    let signature = h.sign(signer, &terms, &props, side);
    RolloverRequest {
        terms,
        lender,
        signature,
        sig_properties: props,
    }
}

fn with_principal(mut terms: LoanTerms, principal: u64) -> LoanTerms {
    terms.principal = u(principal);
    terms
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

#[test]
fn new_lender_pays_off_old_lender() {
    let h = Harness::new();
    h.originate(1, 1);
    let new_lender = LocalSigner::generate();
    h.assets.mint_erc20(USDC, new_lender.address(), u(1_000));

    let request = rollover_request(&h, &new_lender, h.terms(1), new_lender.address(), 1, Side::Lend);
    let rollover = h.engine.rollover_loan(h.borrower.address(), 1, &request).unwrap();

    assert_eq!(rollover.old_loan_id, 1);
    assert_eq!(rollover.loan_id, 2);
    assert_eq!(rollover.amounts.repay_amount, u(105));
    assert_eq!(rollover.amounts.need_from_borrower, u(5));
    assert_eq!(rollover.amounts.amount_from_lender, u(100));
    assert_eq!(rollover.amounts.amount_to_old_lender, u(105));
    assert!(rollover.amounts.is_balanced());

    assert_eq!(h.balance(h.borrower.address()), u(STARTING_BALANCE + 95));
    assert_eq!(h.balance(h.lender.address()), u(STARTING_BALANCE + 5));
    assert_eq!(h.balance(new_lender.address()), u(900));
    assert_eq!(h.balance(ENGINE), U256::ZERO);

    assert_eq!(h.loan_core.get_loan(1).unwrap().state, LoanState::Repaid);
    assert_eq!(h.loan_core.get_loan(2).unwrap().state, LoanState::Active);
    assert_eq!(h.loan_core.lender_of(2).unwrap(), new_lender.address());
    assert_eq!(h.loan_core.borrower_of(2).unwrap(), h.borrower.address());
    assert!(h.loan_core.is_nonce_used(new_lender.address(), u(1)));
}

#[test]
fn same_lender_larger_principal_nets_out() {
    let h = Harness::new();
    h.originate(1, 1);

    let terms = with_principal(h.terms(1), 200);
    let request = rollover_request(&h, &h.lender, terms, h.lender.address(), 2, Side::Lend);
    let rollover = h.engine.rollover_loan(h.borrower.address(), 1, &request).unwrap();

    // 200 new principal against 105 owed: only the difference moves.
    assert_eq!(rollover.amounts.amount_from_lender, u(95));
    assert_eq!(rollover.amounts.amount_to_borrower, u(95));
    assert_eq!(rollover.amounts.amount_to_old_lender, U256::ZERO);
    assert_eq!(h.balance(h.borrower.address()), u(STARTING_BALANCE + 195));
    assert_eq!(h.balance(h.lender.address()), u(STARTING_BALANCE - 195));
    assert_eq!(h.balance(ENGINE), U256::ZERO);
}

#[test]
fn same_lender_same_principal_collects_interest() {
    let h = Harness::new();
    h.originate(1, 1);

    let request = rollover_request(&h, &h.lender, h.terms(1), h.lender.address(), 2, Side::Lend);
    let rollover = h.engine.rollover_loan(h.borrower.address(), 1, &request).unwrap();

    assert_eq!(rollover.amounts.need_from_borrower, u(5));
    assert_eq!(rollover.amounts.amount_to_lender, u(5));
    assert_eq!(rollover.amounts.amount_from_lender, U256::ZERO);
    assert_eq!(h.balance(h.borrower.address()), u(STARTING_BALANCE + 95));
    assert_eq!(h.balance(h.lender.address()), u(STARTING_BALANCE + 5));
    assert_eq!(h.balance(ENGINE), U256::ZERO);
}

#[test]
fn rollover_fee_goes_to_treasury() {
    let h = Harness::with_fees(FixedFees {
        origination_bps: 0,
        rollover_bps: 100,
        treasury: TREASURY,
    });
    h.originate(1, 1);
    let new_lender = LocalSigner::generate();
    h.assets.mint_erc20(USDC, new_lender.address(), u(1_000));

    let terms = with_principal(h.terms(1), 200);
    let request = rollover_request(&h, &new_lender, terms, new_lender.address(), 1, Side::Lend);
    let rollover = h.engine.rollover_loan(h.borrower.address(), 1, &request).unwrap();

    assert_eq!(rollover.amounts.fee, u(2));
    assert_eq!(rollover.amounts.amount_to_borrower, u(93));
    assert_eq!(h.balance(TREASURY), u(2));
    assert_eq!(h.balance(h.lender.address()), u(STARTING_BALANCE + 5));
    assert_eq!(h.balance(new_lender.address()), u(800));
    assert_eq!(h.balance(h.borrower.address()), u(STARTING_BALANCE + 193));
    assert_eq!(h.balance(ENGINE), U256::ZERO);
}

#[test]
fn paid_interest_is_credited() {
    let h = Harness::new();
    h.originate(1, 1);
    h.loan_core.record_interest_payment(1, u(5)).unwrap();

    let request = rollover_request(&h, &h.lender, h.terms(1), h.lender.address(), 2, Side::Lend);
    let rollover = h.engine.rollover_loan(h.borrower.address(), 1, &request).unwrap();

    assert_eq!(rollover.amounts.repay_amount, u(100));
    assert_eq!(rollover.amounts.settled_amount(), Some(U256::ZERO));
    assert_eq!(h.balance(h.borrower.address()), u(STARTING_BALANCE + 100));
    assert_eq!(h.balance(h.lender.address()), u(STARTING_BALANCE - 100));
    assert_eq!(h.balance(ENGINE), U256::ZERO);
}

// ---------------------------------------------------------------------------
// Counterparties
// ---------------------------------------------------------------------------

#[test]
fn lender_submits_borrower_signed_rollover() {
    let h = Harness::new();
    h.originate(1, 1);
    let new_lender = LocalSigner::generate();
    h.assets.mint_erc20(USDC, new_lender.address(), u(1_000));

    let request = rollover_request(&h, &h.borrower, h.terms(1), new_lender.address(), 9, Side::Borrow);
    let rollover = h.engine.rollover_loan(new_lender.address(), 1, &request).unwrap();

    assert_eq!(rollover.signing_side, Side::Borrow);
    assert_eq!(rollover.signing_counterparty, h.borrower.address());
    assert!(h.loan_core.is_nonce_used(h.borrower.address(), u(9)));
    assert_eq!(h.balance(new_lender.address()), u(900));
    assert_eq!(h.balance(ENGINE), U256::ZERO);
}

#[test]
fn borrower_is_read_from_the_ledger() {
    let h = Harness::new();
    h.originate(1, 1);
    let note_holder = LocalSigner::generate();
    h.assets.mint_erc20(USDC, note_holder.address(), u(1_000));
    h.loan_core.transfer_borrower_note(1, note_holder.address()).unwrap();

    let request = rollover_request(&h, &h.lender, h.terms(1), h.lender.address(), 2, Side::Lend);

    // The original borrower no longer represents the loan.
    assert_eq!(
        h.engine.rollover_loan(h.borrower.address(), 1, &request),
        Err(OriginationError::Authorization(
            AuthorizationError::CallerNotParticipant(h.borrower.address())
        ))
    );

    let rollover = h.engine.rollover_loan(note_holder.address(), 1, &request).unwrap();
    assert_eq!(h.loan_core.borrower_of(rollover.loan_id).unwrap(), note_holder.address());
    assert_eq!(h.balance(note_holder.address()), u(995));
    assert_eq!(h.balance(ENGINE), U256::ZERO);
}

#[test]
fn borrower_cannot_roll_with_own_signature() {
    let h = Harness::new();
    h.originate(1, 1);

    let request = rollover_request(&h, &h.borrower, h.terms(1), h.lender.address(), 2, Side::Lend);
    assert_eq!(
        h.engine.rollover_loan(h.borrower.address(), 1, &request),
        Err(OriginationError::Authorization(AuthorizationError::ApprovedOwnLoan(
            h.borrower.address()
        )))
    );
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[test]
fn closed_loan_cannot_be_rolled() {
    let h = Harness::new();
    h.originate(1, 1);
    h.loan_core.repay(1).unwrap();

    let request = rollover_request(&h, &h.lender, h.terms(1), h.lender.address(), 2, Side::Lend);
    assert_eq!(
        h.engine.rollover_loan(h.borrower.address(), 1, &request),
        Err(OriginationError::InvalidLoanState {
            loan_id: 1,
            state: LoanState::Repaid,
        })
    );
    assert!(!h.loan_core.is_nonce_used(h.lender.address(), u(2)));
}

#[test]
fn unknown_loan_is_a_ledger_error() {
    let h = Harness::new();
    let request = rollover_request(&h, &h.lender, h.terms(1), h.lender.address(), 2, Side::Lend);
    assert_eq!(
        h.engine.rollover_loan(h.borrower.address(), 42, &request),
        Err(OriginationError::Ledger(LedgerError::LoanNotFound(42)))
    );
}

#[test]
fn rollover_keeps_currency_and_collateral() {
    let h = Harness::new();
    h.originate(1, 1);
    let dai = Address::repeat_byte(0xDA);
    h.engine.allow_currencies(ADMIN, &[dai]).unwrap();

    let mut terms = h.terms(1);
    terms.payable_currency = dai;
    let request = rollover_request(&h, &h.lender, terms, h.lender.address(), 2, Side::Lend);
    assert_eq!(
        h.engine.rollover_loan(h.borrower.address(), 1, &request),
        Err(OriginationError::Terms(TermsError::RolloverCurrencyMismatch {
            old: USDC,
            new: dai,
        }))
    );

    let request = rollover_request(&h, &h.lender, h.terms(2), h.lender.address(), 2, Side::Lend);
    assert!(matches!(
        h.engine.rollover_loan(h.borrower.address(), 1, &request),
        Err(OriginationError::Terms(TermsError::RolloverCollateralMismatch { .. }))
    ));
}

#[test]
fn rollover_terms_are_validated_first() {
    let h = Harness::new();
    h.originate(1, 1);

    let request = rollover_request(
        &h,
        &h.lender,
        with_principal(h.terms(1), 50),
        h.lender.address(),
        2,
        Side::Lend,
    );
    assert!(matches!(
        h.engine.rollover_loan(h.borrower.address(), 1, &request),
        Err(OriginationError::Terms(TermsError::PrincipalTooLow { .. }))
    ));
}

// ---------------------------------------------------------------------------
// Failed settlement
// ---------------------------------------------------------------------------

/// Custody that refuses its `fail_at`-th transfer (1-based) and passes every
/// other call through to the asset ledger.
struct FailingCustody {
    assets: OnceLock<Arc<AssetLedger>>,
    fail_at: usize,
    calls: AtomicUsize,
}

impl FailingCustody {
    fn failing_at(fail_at: usize) -> Self {
        Self {
            assets: OnceLock::new(),
            fail_at,
            calls: AtomicUsize::new(0),
        }
    }

    fn assets(&self) -> &AssetLedger {
        self.assets.get().expect("assets wired")
    }

    fn refuse(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at
    }
}

impl AssetCustody for FailingCustody {
    fn transfer_erc20(
        &self,
        currency: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CustodyError> {
        if self.refuse() {
            return Err(CustodyError::InsufficientBalance {
                token: currency,
                owner: from,
                required: amount,
                available: U256::ZERO,
            });
        }
        self.assets().transfer_erc20(currency, from, to, amount)
    }

    fn transfer_collateral(
        &self,
        operator: Address,
        collateral: Address,
        id: U256,
        from: Address,
        to: Address,
    ) -> Result<(), CustodyError> {
        if self.refuse() {
            return Err(CustodyError::NotApproved {
                collateral,
                id,
                operator,
            });
        }
        self.assets().transfer_collateral(operator, collateral, id, from, to)
    }

    fn permit_collateral(
        &self,
        collateral: Address,
        id: U256,
        owner: Address,
        spender: Address,
        deadline: u64,
        signature: &Signature,
    ) -> Result<(), CustodyError> {
        self.assets()
            .permit_collateral(collateral, id, owner, spender, deadline, signature)
    }
}

#[test]
fn failed_payout_returns_pulled_funds() {
    let h = Harness::new();
    h.originate(1, 1);
    let new_lender = LocalSigner::generate();
    h.assets.mint_erc20(USDC, new_lender.address(), u(1_000));

    // Leave the borrower 4 short of the 5 needed.
    let spare = h.balance(h.borrower.address()) - u(1);
    h.assets
        .transfer_erc20(USDC, h.borrower.address(), Address::repeat_byte(0x99), spare)
        .unwrap();

    let request = rollover_request(&h, &new_lender, h.terms(1), new_lender.address(), 1, Side::Lend);
    assert!(matches!(
        h.engine.rollover_loan(h.borrower.address(), 1, &request),
        Err(OriginationError::Custody(CustodyError::InsufficientBalance { .. }))
    ));

    // The new lender's 100 went in first and came back out.
    assert_eq!(h.balance(new_lender.address()), u(1_000));
    assert_eq!(h.balance(h.borrower.address()), u(1));
    assert_eq!(h.balance(h.lender.address()), u(STARTING_BALANCE - 100));
    assert_eq!(h.balance(ENGINE), U256::ZERO);
    assert_eq!(h.loan_core.get_loan(1).unwrap().state, LoanState::Active);
    assert_eq!(h.loan_core.loan_count(), 1);
    assert_eq!(h.loan_core.nonce_uses(new_lender.address(), u(1)), 0);
}

#[test]
fn refused_outflow_unwinds_inflows() {
    let h = Harness::new();
    h.originate(1, 1);
    let new_lender = LocalSigner::generate();
    h.assets.mint_erc20(USDC, new_lender.address(), u(1_000));
    let borrower_before = h.balance(h.borrower.address());
    let lender_before = h.balance(h.lender.address());

    // Two inflows, then the payout to the old lender is refused.
    let custody = Arc::new(FailingCustody::failing_at(3));
    assert!(custody.assets.set(h.assets.clone()).is_ok());
    let engine = h.engine_with_custody(custody.clone() as Arc<dyn AssetCustody>);

    let request = rollover_request(&h, &new_lender, h.terms(1), new_lender.address(), 1, Side::Lend);
    assert!(matches!(
        engine.rollover_loan(h.borrower.address(), 1, &request),
        Err(OriginationError::Custody(CustodyError::InsufficientBalance { .. }))
    ));
    // Three forward calls and two reversals.
    assert_eq!(custody.calls.load(Ordering::SeqCst), 5);

    assert_eq!(h.balance(new_lender.address()), u(1_000));
    assert_eq!(h.balance(h.borrower.address()), borrower_before);
    assert_eq!(h.balance(h.lender.address()), lender_before);
    assert_eq!(h.balance(ENGINE), U256::ZERO);
    assert_eq!(h.loan_core.get_loan(1).unwrap().state, LoanState::Active);
    assert!(!h.loan_core.is_nonce_used(new_lender.address(), u(1)));

    // The same signed request settles once custody cooperates.
    let rollover = h.engine.rollover_loan(h.borrower.address(), 1, &request).unwrap();
    assert_eq!(rollover.loan_id, 2);
    assert_eq!(h.balance(new_lender.address()), u(900));
    assert_eq!(h.balance(ENGINE), U256::ZERO);
}

// ---------------------------------------------------------------------------
// Reentrancy
// ---------------------------------------------------------------------------

/// Custody that tries to call back into the engine on every transfer.
#[derive(Default)]
struct ReentrantCustody {
    assets: OnceLock<Arc<AssetLedger>>,
    engine: OnceLock<Weak<OriginationController>>,
    rejections: Mutex<Vec<OriginationError>>,
}

impl ReentrantCustody {
    fn call_back(&self) {
        let Some(engine) = self.engine.get().and_then(Weak::upgrade) else {
            return;
        };
        let request = RolloverRequest {
            terms: LoanTerms {
                duration_secs: 0,
                principal: U256::ZERO,
                interest_rate: U256::ZERO,
                collateral_address: Address::ZERO,
                collateral_id: U256::ZERO,
                payable_currency: Address::ZERO,
                deadline: 0,
                affiliate_code: B256::ZERO,
            },
            lender: Address::ZERO,
            signature: Signature::new(27, B256::ZERO, B256::ZERO),
            sig_properties: SigProperties::single_use(0),
        };
        if let Err(e) = engine.rollover_loan(Address::ZERO, 1, &request) {
            self.rejections.lock().push(e);
        }
    }

    fn assets(&self) -> &AssetLedger {
        self.assets.get().expect("assets wired")
    }
}

impl AssetCustody for ReentrantCustody {
    fn transfer_erc20(
        &self,
        currency: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CustodyError> {
        self.call_back();
        self.assets().transfer_erc20(currency, from, to, amount)
    }

    fn transfer_collateral(
        &self,
        operator: Address,
        collateral: Address,
        id: U256,
        from: Address,
        to: Address,
    ) -> Result<(), CustodyError> {
        self.call_back();
        self.assets().transfer_collateral(operator, collateral, id, from, to)
    }

    fn permit_collateral(
        &self,
        collateral: Address,
        id: U256,
        owner: Address,
        spender: Address,
        deadline: u64,
        signature: &Signature,
    ) -> Result<(), CustodyError> {
        self.assets()
            .permit_collateral(collateral, id, owner, spender, deadline, signature)
    }
}

fn reentrant_harness() -> (Harness, Arc<ReentrantCustody>) {
    let custody = Arc::new(ReentrantCustody::default());
    let h = Harness::build(FixedFees::zero(TREASURY), Some(custody.clone() as Arc<dyn AssetCustody>));
    assert!(custody.assets.set(h.assets.clone()).is_ok());
    assert!(custody.engine.set(Arc::downgrade(&h.engine)).is_ok());
    (h, custody)
}

#[test]
fn callbacks_during_origination_are_turned_away() {
    let (h, custody) = reentrant_harness();
    h.originate(1, 1);

    let rejections = custody.rejections.lock();
    // One collateral transfer and two currency transfers.
    assert_eq!(rejections.len(), 3);
    assert!(rejections
        .iter()
        .all(|e| *e == OriginationError::Reentrant(ReentrantCall)));
}

#[test]
fn callbacks_during_rollover_are_turned_away() {
    let (h, custody) = reentrant_harness();
    h.originate(1, 1);
    custody.rejections.lock().clear();

    let new_lender = LocalSigner::generate();
    h.assets.mint_erc20(USDC, new_lender.address(), u(1_000));
    let request = rollover_request(&h, &new_lender, h.terms(1), new_lender.address(), 1, Side::Lend);
    h.engine.rollover_loan(h.borrower.address(), 1, &request).unwrap();

    // Two inflows and one outflow to the old lender.
    let rejections = custody.rejections.lock();
    assert_eq!(rejections.len(), 3);
    assert!(rejections
        .iter()
        .all(|e| *e == OriginationError::Reentrant(ReentrantCall)));
    assert_eq!(h.loan_core.loan_count(), 2);
}
