//! In-memory ledger of record.
//!
//! Loans get sequential ids starting at 1. Borrower and lender notes are
//! plain owner fields that can be transferred. A collateral token backs at
//! most one active loan at a time.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use parking_lot::RwLock;
use pledge_protocol::loan::{LoanData, LoanId, LoanState, LoanTerms};
use tracing::{debug, info};

use crate::collaborators::{Clock, LedgerError, LoanCore, RolloverEntry};

#[derive(Clone, Debug)]
struct LoanRecord {
    data: LoanData,
    borrower: Address,
    lender: Address,
}

#[derive(Debug, Default)]
struct LedgerState {
    loans: BTreeMap<LoanId, LoanRecord>,
    last_id: LoanId,
    nonce_uses: HashMap<(Address, U256), u64>,
    /// Nonces that reached their max uses.
    exhausted: HashSet<(Address, U256)>,
    cancelled: HashSet<(Address, U256)>,
    collateral_in_use: HashSet<(Address, U256)>,
}

impl LedgerState {
    fn is_nonce_used(&self, key: &(Address, U256)) -> bool {
        self.exhausted.contains(key) || self.cancelled.contains(key)
    }

    fn record(&self, loan_id: LoanId) -> Result<&LoanRecord, LedgerError> {
        self.loans.get(&loan_id).ok_or(LedgerError::LoanNotFound(loan_id))
    }

    fn record_mut(&mut self, loan_id: LoanId) -> Result<&mut LoanRecord, LedgerError> {
        self.loans.get_mut(&loan_id).ok_or(LedgerError::LoanNotFound(loan_id))
    }

    fn open(&mut self, lender: Address, borrower: Address, terms: &LoanTerms, now: u64) -> LoanId {
        self.last_id += 1;
        let loan_id = self.last_id;
        self.collateral_in_use
            .insert((terms.collateral_address, terms.collateral_id));
        self.loans.insert(
            loan_id,
            LoanRecord {
                data: LoanData::active(terms.clone(), now),
                borrower,
                lender,
            },
        );
        loan_id
    }

    fn close(&mut self, loan_id: LoanId, state: LoanState) -> Result<LoanTerms, LedgerError> {
        let record = self.record_mut(loan_id)?;
        if record.data.state != LoanState::Active {
            return Err(LedgerError::LoanNotActive {
                loan_id,
                state: record.data.state,
            });
        }
        record.data.state = state;
        let terms = record.data.terms.clone();
        self.collateral_in_use
            .remove(&(terms.collateral_address, terms.collateral_id));
        Ok(terms)
    }
}

pub struct InMemoryLoanCore {
    custodian: Address,
    clock: Arc<dyn Clock>,
    state: RwLock<LedgerState>,
}

impl InMemoryLoanCore {
    /// A ledger whose collateral is held by `custodian`.
    pub fn new(custodian: Address, clock: Arc<dyn Clock>) -> Self {
        Self {
            custodian,
            clock,
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Number of loans ever opened.
    pub fn loan_count(&self) -> usize {
        self.state.read().loans.len()
    }

    pub fn nonce_uses(&self, user: Address, nonce: U256) -> u64 {
        self.state
            .read()
            .nonce_uses
            .get(&(user, nonce))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_nonce_used(&self, user: Address, nonce: U256) -> bool {
        self.state.read().is_nonce_used(&(user, nonce))
    }

    /// Void a nonce before it is ever used up.
    pub fn cancel_nonce(&self, user: Address, nonce: U256) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        if state.is_nonce_used(&(user, nonce)) {
            return Err(LedgerError::NonceUsed { user, nonce });
        }
        state.cancelled.insert((user, nonce));
        debug!(%user, %nonce, "nonce cancelled");
        Ok(())
    }

    pub fn is_collateral_in_use(&self, collateral: Address, id: U256) -> bool {
        self.state.read().collateral_in_use.contains(&(collateral, id))
    }

    /// Mark an active loan repaid.
    pub fn repay(&self, loan_id: LoanId) -> Result<(), LedgerError> {
        self.state.write().close(loan_id, LoanState::Repaid)?;
        info!(loan_id, "loan repaid");
        Ok(())
    }

    /// Record an interest payment on an active loan.
    pub fn record_interest_payment(&self, loan_id: LoanId, amount: U256) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        let record = state.record_mut(loan_id)?;
        record.data.interest_amount_paid = record.data.interest_amount_paid.saturating_add(amount);
        Ok(())
    }

    pub fn transfer_borrower_note(&self, loan_id: LoanId, to: Address) -> Result<(), LedgerError> {
        self.state.write().record_mut(loan_id)?.borrower = to;
        Ok(())
    }

    pub fn transfer_lender_note(&self, loan_id: LoanId, to: Address) -> Result<(), LedgerError> {
        self.state.write().record_mut(loan_id)?.lender = to;
        Ok(())
    }
}

impl LoanCore for InMemoryLoanCore {
    fn custodian(&self) -> Address {
        self.custodian
    }

    fn get_loan(&self, loan_id: LoanId) -> Result<LoanData, LedgerError> {
        Ok(self.state.read().record(loan_id)?.data.clone())
    }

    fn borrower_of(&self, loan_id: LoanId) -> Result<Address, LedgerError> {
        Ok(self.state.read().record(loan_id)?.borrower)
    }

    fn lender_of(&self, loan_id: LoanId) -> Result<Address, LedgerError> {
        Ok(self.state.read().record(loan_id)?.lender)
    }

    fn consume_nonce(&self, user: Address, nonce: U256, max_uses: u64) -> Result<(), LedgerError> {
        if max_uses == 0 {
            return Err(LedgerError::InvalidMaxUses);
        }

        let mut state = self.state.write();
        if state.is_nonce_used(&(user, nonce)) {
            return Err(LedgerError::NonceUsed { user, nonce });
        }

        let uses = state.nonce_uses.entry((user, nonce)).or_insert(0);
        *uses += 1;
        let uses = *uses;
        if uses >= max_uses {
            state.exhausted.insert((user, nonce));
        }

        debug!(%user, %nonce, uses, max_uses, "nonce consumed");
        Ok(())
    }

    fn release_nonce(&self, user: Address, nonce: U256) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        let key = (user, nonce);
        let uses = match state.nonce_uses.get_mut(&key) {
            Some(uses) if *uses > 0 => {
                *uses -= 1;
                *uses
            }
            _ => return Err(LedgerError::NonceNotConsumed { user, nonce }),
        };
        if uses == 0 {
            state.nonce_uses.remove(&key);
        }
        state.exhausted.remove(&key);

        debug!(%user, %nonce, uses, "nonce use released");
        Ok(())
    }

    fn start_loan(
        &self,
        lender: Address,
        borrower: Address,
        terms: &LoanTerms,
    ) -> Result<LoanId, LedgerError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        if state
            .collateral_in_use
            .contains(&(terms.collateral_address, terms.collateral_id))
        {
            return Err(LedgerError::CollateralInUse {
                collateral: terms.collateral_address,
                id: terms.collateral_id,
            });
        }

        let loan_id = state.open(lender, borrower, terms, now);
        info!(loan_id, %lender, %borrower, principal = %terms.principal, "loan started");
        Ok(loan_id)
    }

    fn rollover(&self, entry: &RolloverEntry) -> Result<LoanId, LedgerError> {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.close(entry.old_loan_id, LoanState::Repaid)?;
        let loan_id = state.open(entry.lender, entry.borrower, &entry.terms, now);
        info!(
            old_loan_id = entry.old_loan_id,
            loan_id,
            settled = %entry.settled_amount,
            "loan rolled over"
        );
        Ok(loan_id)
    }
}
