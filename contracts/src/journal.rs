//! # Effect Journal
//!
//! Records every effect an origination or rollover has on its collaborators
//! once the checks are done: the nonce use, each currency transfer, the
//! collateral move. If a later step fails the journal undoes the recorded
//! effects newest first, so the operation leaves the nonce, balances and
//! collateral as it found them.
//!
//! ```text
//!   consume nonce ──► transfer ──► transfer ──► ledger
//!        ▲               ▲            ▲           │ (fails)
//!        └── release ◄───┴── reverse ◄┴───────────┘
//! ```
//!
//! The ledger write itself is one collaborator call, so it either happened
//! or it did not. Nothing after it needs undoing.

use alloy_primitives::{Address, U256};
use tracing::{debug, error};

use crate::collaborators::{AssetCustody, CustodyError, LedgerError, LoanCore};

/// One undoable effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Effect {
    NonceConsumed {
        user: Address,
        nonce: U256,
    },
    Erc20 {
        currency: Address,
        from: Address,
        to: Address,
        amount: U256,
    },
    Collateral {
        collateral: Address,
        id: U256,
        from: Address,
        to: Address,
    },
}

pub(crate) struct Journal<'a> {
    loan_core: &'a dyn LoanCore,
    custody: &'a dyn AssetCustody,
    effects: Vec<Effect>,
}

impl<'a> Journal<'a> {
    pub(crate) fn new(loan_core: &'a dyn LoanCore, custody: &'a dyn AssetCustody) -> Self {
        Self {
            loan_core,
            custody,
            effects: Vec::with_capacity(8),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.effects.len()
    }

    pub(crate) fn consume_nonce(
        &mut self,
        user: Address,
        nonce: U256,
        max_uses: u64,
    ) -> Result<(), LedgerError> {
        self.loan_core.consume_nonce(user, nonce, max_uses)?;
        self.effects.push(Effect::NonceConsumed { user, nonce });
        Ok(())
    }

    /// Zero amounts are skipped.
    pub(crate) fn transfer_erc20(
        &mut self,
        currency: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CustodyError> {
        if amount.is_zero() {
            return Ok(());
        }
        self.custody.transfer_erc20(currency, from, to, amount)?;
        self.effects.push(Effect::Erc20 {
            currency,
            from,
            to,
            amount,
        });
        Ok(())
    }

    pub(crate) fn transfer_collateral(
        &mut self,
        operator: Address,
        collateral: Address,
        id: U256,
        from: Address,
        to: Address,
    ) -> Result<(), CustodyError> {
        self.custody
            .transfer_collateral(operator, collateral, id, from, to)?;
        self.effects.push(Effect::Collateral {
            collateral,
            id,
            from,
            to,
        });
        Ok(())
    }

    /// Keep every recorded effect.
    pub(crate) fn commit(self) {
        debug!(effects = self.effects.len(), "effects committed");
    }

    /// Undo every recorded effect, newest first. Returns how many could not
    /// be undone.
    pub(crate) fn unwind(mut self) -> usize {
        let mut stuck = 0;
        while let Some(effect) = self.effects.pop() {
            if let Err(e) = self.undo(effect) {
                error!(?effect, error = %e, "effect could not be undone");
                stuck += 1;
            }
        }
        stuck
    }

    fn undo(&self, effect: Effect) -> Result<(), String> {
        match effect {
            Effect::NonceConsumed { user, nonce } => self
                .loan_core
                .release_nonce(user, nonce)
                .map_err(|e| e.to_string()),
            Effect::Erc20 {
                currency,
                from,
                to,
                amount,
            } => self
                .custody
                .transfer_erc20(currency, to, from, amount)
                .map_err(|e| e.to_string()),
            // The current holder hands it back.
            Effect::Collateral {
                collateral,
                id,
                from,
                to,
            } => self
                .custody
                .transfer_collateral(to, collateral, id, to, from)
                .map_err(|e| e.to_string()),
        }
    }
}
