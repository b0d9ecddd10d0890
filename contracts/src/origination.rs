//! # Origination Controller
//!
//! The entry point of the engine. Takes a signed proposal from one
//! counterparty, submitted by the other, and either starts a loan, replaces
//! an active loan with new terms, or says exactly why not.
//!
//! ## Origination
//!
//! ```text
//!   validate terms ──► infer side ──► digest ──► recover signer
//!        │                                           │
//!        ▼                                           ▼
//!   (bounds, deadline,                    resolve counterparties
//!    allow-lists)                                    │
//!                                                    ▼
//!                            predicates (items) ──► permit (optional)
//!                                                    │
//!                                                    ▼
//!                     consume nonce ──► custody ──► ledger.start_loan
//! ```
//!
//! Every check runs before the nonce is consumed. Everything from the nonce
//! on is journaled: if custody or the ledger fails, the nonce use is
//! released and every transfer is reversed before the error is returned.
//! Lender funds are pulled first, so an unfunded lender fails before the
//! collateral moves.
//!
//! ## Rollover
//!
//! Same gate, against the *new* terms, plus: the old loan must be active and
//! the collateral and currency must not change. The borrower is whoever holds
//! the old loan's borrower note. Funds are pulled into the engine, paid out
//! to old lender, lender, borrower and treasury, and the ledger is told to
//! replace the loan.
//!
//! ## State
//!
//! Allow-lists and delegations sit behind a lock. Each operation clones them
//! once at entry and works from that snapshot. Originations and rollovers
//! also hold the reentrancy guard until they return: callers on other
//! threads wait, a call back in from inside the operation is refused.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use parking_lot::RwLock;
use pledge_protocol::config::EngineConfig;
use pledge_protocol::crypto::{items_hash, recover, Signature, TypedDataDomain};
use pledge_protocol::loan::{
    origination_amounts, rollover_amounts, validate_loan_terms, validate_rollover, LoanId,
    LoanState, LoanTerms, OriginationAmounts, Predicate, RolloverAmounts, SettlementError, Side,
    SigProperties,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::allowlist::{AdminError, AllowList, ListKind};
use crate::authorization::{
    contract_signature_verdict, AuthorizationError, AuthorizationResolver, Counterparties,
    Resolution,
};
use crate::collaborators::{
    AssetCustody, Clock, ContractDirectory, FeeController, LoanCore, PredicateContext,
    RolloverEntry,
};
use crate::error::OriginationError;
use crate::guard::ReentrancyGuard;
use crate::journal::Journal;
use crate::predicates::verify_predicates;
use crate::store::ConfigStore;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// The collaborators an engine is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub loan_core: Arc<dyn LoanCore>,
    pub fees: Arc<dyn FeeController>,
    pub custody: Arc<dyn AssetCustody>,
    pub contracts: Arc<dyn ContractDirectory>,
    pub clock: Arc<dyn Clock>,
}

/// A signed proposal for a new loan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub terms: LoanTerms,
    pub borrower: Address,
    pub lender: Address,
    pub signature: Signature,
    pub sig_properties: SigProperties,
}

/// A signed proposal to replace an active loan. The borrower is read from
/// the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverRequest {
    pub terms: LoanTerms,
    pub lender: Address,
    pub signature: Signature,
    pub sig_properties: SigProperties,
}

/// Owner-signed approval letting the engine take the collateral.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralPermit {
    pub deadline: u64,
    pub signature: Signature,
}

/// A loan that was started.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origination {
    pub loan_id: LoanId,
    pub digest: B256,
    pub signing_side: Side,
    pub signing_counterparty: Address,
    /// Recovered key, if the signature recovered at all.
    pub signer: Option<Address>,
    pub amounts: OriginationAmounts,
}

/// A loan that replaced another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rollover {
    pub old_loan_id: LoanId,
    pub loan_id: LoanId,
    pub digest: B256,
    pub signing_side: Side,
    pub signing_counterparty: Address,
    pub signer: Option<Address>,
    pub amounts: RolloverAmounts,
}

struct Authorized {
    digest: B256,
    signer: Option<Address>,
    resolution: Resolution,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct OriginationController {
    domain: TypedDataDomain,
    min_principal: U256,
    store: RwLock<ConfigStore>,
    collaborators: Collaborators,
    guard: ReentrancyGuard,
}

impl OriginationController {
    /// Build an engine from a deployment config.
    pub fn new(config: &EngineConfig, collaborators: Collaborators) -> Result<Self, AdminError> {
        let store = ConfigStore::from_config(config)?;
        info!(
            verifying_contract = %config.domain.verifying_contract,
            chain = %pledge_protocol::config::chain_name(config.domain.chain_id),
            currencies = store.currencies.len(),
            collateral = store.collateral.len(),
            verifiers = store.verifiers.len(),
            "origination controller ready"
        );
        Ok(Self {
            domain: TypedDataDomain::new(config.domain.clone()),
            min_principal: config.min_principal,
            store: RwLock::new(store),
            collaborators,
            guard: ReentrancyGuard::new(),
        })
    }

    /// The engine's own account: permit spender, collateral operator and
    /// settlement intermediary.
    pub fn address(&self) -> Address {
        self.domain.verifying_contract()
    }

    pub fn domain(&self) -> &TypedDataDomain {
        &self.domain
    }

    pub fn min_principal(&self) -> U256 {
        self.min_principal
    }

    /// A copy of the allow-lists and delegations as they are now.
    pub fn snapshot(&self) -> ConfigStore {
        self.store.read().clone()
    }

    // -----------------------------------------------------------------------
    // Signature recovery
    // -----------------------------------------------------------------------

    /// Digest of a plain proposal and the key that signed it.
    pub fn recover_token_signature(
        &self,
        terms: &LoanTerms,
        signature: &Signature,
        sig_properties: &SigProperties,
        side: Side,
    ) -> (B256, Option<Address>) {
        let digest = self.domain.loan_terms_digest(terms, sig_properties, side);
        (digest, recover(digest, signature))
    }

    /// Digest of an items proposal and the key that signed it.
    pub fn recover_items_signature(
        &self,
        terms: &LoanTerms,
        signature: &Signature,
        sig_properties: &SigProperties,
        side: Side,
        items_hash: B256,
    ) -> (B256, Option<Address>) {
        let digest = self
            .domain
            .items_digest(terms, items_hash, sig_properties, side);
        (digest, recover(digest, signature))
    }

    // -----------------------------------------------------------------------
    // Delegation
    // -----------------------------------------------------------------------

    /// `caller` lets `signer` act on its behalf, or stops letting it.
    pub fn approve(
        &self,
        caller: Address,
        signer: Address,
        approved: bool,
    ) -> Result<(), AuthorizationError> {
        let delegates = {
            let mut store = self.store.write();
            store.approvals.approve(caller, signer, approved)?;
            store.approvals.delegates_of(caller).count()
        };
        info!(owner = %caller, delegate = %signer, approved, delegates, "delegation updated");
        Ok(())
    }

    pub fn is_approved(&self, owner: Address, signer: Address) -> bool {
        self.store.read().approvals.is_approved(owner, signer)
    }

    pub fn is_self_or_approved(&self, target: Address, signer: Address) -> bool {
        self.store.read().approvals.is_self_or_approved(target, signer)
    }

    /// Whether contract account `target` accepts `signature` over `digest`.
    pub fn is_approved_for_contract(
        &self,
        target: Address,
        signature: &Signature,
        digest: B256,
    ) -> bool {
        contract_signature_verdict(
            self.collaborators.contracts.as_ref(),
            target,
            digest,
            signature,
        )
        .is_accepted()
    }

    // -----------------------------------------------------------------------
    // Originations
    // -----------------------------------------------------------------------

    /// Start a loan on a plain proposal. Collateral must already be approved
    /// to the engine.
    pub fn initialize_loan(
        &self,
        caller: Address,
        request: &LoanRequest,
    ) -> Result<Origination, OriginationError> {
        self.originate(caller, request, None, None)
    }

    /// Start a loan on an items proposal.
    pub fn initialize_loan_with_items(
        &self,
        caller: Address,
        request: &LoanRequest,
        predicates: &[Predicate],
    ) -> Result<Origination, OriginationError> {
        self.originate(caller, request, None, Some(predicates))
    }

    /// Apply the borrower's collateral permit, then start a loan on a plain
    /// proposal.
    pub fn initialize_loan_with_collateral_permit(
        &self,
        caller: Address,
        request: &LoanRequest,
        permit: &CollateralPermit,
    ) -> Result<Origination, OriginationError> {
        self.originate(caller, request, Some(permit), None)
    }

    pub fn initialize_loan_with_collateral_permit_and_items(
        &self,
        caller: Address,
        request: &LoanRequest,
        permit: &CollateralPermit,
        predicates: &[Predicate],
    ) -> Result<Origination, OriginationError> {
        self.originate(caller, request, Some(permit), Some(predicates))
    }

    fn originate(
        &self,
        caller: Address,
        request: &LoanRequest,
        permit: Option<&CollateralPermit>,
        predicates: Option<&[Predicate]>,
    ) -> Result<Origination, OriginationError> {
        let _entered = self.guard.enter()?;
        let store = self.snapshot();
        let c = &self.collaborators;
        let terms = &request.terms;

        validate_loan_terms(terms, c.clock.now(), self.min_principal, &store)?;

        let parties = Counterparties {
            borrower: request.borrower,
            lender: request.lender,
        };
        let auth = self.authorize(
            &store,
            caller,
            parties,
            terms,
            &request.signature,
            &request.sig_properties,
            predicates,
        )?;

        if let Some(predicates) = predicates {
            let context = PredicateContext {
                borrower: request.borrower,
                lender: request.lender,
                collateral_address: terms.collateral_address,
                collateral_id: terms.collateral_id,
            };
            verify_predicates(&store.verifiers, c.contracts.as_ref(), &context, predicates)?;
        }

        if let Some(permit) = permit {
            self.apply_permit(terms, request.borrower, permit)?;
        }

        let amounts = origination_amounts(terms.principal, c.fees.origination_fee_bps())?;

        let engine = self.address();
        let currency = terms.payable_currency;
        let loan_id = self.with_journal(|journal| {
            journal.consume_nonce(
                auth.resolution.signing_counterparty,
                request.sig_properties.nonce,
                request.sig_properties.max_uses,
            )?;
            journal.transfer_erc20(currency, request.lender, engine, amounts.amount_from_lender)?;
            journal.transfer_collateral(
                engine,
                terms.collateral_address,
                terms.collateral_id,
                request.borrower,
                c.loan_core.custodian(),
            )?;
            journal.transfer_erc20(currency, engine, request.borrower, amounts.amount_to_borrower)?;
            journal.transfer_erc20(currency, engine, c.fees.treasury(), amounts.fee)?;

            Ok(c.loan_core.start_loan(request.lender, request.borrower, terms)?)
        })?;

        info!(
            loan_id,
            borrower = %request.borrower,
            lender = %request.lender,
            principal = %terms.principal,
            fee = %amounts.fee,
            items = predicates.is_some(),
            "loan originated"
        );

        Ok(Origination {
            loan_id,
            digest: auth.digest,
            signing_side: auth.resolution.signing_side,
            signing_counterparty: auth.resolution.signing_counterparty,
            signer: auth.signer,
            amounts,
        })
    }

    // -----------------------------------------------------------------------
    // Rollovers
    // -----------------------------------------------------------------------

    /// Replace active loan `old_loan_id` with the terms of a plain proposal.
    pub fn rollover_loan(
        &self,
        caller: Address,
        old_loan_id: LoanId,
        request: &RolloverRequest,
    ) -> Result<Rollover, OriginationError> {
        self.roll(caller, old_loan_id, request, None)
    }

    /// Replace active loan `old_loan_id` with the terms of an items proposal.
    pub fn rollover_loan_with_items(
        &self,
        caller: Address,
        old_loan_id: LoanId,
        request: &RolloverRequest,
        predicates: &[Predicate],
    ) -> Result<Rollover, OriginationError> {
        self.roll(caller, old_loan_id, request, Some(predicates))
    }

    fn roll(
        &self,
        caller: Address,
        old_loan_id: LoanId,
        request: &RolloverRequest,
        predicates: Option<&[Predicate]>,
    ) -> Result<Rollover, OriginationError> {
        let _entered = self.guard.enter()?;
        let store = self.snapshot();
        let c = &self.collaborators;
        let terms = &request.terms;

        validate_loan_terms(terms, c.clock.now(), self.min_principal, &store)?;

        let old = c.loan_core.get_loan(old_loan_id)?;
        if old.state != LoanState::Active {
            return Err(OriginationError::InvalidLoanState {
                loan_id: old_loan_id,
                state: old.state,
            });
        }
        validate_rollover(&old.terms, terms)?;

        let borrower = c.loan_core.borrower_of(old_loan_id)?;
        let old_lender = c.loan_core.lender_of(old_loan_id)?;
        let parties = Counterparties {
            borrower,
            lender: request.lender,
        };
        let auth = self.authorize(
            &store,
            caller,
            parties,
            terms,
            &request.signature,
            &request.sig_properties,
            predicates,
        )?;

        if let Some(predicates) = predicates {
            let context = PredicateContext {
                borrower,
                lender: request.lender,
                collateral_address: old.terms.collateral_address,
                collateral_id: old.terms.collateral_id,
            };
            verify_predicates(&store.verifiers, c.contracts.as_ref(), &context, predicates)?;
        }

        let amounts = rollover_amounts(
            &old,
            terms,
            request.lender,
            old_lender,
            c.fees.rollover_fee_bps(),
        )?;
        let settled_amount = amounts.settled_amount().ok_or(SettlementError::Overflow)?;

        let loan_id = self.with_journal(|journal| {
            journal.consume_nonce(
                auth.resolution.signing_counterparty,
                request.sig_properties.nonce,
                request.sig_properties.max_uses,
            )?;
            self.settle_rollover(
                journal,
                terms.payable_currency,
                borrower,
                request.lender,
                old_lender,
                &amounts,
            )?;

            Ok(c.loan_core.rollover(&RolloverEntry {
                old_loan_id,
                borrower,
                lender: request.lender,
                terms: terms.clone(),
                settled_amount,
                amount_to_old_lender: amounts.amount_to_old_lender,
                amount_to_lender: amounts.amount_to_lender,
                amount_to_borrower: amounts.amount_to_borrower,
            })?)
        })?;

        info!(
            old_loan_id,
            loan_id,
            %borrower,
            lender = %request.lender,
            repay = %amounts.repay_amount,
            need_from_borrower = %amounts.need_from_borrower,
            fee = %amounts.fee,
            "loan rolled over"
        );

        Ok(Rollover {
            old_loan_id,
            loan_id,
            digest: auth.digest,
            signing_side: auth.resolution.signing_side,
            signing_counterparty: auth.resolution.signing_counterparty,
            signer: auth.signer,
            amounts,
        })
    }

    /// Pull inflows into the engine, then pay every outflow. Zero amounts
    /// are skipped.
    fn settle_rollover(
        &self,
        journal: &mut Journal<'_>,
        currency: Address,
        borrower: Address,
        lender: Address,
        old_lender: Address,
        amounts: &RolloverAmounts,
    ) -> Result<(), OriginationError> {
        let engine = self.address();
        let treasury = self.collaborators.fees.treasury();

        let inflows = [
            (lender, amounts.amount_from_lender),
            (borrower, amounts.need_from_borrower),
        ];
        for (from, amount) in inflows {
            journal.transfer_erc20(currency, from, engine, amount)?;
        }

        let outflows = [
            (old_lender, amounts.amount_to_old_lender),
            (lender, amounts.amount_to_lender),
            (borrower, amounts.amount_to_borrower),
            (treasury, amounts.fee),
        ];
        for (to, amount) in outflows {
            journal.transfer_erc20(currency, engine, to, amount)?;
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Effects
    // -----------------------------------------------------------------------

    /// Run the effectful tail of an operation. On failure every effect
    /// already applied is undone before the error is returned.
    fn with_journal<T>(
        &self,
        effects: impl FnOnce(&mut Journal<'_>) -> Result<T, OriginationError>,
    ) -> Result<T, OriginationError> {
        let c = &self.collaborators;
        let mut journal = Journal::new(c.loan_core.as_ref(), c.custody.as_ref());
        match effects(&mut journal) {
            Ok(value) => {
                journal.commit();
                Ok(value)
            }
            Err(cause) => {
                warn!(error = %cause, effects = journal.len(), "operation failed, unwinding");
                match journal.unwind() {
                    0 => Err(cause),
                    stuck => Err(OriginationError::Unwind {
                        cause: Box::new(cause),
                        stuck,
                    }),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shared checks
    // -----------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn authorize(
        &self,
        store: &ConfigStore,
        caller: Address,
        parties: Counterparties,
        terms: &LoanTerms,
        signature: &Signature,
        sig_properties: &SigProperties,
        predicates: Option<&[Predicate]>,
    ) -> Result<Authorized, OriginationError> {
        let resolver =
            AuthorizationResolver::new(&store.approvals, self.collaborators.contracts.as_ref());
        let side = resolver.signing_side(parties.borrower, caller);

        let (digest, signer) = match predicates {
            Some(predicates) => self.recover_items_signature(
                terms,
                signature,
                sig_properties,
                side,
                items_hash(predicates),
            ),
            None => self.recover_token_signature(terms, signature, sig_properties, side),
        };
        debug!(%caller, %side, %digest, ?signer, "proposal signature recovered");

        let resolution = resolver
            .resolve(parties, caller, signer, signature, digest)
            .map_err(|e| {
                warn!(%caller, error = %e, "authorization rejected");
                e
            })?;

        Ok(Authorized {
            digest,
            signer,
            resolution,
        })
    }

    fn apply_permit(
        &self,
        terms: &LoanTerms,
        borrower: Address,
        permit: &CollateralPermit,
    ) -> Result<(), OriginationError> {
        self.collaborators
            .custody
            .permit_collateral(
                terms.collateral_address,
                terms.collateral_id,
                borrower,
                self.address(),
                permit.deadline,
                &permit.signature,
            )
            .map_err(|e| AuthorizationError::InvalidCollateralPermit(e.to_string()).into())
    }

    // -----------------------------------------------------------------------
    // Allow-lists
    // -----------------------------------------------------------------------

    fn update_list(
        &self,
        caller: Address,
        kind: ListKind,
        update: impl FnOnce(&mut AllowList) -> Result<(), AdminError>,
    ) -> Result<(), AdminError> {
        let mut store = self.store.write();
        store.require_admin(caller)?;
        update(store.list_mut(kind))?;
        info!(admin = %caller, list = %kind, size = store.list(kind).len(), "allow-list updated");
        Ok(())
    }

    pub fn set_allowed_verifiers(
        &self,
        caller: Address,
        verifiers: &[Address],
        allowed: &[bool],
    ) -> Result<(), AdminError> {
        self.update_list(caller, ListKind::Verifier, |list| list.set(verifiers, allowed))
    }

    pub fn allow_verifiers(&self, caller: Address, verifiers: &[Address]) -> Result<(), AdminError> {
        self.update_list(caller, ListKind::Verifier, |list| list.allow(verifiers))
    }

    pub fn remove_allowed_verifiers(
        &self,
        caller: Address,
        verifiers: &[Address],
    ) -> Result<(), AdminError> {
        self.update_list(caller, ListKind::Verifier, |list| list.remove(verifiers))
    }

    pub fn is_allowed_verifier(&self, verifier: Address) -> bool {
        self.store.read().verifiers.contains(verifier)
    }

    pub fn set_allowed_currencies(
        &self,
        caller: Address,
        currencies: &[Address],
        allowed: &[bool],
    ) -> Result<(), AdminError> {
        self.update_list(caller, ListKind::Currency, |list| list.set(currencies, allowed))
    }

    pub fn allow_currencies(&self, caller: Address, currencies: &[Address]) -> Result<(), AdminError> {
        self.update_list(caller, ListKind::Currency, |list| list.allow(currencies))
    }

    pub fn remove_allowed_currencies(
        &self,
        caller: Address,
        currencies: &[Address],
    ) -> Result<(), AdminError> {
        self.update_list(caller, ListKind::Currency, |list| list.remove(currencies))
    }

    pub fn is_allowed_currency(&self, currency: Address) -> bool {
        self.store.read().currencies.contains(currency)
    }

    pub fn set_allowed_collateral(
        &self,
        caller: Address,
        collateral: &[Address],
        allowed: &[bool],
    ) -> Result<(), AdminError> {
        self.update_list(caller, ListKind::Collateral, |list| list.set(collateral, allowed))
    }

    pub fn allow_collateral(&self, caller: Address, collateral: &[Address]) -> Result<(), AdminError> {
        self.update_list(caller, ListKind::Collateral, |list| list.allow(collateral))
    }

    pub fn remove_allowed_collateral(
        &self,
        caller: Address,
        collateral: &[Address],
    ) -> Result<(), AdminError> {
        self.update_list(caller, ListKind::Collateral, |list| list.remove(collateral))
    }

    pub fn is_allowed_collateral(&self, collateral: Address) -> bool {
        self.store.read().collateral.contains(collateral)
    }
}
