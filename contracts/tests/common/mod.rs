//! Shared fixtures: an engine wired to in-memory collaborators, two funded
//! counterparties and helpers for signing proposals.

#![allow(dead_code)]

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use pledge_contracts::collaborators::AssetCustody;
use pledge_contracts::memory::{
    AssetLedger, ContractRegistry, FixedClock, FixedFees, InMemoryLoanCore,
};
use pledge_contracts::verifiers::{CollectionWideOfferVerifier, ItemsVerifier};
use pledge_contracts::{Collaborators, LoanRequest, Origination, OriginationController};
use pledge_protocol::config::{DomainConfig, EngineConfig, MIN_INTEREST_RATE};
use pledge_protocol::crypto::{LocalSigner, Signature};
use pledge_protocol::loan::{LoanTerms, Predicate, Side, SigProperties};

pub const NOW: u64 = 1_700_000_000;
pub const DAY: u64 = 86_400;

pub const ENGINE: Address = Address::repeat_byte(0xEE);
pub const CUSTODIAN: Address = Address::repeat_byte(0xCC);
pub const TREASURY: Address = Address::repeat_byte(0x7E);
pub const ADMIN: Address = Address::repeat_byte(0xAD);

pub const USDC: Address = Address::repeat_byte(0x20);
pub const PUNKS: Address = Address::repeat_byte(0x21);
pub const VAULT_FACTORY: Address = Address::repeat_byte(0xF0);

pub const ITEMS_VERIFIER: Address = Address::repeat_byte(0x1A);
pub const COLLECTION_VERIFIER: Address = Address::repeat_byte(0x1B);

pub const STARTING_BALANCE: u64 = 1_000_000_000;

pub fn u(v: u64) -> U256 {
    U256::from(v)
}

pub fn config() -> EngineConfig {
    EngineConfig {
        domain: DomainConfig {
            chain_id: 31337,
            verifying_contract: ENGINE,
            ..DomainConfig::default()
        },
        min_principal: u(100),
        admin: ADMIN,
        allowed_currencies: vec![USDC],
        allowed_collateral: vec![PUNKS, VAULT_FACTORY],
        allowed_verifiers: vec![ITEMS_VERIFIER, COLLECTION_VERIFIER],
    }
}

pub struct Harness {
    pub engine: Arc<OriginationController>,
    pub loan_core: Arc<InMemoryLoanCore>,
    pub assets: Arc<AssetLedger>,
    pub registry: Arc<ContractRegistry>,
    pub clock: Arc<FixedClock>,
    pub borrower: LocalSigner,
    pub lender: LocalSigner,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_fees(FixedFees::zero(TREASURY))
    }

    pub fn with_fees(fees: FixedFees) -> Self {
        Self::build(fees, None)
    }

    /// Wire the engine with `custody` in place of the asset ledger.
    pub fn build(fees: FixedFees, custody: Option<Arc<dyn AssetCustody>>) -> Self {
        let clock = Arc::new(FixedClock::new(NOW));
        let assets = Arc::new(AssetLedger::new().with_chain_id(31337).with_clock(clock.clone()));
        let loan_core = Arc::new(InMemoryLoanCore::new(CUSTODIAN, clock.clone()));
        let registry = Arc::new(ContractRegistry::new());
        registry.deploy_verifier(ITEMS_VERIFIER, Arc::new(ItemsVerifier::new(assets.clone())));
        registry.deploy_verifier(
            COLLECTION_VERIFIER,
            Arc::new(CollectionWideOfferVerifier::new(assets.clone())),
        );

        let collaborators = Collaborators {
            loan_core: loan_core.clone(),
            fees: Arc::new(fees),
            custody: custody.unwrap_or_else(|| assets.clone() as Arc<dyn AssetCustody>),
            contracts: registry.clone(),
            clock: clock.clone(),
        };
        let engine = Arc::new(OriginationController::new(&config(), collaborators).unwrap());

        let borrower = LocalSigner::generate();
        let lender = LocalSigner::generate();
        assets.mint_erc20(USDC, lender.address(), u(STARTING_BALANCE));
        assets.mint_erc20(USDC, borrower.address(), u(STARTING_BALANCE));

        Self {
            engine,
            loan_core,
            assets,
            registry,
            clock,
            borrower,
            lender,
        }
    }

    /// A second engine over the same ledger, contracts and clock, moving
    /// assets through `custody`. No fees.
    pub fn engine_with_custody(&self, custody: Arc<dyn AssetCustody>) -> Arc<OriginationController> {
        let collaborators = Collaborators {
            loan_core: self.loan_core.clone(),
            fees: Arc::new(FixedFees::zero(TREASURY)),
            custody,
            contracts: self.registry.clone(),
            clock: self.clock.clone(),
        };
        Arc::new(OriginationController::new(&config(), collaborators).unwrap())
    }

    /// 100 USDC for 30 days at 5% against punk `id`.
    pub fn terms(&self, id: u64) -> LoanTerms {
        LoanTerms {
            duration_secs: 30 * DAY,
            principal: u(100),
            interest_rate: MIN_INTEREST_RATE * u(5),
            collateral_address: PUNKS,
            collateral_id: u(id),
            payable_currency: USDC,
            deadline: NOW + 3_600,
            affiliate_code: B256::ZERO,
        }
    }

    /// Give punk `id` to the borrower and let the engine move it.
    pub fn mint_collateral(&self, id: u64) {
        self.assets.mint_nft(PUNKS, u(id), self.borrower.address());
        self.assets
            .set_approval_for_all(self.borrower.address(), PUNKS, ENGINE, true);
    }

    pub fn balance(&self, owner: Address) -> U256 {
        use pledge_contracts::collaborators::AssetView;
        self.assets.erc20_balance_of(USDC, owner)
    }

    pub fn sign(
        &self,
        signer: &LocalSigner,
        terms: &LoanTerms,
        props: &SigProperties,
        side: Side,
    ) -> Signature {
        let digest = self.engine.domain().loan_terms_digest(terms, props, side);
        signer.sign_digest(digest).unwrap()
    }

    pub fn sign_items(
        &self,
        signer: &LocalSigner,
        terms: &LoanTerms,
        predicates: &[Predicate],
        props: &SigProperties,
        side: Side,
    ) -> Signature {
        let digest = self
            .engine
            .domain()
            .items_digest_for(terms, predicates, props, side);
        signer.sign_digest(digest).unwrap()
    }

    pub fn request(&self, terms: LoanTerms, signature: Signature, props: SigProperties) -> LoanRequest {
        LoanRequest {
            terms,
            borrower: self.borrower.address(),
            lender: self.lender.address(),
            signature,
            sig_properties: props,
        }
    }

    /// The common path: lender signs, borrower submits.
    pub fn lender_signed_request(&self, id: u64, nonce: u64) -> LoanRequest {
        let terms = self.terms(id);
        let props = SigProperties::single_use(nonce);
        let signature = self.sign(&self.lender, &terms, &props, Side::Lend);
        self.request(terms, signature, props)
    }

    /// Mint punk `id` and originate a loan against it.
    pub fn originate(&self, id: u64, nonce: u64) -> Origination {
        self.mint_collateral(id);
        let request = self.lender_signed_request(id, nonce);
        self.engine
            .initialize_loan(self.borrower.address(), &request)
            .unwrap()
    }
}
