//! In-memory asset ledger: fungible balances, NFT ownership, ERC-1155
//! balances and the vault registry, plus collateral approvals.
//!
//! Fungible transfers are not allowance-checked. Collateral transfers are:
//! the operator must own the token or hold an approval for it, either granted
//! directly or through an owner-signed permit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{keccak256, Address, B256, U256};
use parking_lot::Mutex;
use pledge_protocol::config::DomainConfig;
use pledge_protocol::crypto::eip712::hash_typed_data;
use pledge_protocol::crypto::hash::WordEncoder;
use pledge_protocol::crypto::{recover, Signature, TypedDataDomain};
use tracing::debug;

use crate::collaborators::{AssetCustody, AssetView, Clock, CustodyError};

const PERMIT_TYPE: &str =
    "Permit(address owner,address spender,uint256 tokenId,uint256 nonce,uint256 deadline)";

/// Digest an owner signs to approve `spender` for collateral `id`.
///
/// Domain: `"AssetVault"`, version `"1"`, bound to the collateral contract.
pub fn collateral_permit_digest(
    chain_id: u64,
    collateral: Address,
    owner: Address,
    spender: Address,
    id: U256,
    nonce: u64,
    deadline: u64,
) -> B256 {
    let domain = TypedDataDomain::new(DomainConfig {
        name: "AssetVault".to_string(),
        version: "1".to_string(),
        chain_id,
        verifying_contract: collateral,
    });
    let struct_hash = WordEncoder::with_capacity(6)
        .word(keccak256(PERMIT_TYPE.as_bytes()))
        .address(owner)
        .address(spender)
        .uint(id)
        .uint64(nonce)
        .uint64(deadline)
        .finish();
    hash_typed_data(domain.separator(), struct_hash)
}

#[derive(Debug, Default)]
struct Holdings {
    erc20: HashMap<(Address, Address), U256>,
    nft_owner: HashMap<(Address, U256), Address>,
    erc1155: HashMap<(Address, Address, U256), U256>,
    vaults: HashMap<(Address, U256), Address>,
    /// `(collateral, id) -> approved operator`
    token_approvals: HashMap<(Address, U256), Address>,
    /// `(collateral, owner, operator)`
    operators: HashSet<(Address, Address, Address)>,
    permit_nonces: HashMap<(Address, Address), u64>,
}

impl Holdings {
    fn erc20_balance(&self, token: Address, owner: Address) -> U256 {
        self.erc20.get(&(token, owner)).copied().unwrap_or(U256::ZERO)
    }
}

pub struct AssetLedger {
    chain_id: u64,
    clock: Option<Arc<dyn Clock>>,
    holdings: Mutex<Holdings>,
}

impl Default for AssetLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetLedger {
    /// A ledger on chain 1 that does not check permit deadlines.
    pub fn new() -> Self {
        Self {
            chain_id: 1,
            clock: None,
            holdings: Mutex::new(Holdings::default()),
        }
    }

    /// Check permit deadlines against `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn mint_erc20(&self, token: Address, to: Address, amount: U256) {
        let mut holdings = self.holdings.lock();
        let balance = holdings.erc20.entry((token, to)).or_insert(U256::ZERO);
        *balance = balance.saturating_add(amount);
    }

    /// Mint (or reassign) token `id` of `collection` to `to`.
    pub fn mint_nft(&self, collection: Address, id: U256, to: Address) {
        let mut holdings = self.holdings.lock();
        holdings.nft_owner.insert((collection, id), to);
        holdings.token_approvals.remove(&(collection, id));
    }

    pub fn mint_erc1155(&self, token: Address, to: Address, id: U256, amount: U256) {
        let mut holdings = self.holdings.lock();
        let balance = holdings.erc1155.entry((token, to, id)).or_insert(U256::ZERO);
        *balance = balance.saturating_add(amount);
    }

    /// Register `vault` as the instance behind `factory` token `id`.
    pub fn register_vault(&self, factory: Address, id: U256, vault: Address) {
        self.holdings.lock().vaults.insert((factory, id), vault);
    }

    /// Owner approves `operator` for a single token.
    pub fn approve_collateral(
        &self,
        owner: Address,
        collateral: Address,
        id: U256,
        operator: Address,
    ) -> Result<(), CustodyError> {
        let mut holdings = self.holdings.lock();
        if holdings.nft_owner.get(&(collateral, id)) != Some(&owner) {
            return Err(CustodyError::NotOwner {
                collateral,
                id,
                from: owner,
            });
        }
        holdings.token_approvals.insert((collateral, id), operator);
        Ok(())
    }

    /// Owner approves `operator` for every token of `collateral`.
    pub fn set_approval_for_all(&self, owner: Address, collateral: Address, operator: Address, approved: bool) {
        let mut holdings = self.holdings.lock();
        if approved {
            holdings.operators.insert((collateral, owner, operator));
        } else {
            holdings.operators.remove(&(collateral, owner, operator));
        }
    }

    pub fn permit_nonce(&self, collateral: Address, owner: Address) -> u64 {
        self.holdings
            .lock()
            .permit_nonces
            .get(&(collateral, owner))
            .copied()
            .unwrap_or(0)
    }
}

impl AssetCustody for AssetLedger {
    fn transfer_erc20(
        &self,
        currency: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), CustodyError> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut holdings = self.holdings.lock();
        let available = holdings.erc20_balance(currency, from);
        if available < amount {
            return Err(CustodyError::InsufficientBalance {
                token: currency,
                owner: from,
                required: amount,
                available,
            });
        }
        holdings.erc20.insert((currency, from), available - amount);
        let credit = holdings.erc20_balance(currency, to).saturating_add(amount);
        holdings.erc20.insert((currency, to), credit);
        debug!(%currency, %from, %to, %amount, "erc20 transfer");
        Ok(())
    }

    fn transfer_collateral(
        &self,
        operator: Address,
        collateral: Address,
        id: U256,
        from: Address,
        to: Address,
    ) -> Result<(), CustodyError> {
        let mut holdings = self.holdings.lock();
        if holdings.nft_owner.get(&(collateral, id)) != Some(&from) {
            return Err(CustodyError::NotOwner { collateral, id, from });
        }

        let approved = operator == from
            || holdings.token_approvals.get(&(collateral, id)) == Some(&operator)
            || holdings.operators.contains(&(collateral, from, operator));
        if !approved {
            return Err(CustodyError::NotApproved {
                collateral,
                id,
                operator,
            });
        }

        holdings.nft_owner.insert((collateral, id), to);
        holdings.token_approvals.remove(&(collateral, id));
        debug!(%collateral, %id, %from, %to, "collateral transfer");
        Ok(())
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
        if let Some(clock) = &self.clock {
            let now = clock.now();
            if deadline < now {
                return Err(CustodyError::PermitRejected(format!(
                    "expired at {} (now {})",
                    deadline, now
                )));
            }
        }

        let mut holdings = self.holdings.lock();
        if holdings.nft_owner.get(&(collateral, id)) != Some(&owner) {
            return Err(CustodyError::NotOwner {
                collateral,
                id,
                from: owner,
            });
        }

        let nonce = holdings
            .permit_nonces
            .get(&(collateral, owner))
            .copied()
            .unwrap_or(0);
        let digest =
            collateral_permit_digest(self.chain_id, collateral, owner, spender, id, nonce, deadline);
        match recover(digest, signature) {
            Some(signer) if signer == owner => {}
            Some(signer) => {
                return Err(CustodyError::PermitRejected(format!(
                    "signed by {}, not the owner",
                    signer
                )))
            }
            None => return Err(CustodyError::PermitRejected("malformed signature".into())),
        }

        holdings.permit_nonces.insert((collateral, owner), nonce + 1);
        holdings.token_approvals.insert((collateral, id), spender);
        debug!(%collateral, %id, %owner, %spender, "collateral permit applied");
        Ok(())
    }
}

impl AssetView for AssetLedger {
    fn instance_at(&self, factory: Address, id: U256) -> Option<Address> {
        self.holdings.lock().vaults.get(&(factory, id)).copied()
    }

    fn owner_of(&self, token: Address, id: U256) -> Option<Address> {
        self.holdings.lock().nft_owner.get(&(token, id)).copied()
    }

    fn erc721_balance_of(&self, token: Address, owner: Address) -> U256 {
        let count = self
            .holdings
            .lock()
            .nft_owner
            .iter()
            .filter(|((collection, _), holder)| *collection == token && **holder == owner)
            .count();
        U256::from(count)
    }

    fn erc1155_balance_of(&self, token: Address, owner: Address, id: U256) -> U256 {
        self.holdings
            .lock()
            .erc1155
            .get(&(token, owner, id))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn erc20_balance_of(&self, token: Address, owner: Address) -> U256 {
        self.holdings.lock().erc20_balance(token, owner)
    }
}
