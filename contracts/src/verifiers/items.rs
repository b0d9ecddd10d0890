//! Items verifier: the vault offered as collateral must hold every listed
//! item.
//!
//! | Kind    | Passes when                                      | Reverts when                 |
//! |---------|--------------------------------------------------|------------------------------|
//! | ERC-721 | vault owns `token_id`, or any token if wildcard | -                            |
//! | ERC-1155| vault balance of `token_id` ≥ `amount`          | `amount == 0`, wildcard      |
//! | ERC-20  | vault balance ≥ `amount`                        | `amount == 0`, wildcard      |
//!
//! An empty item list, a zero asset address, or collateral that is not a
//! vault also reverts.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::undecodable;
use crate::collaborators::{AssetView, ExternalCallError, PredicateContext, PredicateVerifier};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollateralType {
    Erc721,
    Erc1155,
    Erc20,
}

/// One asset the vault must hold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureItem {
    pub collateral_type: CollateralType,
    pub asset: Address,
    /// Ignored for ERC-20.
    pub token_id: U256,
    /// Minimum balance. Ignored for ERC-721.
    pub amount: U256,
    /// ERC-721 only: any token of the collection will do.
    pub any_id_allowed: bool,
}

impl SignatureItem {
    pub fn erc721(asset: Address, token_id: U256) -> Self {
        Self {
            collateral_type: CollateralType::Erc721,
            asset,
            token_id,
            amount: U256::ZERO,
            any_id_allowed: false,
        }
    }

    /// Any token of `asset`.
    pub fn erc721_any(asset: Address) -> Self {
        Self {
            any_id_allowed: true,
            ..Self::erc721(asset, U256::ZERO)
        }
    }

    pub fn erc1155(asset: Address, token_id: U256, amount: U256) -> Self {
        Self {
            collateral_type: CollateralType::Erc1155,
            asset,
            token_id,
            amount,
            any_id_allowed: false,
        }
    }

    pub fn erc20(asset: Address, amount: U256) -> Self {
        Self {
            collateral_type: CollateralType::Erc20,
            asset,
            token_id: U256::ZERO,
            amount,
            any_id_allowed: false,
        }
    }
}

pub fn encode_items(items: &[SignatureItem]) -> Result<Bytes, bincode::Error> {
    bincode::serialize(items).map(Bytes::from)
}

pub fn decode_items(data: &[u8]) -> Result<Vec<SignatureItem>, bincode::Error> {
    bincode::deserialize(data)
}

/// Checks vault holdings against a list of [`SignatureItem`]s.
pub struct ItemsVerifier {
    assets: Arc<dyn AssetView>,
}

impl ItemsVerifier {
    pub fn new(assets: Arc<dyn AssetView>) -> Self {
        Self { assets }
    }

    fn holds(&self, vault: Address, item: &SignatureItem) -> Result<bool, ExternalCallError> {
        if item.asset == Address::ZERO {
            return Err(ExternalCallError::Reverted("item missing asset address".into()));
        }

        match item.collateral_type {
            CollateralType::Erc721 => {
                if item.any_id_allowed {
                    Ok(self.assets.erc721_balance_of(item.asset, vault) > U256::ZERO)
                } else {
                    Ok(self.assets.owner_of(item.asset, item.token_id) == Some(vault))
                }
            }
            CollateralType::Erc1155 => {
                if item.amount.is_zero() {
                    return Err(ExternalCallError::Reverted(format!(
                        "no amount for {}",
                        item.asset
                    )));
                }
                if item.any_id_allowed {
                    return Err(ExternalCallError::Reverted(format!(
                        "wildcard not allowed for {}",
                        item.asset
                    )));
                }
                Ok(self.assets.erc1155_balance_of(item.asset, vault, item.token_id) >= item.amount)
            }
            CollateralType::Erc20 => {
                if item.amount.is_zero() {
                    return Err(ExternalCallError::Reverted(format!(
                        "no amount for {}",
                        item.asset
                    )));
                }
                if item.any_id_allowed {
                    return Err(ExternalCallError::Reverted(format!(
                        "wildcard not allowed for {}",
                        item.asset
                    )));
                }
                Ok(self.assets.erc20_balance_of(item.asset, vault) >= item.amount)
            }
        }
    }
}

impl PredicateVerifier for ItemsVerifier {
    fn verify(&self, context: &PredicateContext, data: &[u8]) -> Result<bool, ExternalCallError> {
        let items = decode_items(data).map_err(undecodable)?;
        if items.is_empty() {
            return Err(ExternalCallError::Reverted("no items".into()));
        }

        let vault = self
            .assets
            .instance_at(context.collateral_address, context.collateral_id)
            .ok_or_else(|| {
                ExternalCallError::Reverted(format!(
                    "{}#{} is not a vault",
                    context.collateral_address, context.collateral_id
                ))
            })?;

        for item in &items {
            if !self.holds(vault, item)? {
                debug!(%vault, asset = %item.asset, "vault is missing an item");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
