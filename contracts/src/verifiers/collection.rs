//! Collection-wide offers: "any token of collection X", whether offered bare
//! or inside a vault.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};

use super::undecodable;
use crate::collaborators::{AssetView, ExternalCallError, PredicateContext, PredicateVerifier};

/// Payload naming the collection.
pub fn encode_collection(collection: Address) -> Result<Bytes, bincode::Error> {
    bincode::serialize(&collection).map(Bytes::from)
}

pub struct CollectionWideOfferVerifier {
    assets: Arc<dyn AssetView>,
}

impl CollectionWideOfferVerifier {
    pub fn new(assets: Arc<dyn AssetView>) -> Self {
        Self { assets }
    }
}

impl PredicateVerifier for CollectionWideOfferVerifier {
    fn verify(&self, context: &PredicateContext, data: &[u8]) -> Result<bool, ExternalCallError> {
        let collection: Address = bincode::deserialize(data).map_err(undecodable)?;

        // Bare token of the collection.
        if context.collateral_address == collection {
            return Ok(true);
        }

        let vault = self
            .assets
            .instance_at(context.collateral_address, context.collateral_id)
            .ok_or_else(|| {
                ExternalCallError::Reverted(format!(
                    "{} is neither {} nor a vault factory",
                    context.collateral_address, collection
                ))
            })?;

        Ok(self.assets.erc721_balance_of(collection, vault) > U256::ZERO)
    }
}
