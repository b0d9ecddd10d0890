//! # Predicate Verifiers
//!
//! Verifiers that ship with the engine. Both expect the collateral on offer to
//! be a vault minted by a vault factory (or, for collection-wide offers, a
//! plain token of the collection), and both read holdings through
//! [`AssetView`](crate::collaborators::AssetView).
//!
//! Payloads are bincode-encoded. Use the `encode_*` helpers when building a
//! [`Predicate`](pledge_protocol::loan::Predicate) so signer and verifier agree
//! on the bytes.

pub mod collection;
pub mod items;

pub use collection::{encode_collection, CollectionWideOfferVerifier};
pub use items::{decode_items, encode_items, CollateralType, ItemsVerifier, SignatureItem};

use crate::collaborators::ExternalCallError;

/// A payload that does not decode makes the verifier revert.
pub(crate) fn undecodable(e: bincode::Error) -> ExternalCallError {
    ExternalCallError::Reverted(format!("undecodable predicate payload: {}", e))
}
