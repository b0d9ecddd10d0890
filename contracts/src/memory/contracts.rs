//! Address-to-code registry and a minimal smart-account validator.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use parking_lot::RwLock;
use pledge_protocol::config::ERC1271_MAGIC_VALUE;
use pledge_protocol::crypto::{recover, Signature};

use crate::collaborators::{
    ContractDirectory, ContractSignatureValidator, ExternalCallError, PredicateVerifier,
};

/// Code deployed at addresses, registered by hand.
#[derive(Default)]
pub struct ContractRegistry {
    validators: RwLock<HashMap<Address, Arc<dyn ContractSignatureValidator>>>,
    verifiers: RwLock<HashMap<Address, Arc<dyn PredicateVerifier>>>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `account` a contract account that validates signatures with `validator`.
    pub fn deploy_account(&self, account: Address, validator: Arc<dyn ContractSignatureValidator>) {
        self.validators.write().insert(account, validator);
    }

    /// Deploy predicate verifier code at `address`.
    pub fn deploy_verifier(&self, address: Address, verifier: Arc<dyn PredicateVerifier>) {
        self.verifiers.write().insert(address, verifier);
    }

    pub fn is_contract(&self, account: Address) -> bool {
        self.validators.read().contains_key(&account) || self.verifiers.read().contains_key(&account)
    }
}

impl ContractDirectory for ContractRegistry {
    fn signature_validator(&self, account: Address) -> Option<Arc<dyn ContractSignatureValidator>> {
        self.validators.read().get(&account).cloned()
    }

    fn predicate_verifier(&self, verifier: Address) -> Option<Arc<dyn PredicateVerifier>> {
        self.verifiers.read().get(&verifier).cloned()
    }
}

/// A smart account controlled by one key: it accepts exactly the signatures
/// its owner produced over the digest.
///
/// Any suffix after `r ‖ s ‖ v` is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnedAccount {
    pub owner: Address,
}

impl OwnedAccount {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }
}

impl ContractSignatureValidator for OwnedAccount {
    fn is_valid_signature(
        &self,
        digest: B256,
        signature: &[u8],
    ) -> Result<Vec<u8>, ExternalCallError> {
        let signature = Signature::from_packed(signature)
            .map_err(|e| ExternalCallError::Reverted(e.to_string()))?;
        let base = Signature::new(signature.v, signature.r, signature.s);

        let mut word = vec![0u8; 32];
        if recover(digest, &base) == Some(self.owner) {
            word[..4].copy_from_slice(&ERC1271_MAGIC_VALUE);
        }
        Ok(word)
    }
}
