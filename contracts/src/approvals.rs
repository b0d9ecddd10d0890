//! Delegation: an owner lets another account sign or submit proposals on
//! its behalf.

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::authorization::AuthorizationError;

/// `owner -> {delegates}`. Only the owner can grant or revoke.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRelation {
    grants: BTreeMap<Address, BTreeSet<Address>>,
}

impl ApprovalRelation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant or revoke `delegate` acting for `owner`.
    pub fn approve(
        &mut self,
        owner: Address,
        delegate: Address,
        approved: bool,
    ) -> Result<(), AuthorizationError> {
        if owner == delegate {
            return Err(AuthorizationError::SelfApprove(owner));
        }

        if approved {
            self.grants.entry(owner).or_default().insert(delegate);
        } else if let Some(delegates) = self.grants.get_mut(&owner) {
            delegates.remove(&delegate);
            if delegates.is_empty() {
                self.grants.remove(&owner);
            }
        }
        Ok(())
    }

    pub fn is_approved(&self, owner: Address, delegate: Address) -> bool {
        self.grants
            .get(&owner)
            .is_some_and(|delegates| delegates.contains(&delegate))
    }

    /// `account` is `target` itself or one of its delegates.
    pub fn is_self_or_approved(&self, target: Address, account: Address) -> bool {
        target == account || self.is_approved(target, account)
    }

    pub fn delegates_of(&self, owner: Address) -> impl Iterator<Item = &Address> {
        self.grants.get(&owner).into_iter().flatten()
    }
}
