//! The engine's persistent, admin-owned state: allow-lists and delegations.
//!
//! The controller keeps one `ConfigStore` behind a lock and clones it at the
//! start of every operation, so everything an authorization reads comes from
//! a single consistent view.

use alloy_primitives::Address;
use pledge_protocol::config::EngineConfig;
use pledge_protocol::loan::TermsAllowList;
use serde::{Deserialize, Serialize};

use crate::allowlist::{AdminError, AllowList, ListKind};
use crate::approvals::ApprovalRelation;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStore {
    pub admin: Address,
    pub currencies: AllowList,
    pub collateral: AllowList,
    pub verifiers: AllowList,
    pub approvals: ApprovalRelation,
}

impl ConfigStore {
    /// Empty lists, no delegations.
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            currencies: AllowList::new(ListKind::Currency),
            collateral: AllowList::new(ListKind::Collateral),
            verifiers: AllowList::new(ListKind::Verifier),
            approvals: ApprovalRelation::new(),
        }
    }

    /// Seed the lists from a deployment config.
    pub fn from_config(config: &EngineConfig) -> Result<Self, AdminError> {
        Ok(Self {
            admin: config.admin,
            currencies: AllowList::seeded(ListKind::Currency, &config.allowed_currencies)?,
            collateral: AllowList::seeded(ListKind::Collateral, &config.allowed_collateral)?,
            verifiers: AllowList::seeded(ListKind::Verifier, &config.allowed_verifiers)?,
            approvals: ApprovalRelation::new(),
        })
    }

    pub fn require_admin(&self, caller: Address) -> Result<(), AdminError> {
        if caller != self.admin {
            return Err(AdminError::NotAdmin(caller));
        }
        Ok(())
    }

    pub fn list(&self, kind: ListKind) -> &AllowList {
        match kind {
            ListKind::Currency => &self.currencies,
            ListKind::Collateral => &self.collateral,
            ListKind::Verifier => &self.verifiers,
        }
    }

    pub fn list_mut(&mut self, kind: ListKind) -> &mut AllowList {
        match kind {
            ListKind::Currency => &mut self.currencies,
            ListKind::Collateral => &mut self.collateral,
            ListKind::Verifier => &mut self.verifiers,
        }
    }
}

impl TermsAllowList for ConfigStore {
    fn is_currency_allowed(&self, currency: Address) -> bool {
        self.currencies.contains(currency)
    }

    fn is_collateral_allowed(&self, collateral: Address) -> bool {
        self.collateral.contains(collateral)
    }
}
