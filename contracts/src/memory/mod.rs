//! # In-Memory Collaborators
//!
//! Reference implementations of every collaborator trait, backed by plain
//! maps behind `parking_lot` locks. The CLI and the integration tests run the
//! engine against these. They keep the invariants the engine relies on
//! (nonce accounting, collateral ownership, vault lookup) and nothing more.

pub mod assets;
pub mod clock;
pub mod contracts;
pub mod loan_core;

pub use assets::{collateral_permit_digest, AssetLedger};
pub use clock::{FixedClock, SystemClock};
pub use contracts::{ContractRegistry, OwnedAccount};
pub use loan_core::InMemoryLoanCore;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::collaborators::FeeController;

/// A fee schedule that never changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedFees {
    pub origination_bps: u64,
    pub rollover_bps: u64,
    pub treasury: Address,
}

impl FixedFees {
    /// No fees at all.
    pub fn zero(treasury: Address) -> Self {
        Self {
            origination_bps: 0,
            rollover_bps: 0,
            treasury,
        }
    }
}

impl FeeController for FixedFees {
    fn origination_fee_bps(&self) -> u64 {
        self.origination_bps
    }

    fn rollover_fee_bps(&self) -> u64 {
        self.rollover_bps
    }

    fn treasury(&self) -> Address {
        self.treasury
    }
}
