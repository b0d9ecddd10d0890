//! # Pledge Origination Engine
//!
//! The stateful half of the protocol: the gate every new loan and every
//! rollover passes through. It validates proposed terms, works out who had
//! to sign, checks that the signer and the submitter really represent
//! opposite sides, runs collateral predicates, and hands settlement
//! instructions to the collaborators that actually hold money and loans.
//!
//! - **origination** — `OriginationController`, the public entry points.
//! - **authorization** — counterparty rules and the contract-signature oracle.
//! - **predicates** / **verifiers** — collateral predicate checks and the
//!   verifiers that ship with the engine.
//! - **allowlist** / **approvals** / **store** — admin-owned state.
//! - **collaborators** — traits for the ledger, fees, custody, contract code
//!   and time.
//! - **memory** — in-memory collaborators for tooling and tests.
//!
//! ## Design Principles
//!
//! 1. Every check runs before any state changes. The nonce is the first
//!    thing consumed and only after the last check passes.
//! 2. An operation completes or leaves nothing behind. Effects after the
//!    nonce are journaled and undone if a later step fails.
//! 3. Contract code is an untrusted oracle. Its failures reject a proposal;
//!    they never take the engine down.
//! 4. One snapshot of admin state per operation.
//! 5. Errors say which rule failed and for whom.

pub mod allowlist;
pub mod approvals;
pub mod authorization;
pub mod collaborators;
pub mod error;
pub mod guard;
mod journal;
pub mod memory;
pub mod origination;
pub mod predicates;
pub mod store;
pub mod verifiers;

pub use error::OriginationError;
pub use origination::{
    CollateralPermit, Collaborators, LoanRequest, Origination, OriginationController, Rollover,
    RolloverRequest,
};
