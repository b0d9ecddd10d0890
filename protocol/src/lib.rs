// Copyright (c) 2026 Pledge Contributors. MIT License.
// See LICENSE for details.

//! # Pledge Protocol — Core Library
//!
//! The pure half of a peer-to-peer collateralized lending protocol. Two
//! counterparties agree on loan terms off-line, one of them signs, the other
//! submits, and everything in this crate is what both sides (and the engine
//! between them) must compute identically:
//!
//! - **config** — protocol bounds, denominators and the signing domain.
//! - **crypto** — keccak, EIP-712 digests, secp256k1 recovery, local keys.
//! - **loan** — loan value types, term validation and settlement arithmetic.
//!
//! Nothing here holds state or talks to the outside world. The stateful
//! engine, its allow-lists and its collaborators live in `pledge-contracts`.
//!
//! ## Design Philosophy
//!
//! 1. Fail closed. A malformed signature recovers to nobody, not to zero.
//! 2. Checked arithmetic everywhere money is involved.
//! 3. One canonical typed-data layout per domain version.

pub mod config;
pub mod crypto;
pub mod loan;
