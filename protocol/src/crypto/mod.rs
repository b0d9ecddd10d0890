//! # Cryptographic Primitives
//!
//! Everything the engine needs to turn loan terms into a signed commitment
//! and back into an address:
//!
//! - **Keccak-256** and ABI word encoding (`hash`).
//! - **EIP-712** typed-data digests for both proposal shapes (`eip712`).
//! - **secp256k1** recovery with strict malleability rules (`signatures`).
//! - Local **signing keys** for tooling and tests (`keys`).
//!
//! Nothing here is novel. Each function is a thin, typed wrapper around
//! `alloy-primitives` and `k256`.

pub mod eip712;
pub mod hash;
pub mod keys;
pub mod signatures;

pub use eip712::{items_hash, DigestShape, TypedDataDomain};
pub use hash::{keccak256, keccak256_multi};
pub use keys::{address_of, LocalSigner};
pub use signatures::{recover, try_recover, Signature, SignatureError};
