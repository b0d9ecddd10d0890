//! # Hashing Utilities
//!
//! Keccak-256 and the 32-byte word encoding that typed-data hashing is built
//! on. Everything the engine hashes is first laid out as a sequence of ABI
//! words, the same layout `abi.encode` produces, so digests computed here
//! match what an on-chain verifier or a wallet computes for the same data.
//!
//! Dynamic values (`string`, `bytes`) never appear inline: EIP-712 replaces
//! them with their keccak hash, which is itself a word.

use alloy_primitives::{Address, Keccak256, B256, U256};

pub use alloy_primitives::keccak256;

/// Hash multiple byte slices as if they were concatenated.
///
/// Feeds each part to a single hasher instead of allocating the joined
/// buffer. `keccak256_multi(&[a, b]) == keccak256(a ‖ b)`.
pub fn keccak256_multi(parts: &[&[u8]]) -> B256 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

/// Left-pad an address to a 32-byte word.
pub fn address_word(address: Address) -> B256 {
    address.into_word()
}

/// Big-endian 32-byte word for an unsigned integer.
pub fn u256_word(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

/// Big-endian 32-byte word for a native integer.
pub fn u64_word(value: u64) -> B256 {
    u256_word(U256::from(value))
}

/// Accumulates 32-byte words and hashes them in one go.
///
/// This is `keccak256(abi.encode(...))` for static types. Callers are
/// responsible for pre-hashing dynamic members.
#[derive(Clone, Debug, Default)]
pub struct WordEncoder {
    buf: Vec<u8>,
}

impl WordEncoder {
    /// Start an encoder with room for `words` words.
    pub fn with_capacity(words: usize) -> Self {
        Self {
            buf: Vec::with_capacity(words * 32),
        }
    }

    /// Append a raw word.
    pub fn word(mut self, word: B256) -> Self {
        self.buf.extend_from_slice(word.as_slice());
        self
    }

    /// Append an unsigned integer.
    pub fn uint(self, value: U256) -> Self {
        self.word(u256_word(value))
    }

    /// Append a native integer.
    pub fn uint64(self, value: u64) -> Self {
        self.word(u64_word(value))
    }

    /// Append an address.
    pub fn address(self, address: Address) -> Self {
        self.word(address_word(address))
    }

    /// Number of bytes encoded so far. Always a multiple of 32.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been encoded.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Keccak-256 of the encoded words.
    pub fn finish(self) -> B256 {
        keccak256(&self.buf)
    }
}
