//! # Protocol Configuration & Constants
//!
//! Every bound the engine enforces lives here. If you're hardcoding a limit
//! somewhere else, move it here first.
//!
//! The constants are consensus-adjacent: a signature produced against one set
//! of bounds or one typed-data domain is meaningless under another, so
//! changing any of them is a protocol version bump, not a refactor.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Loan Term Bounds
// ---------------------------------------------------------------------------

/// Shortest loan the protocol will originate: one hour.
pub const MIN_LOAN_DURATION_SECS: u64 = 3_600;

/// Longest loan the protocol will originate: three 365-day years.
pub const MAX_LOAN_DURATION_SECS: u64 = 94_608_000;

/// Fixed-point scale of `interest_rate`. `1e18` represents one percent.
pub const INTEREST_RATE_DENOMINATOR: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Percent scale applied on top of [`INTEREST_RATE_DENOMINATOR`].
pub const PERCENT_DENOMINATOR: U256 = U256::from_limbs([100, 0, 0, 0]);

/// Lowest accepted interest rate: 1% over the life of the loan.
pub const MIN_INTEREST_RATE: U256 = INTEREST_RATE_DENOMINATOR;

/// Highest accepted interest rate: `1e24`, i.e. 1,000,000%.
pub const MAX_INTEREST_RATE: U256 = U256::from_limbs([0x1bce_cced_a100_0000, 0xd3c2, 0, 0]);

/// Minimum principal when no deployment-specific value is configured.
pub const DEFAULT_MIN_PRINCIPAL: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Basis points per whole. Fee rates are expressed against this.
pub const BASIS_POINTS_DENOMINATOR: u64 = 10_000;

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

/// Largest batch accepted by any allow-list mutator.
pub const MAX_BATCH_ELEMENTS: usize = 50;

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// Return value of `isValidSignature(bytes32,bytes)` that means "yes".
/// It is the function's own selector: `bytes4(keccak256("isValidSignature(bytes32,bytes)"))`.
pub const ERC1271_MAGIC_VALUE: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

/// Half the secp256k1 group order. Signatures with `s` above this are the
/// malleable twin of a low-`s` signature and are refused.
pub const SECP256K1_HALF_ORDER: U256 = U256::from_limbs([
    0xdfe9_2f46_681b_20a0,
    0x5d57_6e73_57a4_501d,
    0xffff_ffff_ffff_ffff,
    0x7fff_ffff_ffff_ffff,
]);

/// EIP-712 domain name used when a deployment doesn't override it.
pub const DEFAULT_DOMAIN_NAME: &str = "OriginationController";

/// EIP-712 domain version. Bumped whenever the typed-data layout changes.
pub const DEFAULT_DOMAIN_VERSION: &str = "3";

/// Chain id used when a deployment doesn't override it.
pub const DEFAULT_CHAIN_ID: u64 = 1;

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// The EIP-712 domain a deployment signs under.
///
/// Binding the chain id and the verifying address into every digest is what
/// keeps a signature for one deployment from being replayed against another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Protocol name component of the domain.
    pub name: String,
    /// Layout version component of the domain.
    pub version: String,
    /// Chain the engine is deployed on.
    pub chain_id: u64,
    /// Address of the deployed engine.
    pub verifying_contract: Address,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DOMAIN_NAME.to_string(),
            version: DEFAULT_DOMAIN_VERSION.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            verifying_contract: Address::ZERO,
        }
    }
}

/// Deployment configuration for an origination engine.
///
/// Loaded from JSON by the CLI and used to seed the engine's allow-lists.
/// Anything not present in the file falls back to the protocol defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Typed-data domain.
    pub domain: DomainConfig,
    /// Lowest principal accepted, in the currency's smallest unit.
    pub min_principal: U256,
    /// Account allowed to mutate the allow-lists.
    pub admin: Address,
    /// Initially allowed payable currencies.
    pub allowed_currencies: Vec<Address>,
    /// Initially allowed collateral contracts.
    pub allowed_collateral: Vec<Address>,
    /// Initially allowed predicate verifiers.
    pub allowed_verifiers: Vec<Address>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            domain: DomainConfig::default(),
            min_principal: U256::from(DEFAULT_MIN_PRINCIPAL),
            admin: Address::ZERO,
            allowed_currencies: Vec::new(),
            allowed_collateral: Vec::new(),
            allowed_verifiers: Vec::new(),
        }
    }
}

/// Friendly name for a chain id, for logs.
pub fn chain_name(chain_id: u64) -> String {
    match chain_id {
        1 => "mainnet".to_string(),
        8453 => "base".to_string(),
        11155111 => "sepolia".to_string(),
        31337 => "local".to_string(),
        other => format!("chain-{}", other),
    }
}
