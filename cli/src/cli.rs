//! # CLI Interface
//!
//! Defines the command-line argument structure for `pledge` using `clap`
//! derive. Every subcommand reads JSON files and prints JSON to stdout.

use clap::{Args, Parser, Subcommand, ValueEnum};
use pledge_protocol::loan::Side;
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Operator tooling for the Pledge origination engine.
///
/// Computes the digests counterparties sign, signs and recovers them, and
/// checks proposals against a deployment's configuration without touching
/// any ledger.
#[derive(Parser, Debug)]
#[command(
    name = "pledge",
    about = "Operator tooling for the Pledge origination engine",
    version,
    propagate_version = true
)]
pub struct PledgeCli {
    /// Deployment configuration (JSON). Protocol defaults when omitted.
    #[arg(long, short = 'c', global = true, env = "PLEDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, env = "PLEDGE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "pledge=warn,pledge_contracts=warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the typed-data digest for a proposal.
    Digest(ProposalArgs),
    /// Sign a proposal with a local key.
    Sign(SignArgs),
    /// Recover the signer of a proposal signature.
    Recover(RecoverArgs),
    /// Check proposal terms against the configured bounds and allow-lists.
    Validate(ValidateArgs),
    /// Compute the funds movement for replacing a loan with new terms.
    RolloverQuote(RolloverQuoteArgs),
    /// Print version information and exit.
    Version,
}

/// Side a signature authorizes.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SideArg {
    Borrow,
    Lend,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Borrow => Side::Borrow,
            SideArg::Lend => Side::Lend,
        }
    }
}

/// A proposal file and the side it is signed for.
#[derive(Args, Debug)]
pub struct ProposalArgs {
    /// Proposal file: `terms`, `sig_properties` and optional `predicates`.
    ///
    /// With `predicates` present the items digest is produced.
    #[arg(long, short = 'p')]
    pub proposal: PathBuf,

    /// Side the signature authorizes.
    #[arg(long, short = 's', value_enum)]
    pub side: SideArg,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    #[command(flatten)]
    pub proposal: ProposalArgs,

    /// Hex-encoded secp256k1 private key.
    ///
    /// **Prefer the environment variable over the flag**: flags end up in
    /// shell history.
    #[arg(long, env = "PLEDGE_SIGNING_KEY", hide_env_values = true)]
    pub key: String,
}

#[derive(Args, Debug)]
pub struct RecoverArgs {
    #[command(flatten)]
    pub proposal: ProposalArgs,

    /// Packed signature `r ‖ s ‖ v`, hex, optional `0x`.
    #[arg(long)]
    pub signature: String,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Proposal file.
    #[arg(long, short = 'p')]
    pub proposal: PathBuf,

    /// Unix time to check the deadline against. Defaults to now.
    #[arg(long)]
    pub now: Option<u64>,
}

#[derive(Args, Debug)]
pub struct RolloverQuoteArgs {
    /// The active loan being replaced (`LoanData` JSON).
    #[arg(long)]
    pub loan: PathBuf,

    /// Proposal file holding the new terms.
    #[arg(long, short = 'p')]
    pub proposal: PathBuf,

    /// The new lender is the current lender.
    #[arg(long)]
    pub same_lender: bool,

    /// Rollover fee in basis points.
    #[arg(long, default_value_t = 0)]
    pub fee_bps: u64,
}
