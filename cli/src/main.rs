// Copyright (c) 2026 Pledge Contributors. MIT License.
// See LICENSE for details.

//! # Pledge CLI
//!
//! Entry point for the `pledge` binary. Parses CLI arguments, initializes
//! logging, loads the deployment configuration and runs one of:
//!
//! - `digest`         — typed-data digest of a proposal
//! - `sign`           — sign a proposal with a local key
//! - `recover`        — recover the signer of a proposal signature
//! - `validate`       — check terms against bounds and allow-lists
//! - `rollover-quote` — funds movement for a rollover
//! - `version`        — print build version information
//!
//! Results are JSON on stdout. Logs go to stderr.

mod cli;
mod config;
mod logging;

use alloy_primitives::{Address, B256, U256};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;

use pledge_contracts::collaborators::Clock;
use pledge_contracts::memory::SystemClock;
use pledge_contracts::store::ConfigStore;
use pledge_protocol::config::{chain_name, EngineConfig, DEFAULT_DOMAIN_NAME, DEFAULT_DOMAIN_VERSION};
use pledge_protocol::crypto::{try_recover, DigestShape, LocalSigner, Signature, TypedDataDomain};
use pledge_protocol::loan::settlement::{compute_rollover, repay_amount};
use pledge_protocol::loan::{
    validate_loan_terms, validate_rollover, LoanData, LoanState, RolloverAmounts, Side,
};

use cli::{Commands, PledgeCli, ProposalArgs};
use config::{load_config, read_json, Proposal};

fn main() -> Result<()> {
    let cli = PledgeCli::parse();
    logging::init_logging(&cli.log_level, cli.log_format);

    match cli.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        command => {
            let config = load_config(cli.config.as_deref())?;
            tracing::info!(
                chain = %chain_name(config.domain.chain_id),
                engine = %config.domain.verifying_contract,
                "using deployment"
            );
            run(command, &config)
        }
    }
}

fn run(command: Commands, config: &EngineConfig) -> Result<()> {
    match command {
        Commands::Digest(args) => {
            let (_, report) = digest(config, &args)?;
            print_json(&report)
        }
        Commands::Sign(args) => {
            let signer = LocalSigner::from_hex(&args.key).context("invalid signing key")?;
            let (digest, _) = digest(config, &args.proposal)?;
            let signature = signer
                .sign_digest(digest)
                .context("failed to sign digest")?;
            tracing::info!(signer = %signer.address(), %digest, "proposal signed");
            print_json(&SignReport {
                signer: signer.address(),
                digest,
                packed: format!("0x{}", hex::encode(signature.packed())),
                signature,
            })
        }
        Commands::Recover(args) => {
            let raw = hex::decode(args.signature.trim().trim_start_matches("0x"))
                .context("signature is not valid hex")?;
            let signature = Signature::from_packed(&raw).context("malformed signature")?;
            let (digest, _) = digest(config, &args.proposal)?;
            let report = match try_recover(digest, &signature) {
                Ok(signer) => RecoverReport {
                    digest,
                    signer: Some(signer),
                    error: None,
                },
                Err(e) => RecoverReport {
                    digest,
                    signer: None,
                    error: Some(e.to_string()),
                },
            };
            print_json(&report)
        }
        Commands::Validate(args) => {
            let proposal: Proposal = read_json(&args.proposal)?;
            let now = args.now.unwrap_or_else(|| SystemClock.now());
            print_json(&validate(config, &proposal, now)?)
        }
        Commands::RolloverQuote(args) => {
            let loan: LoanData = read_json(&args.loan)?;
            let proposal: Proposal = read_json(&args.proposal)?;
            print_json(&rollover_quote(&loan, &proposal, args.same_lender, args.fee_bps)?)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct DigestReport {
    digest: B256,
    shape: DigestShape,
    side: Side,
    chain_id: u64,
    verifying_contract: Address,
    domain_separator: B256,
}

#[derive(Debug, Serialize)]
struct SignReport {
    signer: Address,
    digest: B256,
    signature: Signature,
    packed: String,
}

#[derive(Debug, Serialize)]
struct RecoverReport {
    digest: B256,
    signer: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ValidateReport {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    now: u64,
    checked_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct QuoteReport {
    #[serde(flatten)]
    amounts: RolloverAmounts,
    settled_amount: U256,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn digest(config: &EngineConfig, args: &ProposalArgs) -> Result<(B256, DigestReport)> {
    let proposal: Proposal = read_json(&args.proposal)?;
    let domain = TypedDataDomain::new(config.domain.clone());
    let side = Side::from(args.side);

    let (digest, shape) = match &proposal.predicates {
        Some(predicates) => (
            domain.items_digest_for(&proposal.terms, predicates, &proposal.sig_properties, side),
            DigestShape::Items,
        ),
        None => (
            domain.loan_terms_digest(&proposal.terms, &proposal.sig_properties, side),
            DigestShape::Plain,
        ),
    };
    tracing::debug!(%digest, ?shape, %side, "digest computed");

    Ok((
        digest,
        DigestReport {
            digest,
            shape,
            side,
            chain_id: config.domain.chain_id,
            verifying_contract: config.domain.verifying_contract,
            domain_separator: domain.separator(),
        },
    ))
}

fn validate(config: &EngineConfig, proposal: &Proposal, now: u64) -> Result<ValidateReport> {
    let lists = ConfigStore::from_config(config).context("invalid deployment configuration")?;
    let result = validate_loan_terms(&proposal.terms, now, config.min_principal, &lists);
    if let Err(e) = &result {
        tracing::warn!(error = %e, "terms rejected");
    }

    Ok(ValidateReport {
        valid: result.is_ok(),
        error: result.err().map(|e| e.to_string()),
        now,
        checked_at: i64::try_from(now)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|t| t.to_rfc3339()),
    })
}

fn rollover_quote(
    loan: &LoanData,
    proposal: &Proposal,
    same_lender: bool,
    fee_bps: u64,
) -> Result<QuoteReport> {
    if loan.state != LoanState::Active {
        bail!("loan is {}, only active loans roll over", loan.state);
    }
    validate_rollover(&loan.terms, &proposal.terms).context("terms cannot replace this loan")?;

    let repay = repay_amount(loan).context("repayment overflows")?;
    let amounts = compute_rollover(repay, proposal.terms.principal, same_lender, fee_bps)
        .context("rollover amounts")?;
    let settled_amount = amounts
        .settled_amount()
        .context("settled amount overflows")?;

    Ok(QuoteReport {
        amounts,
        settled_amount,
    })
}

fn print_version() {
    println!("pledge  {}", env!("CARGO_PKG_VERSION"));
    println!("domain  {} v{}", DEFAULT_DOMAIN_NAME, DEFAULT_DOMAIN_VERSION);
    println!("rustc   {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}
