//! Deployment configuration and proposal files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pledge_protocol::config::EngineConfig;
use pledge_protocol::loan::{LoanTerms, Predicate, SigProperties};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Terms plus the replay controls they are signed with. A present
/// `predicates` list selects the items digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub terms: LoanTerms,
    #[serde(default = "single_use")]
    pub sig_properties: SigProperties,
    #[serde(default)]
    pub predicates: Option<Vec<Predicate>>,
}

fn single_use() -> SigProperties {
    SigProperties::single_use(0)
}

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Load the engine configuration, or the protocol defaults when no file is
/// given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let config: EngineConfig = read_json(path)?;
            tracing::debug!(
                path = %path.display(),
                chain_id = config.domain.chain_id,
                "configuration loaded"
            );
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}
