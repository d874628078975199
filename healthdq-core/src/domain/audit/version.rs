// healthdq-core/src/domain/audit/version.rs

use serde::{Deserialize, Serialize};
use std::fmt;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything needed to reproduce a run: engine, rule set and the run itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcVersion {
    pub engine: String,
    pub ruleset: String,
    /// Hex SHA-256 of the rule document.
    pub digest: String,
    pub run_id: String,
}

impl CalcVersion {
    pub fn new(ruleset: &str, digest: &str, run_id: &str) -> Self {
        Self {
            engine: ENGINE_VERSION.to_string(),
            ruleset: ruleset.to_string(),
            digest: digest.to_string(),
            run_id: run_id.to_string(),
        }
    }

    pub fn short_digest(&self) -> &str {
        &self.digest[..self.digest.len().min(12)]
    }

    pub fn matches_digest(&self, digest: &str) -> bool {
        self.digest == digest
    }
}

impl fmt::Display for CalcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+{}.{}/{}",
            self.engine,
            self.ruleset,
            self.short_digest(),
            self.run_id
        )
    }
}
