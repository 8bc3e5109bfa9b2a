use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use plan_model::{PlanError, Sheet};

use crate::lookup::{EarlyExitScan, HashIndex, KeyLookup, NaiveScan, ScanRange};

/// Source lookup strategy. All strategies produce identical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    /// Re-scan the source by random cell access for every destination row.
    Naive,
    /// Range-restricted row iteration that stops at the first match.
    #[default]
    EarlyExit,
    /// Key to row index built once per run.
    HashIndex,
}

impl MatchStrategy {
    pub const ALL: [Self; 3] = [Self::Naive, Self::EarlyExit, Self::HashIndex];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::EarlyExit => "early-exit",
            Self::HashIndex => "hash-index",
        }
    }

    /// Prepare a lookup over `range` of `source`.
    pub fn lookup<'s>(self, source: &'s Sheet, range: ScanRange) -> Box<dyn KeyLookup + 's> {
        match self {
            Self::Naive => Box::new(NaiveScan::new(source, range)),
            Self::EarlyExit => Box::new(EarlyExitScan::new(source, range)),
            Self::HashIndex => Box::new(HashIndex::build(source, range)),
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStrategy {
    type Err = PlanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| {
                PlanError::Message(format!(
                    "unknown match strategy '{value}' (expected naive, early-exit or hash-index)"
                ))
            })
    }
}
