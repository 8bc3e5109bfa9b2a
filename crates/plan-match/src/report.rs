use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use plan_model::SkipReason;

use crate::strategy::MatchStrategy;

/// What happened to one destination row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RowOutcome {
    /// Ineligible key; the source was not scanned.
    Skipped { reason: SkipReason },
    Copied { source_row: usize },
    NoMatch,
}

impl RowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Copied { .. } => "copied",
            Self::NoMatch => "no-match",
        }
    }
}

impl fmt::Display for RowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
            Self::Copied { source_row } => write!(f, "copied from row {source_row}"),
            Self::NoMatch => f.write_str("no match"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowResult {
    /// Destination row index (1-based).
    pub row: usize,
    /// Key text; `None` when the key cell was empty.
    pub key: Option<String>,
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub skipped: usize,
    pub copied: usize,
    pub no_match: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.skipped + self.copied + self.no_match
    }

    fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Skipped { .. } => self.skipped += 1,
            RowOutcome::Copied { .. } => self.copied += 1,
            RowOutcome::NoMatch => self.no_match += 1,
        }
    }
}

/// Result of one matching pass over a destination sheet.
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub strategy: MatchStrategy,
    pub rows: Vec<RowResult>,
    /// Source keys that occur more than once in the scanned range, in first-seen
    /// order. Filled only when duplicate checking was requested.
    pub duplicate_keys: Vec<String>,
    /// Wall-clock time of the matching pass alone.
    pub elapsed: Duration,
}

impl MatchReport {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for result in &self.rows {
            counts.record(&result.outcome);
        }
        counts
    }

    pub fn outcome_for_row(&self, row: usize) -> Option<RowOutcome> {
        self.rows
            .iter()
            .find(|result| result.row == row)
            .map(|result| result.outcome)
    }

    pub fn copied_rows(&self) -> impl Iterator<Item = &RowResult> {
        self.rows
            .iter()
            .filter(|result| matches!(result.outcome, RowOutcome::Copied { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_outcome() {
        let report = MatchReport {
            strategy: MatchStrategy::HashIndex,
            rows: vec![
                RowResult {
                    row: 17,
                    key: Some("TC.1".to_string()),
                    outcome: RowOutcome::Copied { source_row: 20 },
                },
                RowResult {
                    row: 18,
                    key: Some("S.TS.1".to_string()),
                    outcome: RowOutcome::Skipped {
                        reason: SkipReason::SuiteMarker,
                    },
                },
                RowResult {
                    row: 19,
                    key: None,
                    outcome: RowOutcome::Skipped {
                        reason: SkipReason::MissingKey,
                    },
                },
                RowResult {
                    row: 20,
                    key: Some("TC.2".to_string()),
                    outcome: RowOutcome::NoMatch,
                },
            ],
            duplicate_keys: Vec::new(),
            elapsed: Duration::ZERO,
        };
        let counts = report.counts();
        assert_eq!(counts.copied, 1);
        assert_eq!(counts.skipped, 2);
        assert_eq!(counts.no_match, 1);
        assert_eq!(counts.total(), 4);
        assert_eq!(
            report.outcome_for_row(17),
            Some(RowOutcome::Copied { source_row: 20 })
        );
        assert_eq!(report.copied_rows().count(), 1);
    }
}
