//! Row matching between a source and a destination test-plan sheet.
//!
//! For every eligible destination row the matcher finds the first source row
//! with an equal key and copies the configured payload span over. Three
//! interchangeable lookup strategies are provided; they differ only in cost.

pub mod lookup;
pub mod matcher;
pub mod report;
pub mod strategy;

pub use lookup::{EarlyExitScan, HashIndex, KeyLookup, NaiveScan, ScanRange};
pub use matcher::{RowMatcher, copy_payload, duplicate_keys};
pub use report::{MatchReport, OutcomeCounts, RowOutcome, RowResult};
pub use strategy::MatchStrategy;
