//! The destination pass: eligibility, lookup, payload copy.

use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, info_span, trace, warn};

use plan_model::{KeyClass, PayloadSpan, PlanLayout, Result, Sheet};

use crate::lookup::ScanRange;
use crate::report::{MatchReport, RowOutcome, RowResult};
use crate::strategy::MatchStrategy;

/// Copies payload spans into a destination sheet from key-matched source rows.
#[derive(Debug, Clone)]
pub struct RowMatcher {
    layout: PlanLayout,
    strategy: MatchStrategy,
}

impl RowMatcher {
    /// Create a matcher after validating `layout`.
    pub fn new(layout: PlanLayout, strategy: MatchStrategy) -> Result<Self> {
        layout.validate()?;
        Ok(Self { layout, strategy })
    }

    pub fn layout(&self) -> &PlanLayout {
        &self.layout
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Process every destination row from the header row to the last stored row.
    pub fn copy_matching_rows(&self, destination: &mut Sheet, source: &Sheet) -> MatchReport {
        let max_dest_row = destination.max_row();
        let max_source_row = source.max_row();
        self.copy_rows_in_range(destination, source, max_dest_row, max_source_row)
    }

    /// Process destination rows `header_row..=max_dest_row` against source rows
    /// `header_row..=max_source_row`.
    ///
    /// Only payload cells of matched destination rows are written. The source
    /// is never modified and an empty range is not an error.
    pub fn copy_rows_in_range(
        &self,
        destination: &mut Sheet,
        source: &Sheet,
        max_dest_row: usize,
        max_source_row: usize,
    ) -> MatchReport {
        let span = info_span!(
            "match_rows",
            strategy = %self.strategy,
            sheet = %self.layout.sheet_name
        );
        let _guard = span.enter();
        let started = Instant::now();
        let layout = &self.layout;
        let range = ScanRange::new(layout.header_row, max_source_row, layout.key_column);

        let lookup = self.strategy.lookup(source, range);
        if let Some(shadowed) = lookup.shadowed_rows()
            && shadowed > 0
        {
            warn!(
                shadowed,
                "source has duplicate keys; the first occurrence is used"
            );
        }
        let mut rows = Vec::new();
        for row in layout.header_row..=max_dest_row {
            let key_cell = destination.cell(row, layout.key_column);
            let eligible = match layout.classify_key(key_cell) {
                KeyClass::Eligible(key) => Ok(key.into_owned()),
                KeyClass::Skip(reason) => Err((reason, key_cell.key_text().map(Cow::into_owned))),
            };
            let (key, outcome) = match eligible {
                Err((reason, key)) => {
                    trace!(row, reason = %reason, "skipping destination row");
                    (key, RowOutcome::Skipped { reason })
                }
                Ok(key) => match lookup.find(&key) {
                    Some(source_row) => {
                        copy_payload(destination, row, source, source_row, layout.payload);
                        debug!(row, key = %key, source_row, "copied payload");
                        (Some(key), RowOutcome::Copied { source_row })
                    }
                    None => {
                        trace!(row, key = %key, "no source row with this key");
                        (Some(key), RowOutcome::NoMatch)
                    }
                },
            };
            rows.push(RowResult { row, key, outcome });
        }

        let report = MatchReport {
            strategy: self.strategy,
            rows,
            duplicate_keys: Vec::new(),
            elapsed: started.elapsed(),
        };
        let counts = report.counts();
        info!(
            copied = counts.copied,
            skipped = counts.skipped,
            no_match = counts.no_match,
            duration_ms = report.elapsed.as_millis(),
            "matching complete"
        );
        report
    }

    /// Keys repeated in the source data rows, ordered by first appearance.
    ///
    /// This is a full pass over the source key column, separate from matching,
    /// so callers run it only when asked and outside any timed section.
    pub fn find_duplicate_keys(&self, source: &Sheet) -> Vec<String> {
        let range = ScanRange::new(
            self.layout.header_row,
            source.max_row(),
            self.layout.key_column,
        );
        let duplicates = duplicate_keys(source, range);
        if let Some(first) = duplicates.first() {
            warn!(
                count = duplicates.len(),
                first = %first,
                "source has duplicate keys; the first occurrence is used"
            );
        }
        duplicates
    }
}

/// Overwrite the payload span of `dest_row` with the values of `source_row`.
pub fn copy_payload(
    destination: &mut Sheet,
    dest_row: usize,
    source: &Sheet,
    source_row: usize,
    payload: PayloadSpan,
) {
    for column in payload.columns() {
        let value = source.cell(source_row, column).clone();
        destination.set_cell(dest_row, column, value);
    }
}

/// Keys appearing more than once in `range`, ordered by first appearance.
pub fn duplicate_keys(source: &Sheet, range: ScanRange) -> Vec<String> {
    let column = range.key_column;
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut duplicates = Vec::new();
    for row in source.iter_rows(range.first_row, range.last_row, column, column) {
        let Some(key) = row.cell(column).key_text() else {
            continue;
        };
        let count = seen.entry(key.into_owned()).or_insert(0);
        *count += 1;
        if *count == 2 {
            duplicates.push(row.cell(column).to_string());
        }
    }
    duplicates
}
