//! Per-row outcome report as CSV.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use plan_match::{MatchReport, RowOutcome};
use plan_model::{PlanError, Result};

const HEADER: [&str; 5] = ["row", "key", "outcome", "reason", "source_row"];

/// Write one record per processed destination row.
pub fn write_outcome_report<W: Write>(report: &MatchReport, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(HEADER).map_err(csv_error)?;
    for result in &report.rows {
        let (reason, source_row) = match result.outcome {
            RowOutcome::Skipped { reason } => (reason.as_str().to_string(), String::new()),
            RowOutcome::Copied { source_row } => (String::new(), source_row.to_string()),
            RowOutcome::NoMatch => (String::new(), String::new()),
        };
        csv.write_record([
            result.row.to_string().as_str(),
            result.key.as_deref().unwrap_or(""),
            result.outcome.label(),
            reason.as_str(),
            source_row.as_str(),
        ])
        .map_err(csv_error)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_outcome_report_to_path(report: &MatchReport, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_outcome_report(report, file)
}

fn csv_error(error: csv::Error) -> PlanError {
    PlanError::Csv(error.to_string())
}
