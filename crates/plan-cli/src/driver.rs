//! One copy run: open both documents, match, persist once.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, info_span};

use plan_io::DocumentAdapter;
use plan_match::{MatchReport, MatchStrategy, RowMatcher};
use plan_model::{PlanLayout, Result};

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Where to persist the mutated destination; `None` overwrites the destination.
    pub output: Option<PathBuf>,
    pub layout: PlanLayout,
    pub strategy: MatchStrategy,
    /// Match without persisting anything.
    pub dry_run: bool,
    /// List duplicate source keys. Runs a separate pass before timing starts.
    pub check_duplicates: bool,
}

impl RunRequest {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            output: None,
            layout: PlanLayout::default(),
            strategy: MatchStrategy::default(),
            dry_run: false,
            check_duplicates: false,
        }
    }

    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_layout(mut self, layout: PlanLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_check_duplicates(mut self, check_duplicates: bool) -> Self {
        self.check_duplicates = check_duplicates;
        self
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Path written, or `None` for a dry run.
    pub saved_to: Option<PathBuf>,
    pub report: MatchReport,
    /// Matching plus persistence, measured end to end.
    pub elapsed: Duration,
}

/// Copy payloads from the source plan into the destination plan.
///
/// Both paths are resolved and both sheets located before anything is
/// modified. The destination is saved exactly once, after every row has been
/// processed; an error before that point leaves storage untouched.
pub fn run<A>(adapter: &A, request: &RunRequest) -> Result<RunOutcome>
where
    A: DocumentAdapter + ?Sized,
{
    let matcher = RowMatcher::new(request.layout.clone(), request.strategy)?;
    let sheet_name = request.layout.sheet_name.as_str();

    let source_path = adapter.resolve(&request.source)?;
    let destination_path = adapter.resolve(&request.destination)?;
    let span = info_span!(
        "copy_test_plan",
        source = %source_path.display(),
        destination = %destination_path.display(),
        strategy = %request.strategy
    );
    let _guard = span.enter();

    let source_workbook = adapter.open_workbook(&source_path)?;
    let mut destination_workbook = adapter.open_workbook(&destination_path)?;
    let source_sheet = source_workbook.sheet(sheet_name)?;
    let duplicate_keys = if request.check_duplicates {
        matcher.find_duplicate_keys(source_sheet)
    } else {
        Vec::new()
    };

    let (mut report, started) = {
        let destination_sheet = destination_workbook.sheet_mut(sheet_name)?;
        let started = Instant::now();
        let report = matcher.copy_matching_rows(destination_sheet, source_sheet);
        (report, started)
    };
    report.duplicate_keys = duplicate_keys;

    let saved_to = if request.dry_run {
        info!("dry run; destination not saved");
        None
    } else {
        let target = request
            .output
            .clone()
            .unwrap_or_else(|| destination_path.clone());
        adapter.save_workbook(&destination_workbook, &target)?;
        Some(target)
    };
    let elapsed = started.elapsed();
    info!(
        duration_ms = elapsed.as_millis(),
        saved = saved_to.is_some(),
        "copy complete"
    );

    Ok(RunOutcome {
        source: source_path,
        destination: destination_path,
        saved_to,
        report,
        elapsed,
    })
}
