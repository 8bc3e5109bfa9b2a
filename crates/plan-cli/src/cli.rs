//! CLI argument definitions for `plan-copy`.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

use plan_match::MatchStrategy;

#[derive(Parser)]
#[command(
    name = "plan-copy",
    version,
    about = "Copy test results between test-plan workbooks, matching rows by test case ID",
    long_about = "Copy a block of result columns from a source test-plan workbook into a\n\
                  destination test-plan workbook. Rows are matched by the test case ID in\n\
                  the key column, not by position. Suite rows (IDs containing '.TS.'),\n\
                  repeated header rows and rows without an ID are never modified."
)]
pub struct Cli {
    #[command(flatten)]
    pub copy: CopyArgs,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(long = "log-format", value_enum, default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("strategy")
        .args(["naive", "early_exit", "hash_index"])
        .multiple(false)
))]
pub struct CopyArgs {
    /// Workbook the results are read from.
    #[arg(long = "source", visible_alias = "fo", value_name = "PATH")]
    pub source: PathBuf,

    /// Workbook the results are written into.
    #[arg(long = "destination", visible_alias = "fd", value_name = "PATH")]
    pub destination: PathBuf,

    /// Re-scan the whole source for every destination row.
    #[arg(long = "naive", alias = "s1")]
    pub naive: bool,

    /// Scan the source row range and stop at the first match (default).
    #[arg(long = "early-exit", alias = "s2")]
    pub early_exit: bool,

    /// Index source keys once, then look each destination key up.
    #[arg(long = "hash-index")]
    pub hash_index: bool,

    /// Save the result here instead of overwriting the destination.
    #[arg(long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write per-row outcomes as CSV.
    #[arg(long = "report", value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Match and report without saving.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// List source test case IDs that appear more than once.
    #[arg(long = "check-duplicates")]
    pub check_duplicates: bool,

    /// JSON file with layout settings (sheet name, header row, columns).
    #[arg(long = "layout", value_name = "PATH")]
    pub layout: Option<PathBuf>,

    /// Sheet to read in both workbooks [default: TestPlan].
    #[arg(long = "sheet", value_name = "NAME")]
    pub sheet: Option<String>,

    /// First data row, 1-based [default: 17].
    #[arg(long = "header-row", value_name = "ROW")]
    pub header_row: Option<usize>,

    /// Column holding the test case ID, 1-based [default: 1].
    #[arg(long = "key-column", value_name = "COL")]
    pub key_column: Option<usize>,

    /// First copied column, 1-based [default: 11].
    #[arg(long = "payload-start", value_name = "COL")]
    pub payload_start: Option<usize>,

    /// Number of copied columns [default: 7].
    #[arg(long = "payload-width", value_name = "COUNT")]
    pub payload_width: Option<usize>,
}

impl CopyArgs {
    pub fn strategy(&self) -> MatchStrategy {
        if self.naive {
            MatchStrategy::Naive
        } else if self.hash_index {
            MatchStrategy::HashIndex
        } else {
            MatchStrategy::EarlyExit
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn strategy_defaults_to_early_exit() {
        let cli = Cli::try_parse_from(["plan-copy", "--source", "a.xlsx", "--destination", "b.xlsx"])
            .expect("parse");
        assert_eq!(cli.copy.strategy(), MatchStrategy::EarlyExit);
    }

    #[test]
    fn legacy_flag_names_are_accepted() {
        let cli = Cli::try_parse_from(["plan-copy", "--fo", "a.xlsx", "--fd", "b.xlsx", "--s1"])
            .expect("parse");
        assert_eq!(cli.copy.source, PathBuf::from("a.xlsx"));
        assert_eq!(cli.copy.strategy(), MatchStrategy::Naive);
    }

    #[test]
    fn strategy_flags_are_exclusive() {
        let result = Cli::try_parse_from([
            "plan-copy",
            "--source",
            "a.xlsx",
            "--destination",
            "b.xlsx",
            "--naive",
            "--hash-index",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn source_and_destination_are_required() {
        assert!(Cli::try_parse_from(["plan-copy", "--source", "a.xlsx"]).is_err());
    }
}
