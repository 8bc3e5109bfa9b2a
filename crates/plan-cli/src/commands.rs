use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use plan_cli::driver::{RunOutcome, RunRequest, run};
use plan_io::{XlsxAdapter, write_outcome_report_to_path};
use plan_model::{PlanError, PlanLayout};

use crate::cli::CopyArgs;

pub fn run_copy(args: &CopyArgs) -> Result<RunOutcome> {
    let layout = resolve_layout(args)?;
    let request = RunRequest::new(&args.source, &args.destination)
        .with_layout(layout)
        .with_strategy(args.strategy())
        .with_output(args.output.clone())
        .with_dry_run(args.dry_run)
        .with_check_duplicates(args.check_duplicates);

    let outcome = run(&XlsxAdapter::new(), &request).context("copy test plan")?;

    if let Some(path) = &args.report {
        write_outcome_report_to_path(&outcome.report, path)
            .with_context(|| format!("write report: {}", path.display()))?;
    }
    Ok(outcome)
}

/// Layout from `--layout` (or defaults), then individual flag overrides.
fn resolve_layout(args: &CopyArgs) -> Result<PlanLayout> {
    let mut layout = match &args.layout {
        Some(path) => load_layout(path)?,
        None => PlanLayout::default(),
    };
    if let Some(sheet) = &args.sheet {
        layout.sheet_name = sheet.clone();
    }
    if let Some(row) = args.header_row {
        layout.header_row = row;
    }
    if let Some(column) = args.key_column {
        layout.key_column = column;
    }
    if let Some(start) = args.payload_start {
        layout.payload.start = start;
    }
    if let Some(width) = args.payload_width {
        layout.payload.width = width;
    }
    layout.validate().context("layout settings")?;
    Ok(layout)
}

fn load_layout(path: &Path) -> Result<PlanLayout> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read layout: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse layout: {}", path.display()))
}

/// True when any cause in the chain says an input document is missing.
/// Failures writing the output or the report never count.
pub fn is_file_not_found(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<PlanError>()
            .is_some_and(PlanError::is_file_not_found)
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use plan_io::DocumentAdapter;
    use plan_model::{CellValue, Sheet, Workbook};

    use super::*;
    use crate::cli::Cli;

    fn parse(extra: &[&str]) -> CopyArgs {
        let mut argv = vec!["plan-copy", "--source", "a.xlsx", "--destination", "b.xlsx"];
        argv.extend_from_slice(extra);
        Cli::try_parse_from(argv).expect("parse").copy
    }

    #[test]
    fn flags_override_layout_defaults() {
        let args = parse(&["--sheet", "Plan", "--header-row", "3", "--payload-width", "2"]);
        let layout = resolve_layout(&args).expect("layout");
        assert_eq!(layout.sheet_name, "Plan");
        assert_eq!(layout.header_row, 3);
        assert_eq!(layout.payload.start, 11);
        assert_eq!(layout.payload.width, 2);
    }

    #[test]
    fn layout_file_is_applied_before_flags() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("layout.json");
        fs::write(&path, r#"{ "sheet_name": "Results", "header_row": 5 }"#).expect("write");
        let path_arg = path.to_string_lossy().to_string();
        let args = parse(&["--layout", &path_arg, "--header-row", "6"]);
        let layout = resolve_layout(&args).expect("layout");
        assert_eq!(layout.sheet_name, "Results");
        assert_eq!(layout.header_row, 6);
    }

    #[test]
    fn overlapping_payload_is_rejected() {
        let args = parse(&["--key-column", "12"]);
        assert!(resolve_layout(&args).is_err());
    }

    #[test]
    fn file_not_found_is_detected_through_context() {
        let error = anyhow::Error::new(PlanError::FileNotFound {
            path: "missing.xlsx".into(),
        })
        .context("copy test plan");
        assert!(is_file_not_found(&error));

        let other = anyhow::Error::new(PlanError::SheetNotFound {
            sheet: "TestPlan".to_string(),
            available: Vec::new(),
        });
        assert!(!is_file_not_found(&other));
    }

    #[test]
    fn missing_source_surfaces_as_file_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("no_source_here.xlsx");
        let destination = dir.path().join("no_destination_here.xlsx");
        let source_arg = source.to_string_lossy().to_string();
        let destination_arg = destination.to_string_lossy().to_string();
        let args = Cli::try_parse_from([
            "plan-copy",
            "--source",
            &source_arg,
            "--destination",
            &destination_arg,
        ])
        .expect("parse")
        .copy;
        let error = run_copy(&args).unwrap_err();
        assert!(is_file_not_found(&error));
    }

    #[test]
    fn report_into_missing_directory_is_an_ordinary_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plan = dir.path().join("plan.xlsx");
        let mut sheet = Sheet::new("TestPlan");
        sheet.set_cell(17, 1, CellValue::text("TC.A"));
        XlsxAdapter::new()
            .save_workbook(&Workbook::new().with_sheet(sheet), &plan)
            .expect("write plan");
        let plan_arg = plan.to_string_lossy().to_string();
        let report_arg = dir
            .path()
            .join("no_such_dir")
            .join("report.csv")
            .to_string_lossy()
            .to_string();

        let args = Cli::try_parse_from([
            "plan-copy",
            "--source",
            &plan_arg,
            "--destination",
            &plan_arg,
            "--dry-run",
            "--report",
            &report_arg,
        ])
        .expect("parse")
        .copy;
        let error = run_copy(&args).unwrap_err();
        assert!(!is_file_not_found(&error));
        assert!(format!("{error:#}").contains("write report"));
    }

    #[test]
    fn check_duplicates_flag_is_parsed() {
        assert!(parse(&["--check-duplicates"]).check_duplicates);
        assert!(!parse(&[]).check_duplicates);
    }
}
