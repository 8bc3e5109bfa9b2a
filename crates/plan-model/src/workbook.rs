use std::path::{Path, PathBuf};

use crate::error::{PlanError, Result};
use crate::sheet::Sheet;

/// Ordered collection of named sheets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    /// File the workbook was loaded from, when an adapter can patch it in place.
    origin: Option<PathBuf>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// True when any sheet holds unsaved cell changes.
    pub fn has_changes(&self) -> bool {
        self.sheets.iter().any(Sheet::has_changes)
    }

    pub fn mark_clean(&mut self) {
        self.sheets.iter_mut().for_each(Sheet::mark_clean);
    }

    pub fn with_sheet(mut self, sheet: Sheet) -> Self {
        self.push_sheet(sheet);
        self
    }

    /// Append a sheet, replacing any existing sheet with the same name in place.
    pub fn push_sheet(&mut self, sheet: Sheet) {
        match self.sheets.iter_mut().find(|s| s.name() == sheet.name()) {
            Some(existing) => *existing = sheet,
            None => self.sheets.push(sheet),
        }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn sheet(&self, name: &str) -> Result<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| self.missing(name))
    }

    pub fn sheet_mut(&mut self, name: &str) -> Result<&mut Sheet> {
        let missing = self.missing(name);
        self.sheets
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or(missing)
    }

    fn missing(&self, name: &str) -> PlanError {
        PlanError::SheetNotFound {
            sheet: name.to_string(),
            available: self.sheet_names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sheet_lists_available_names() {
        let workbook = Workbook::new()
            .with_sheet(Sheet::new("Summary"))
            .with_sheet(Sheet::new("Plan"));
        let error = workbook.sheet("TestPlan").unwrap_err();
        match error {
            PlanError::SheetNotFound { sheet, available } => {
                assert_eq!(sheet, "TestPlan");
                assert_eq!(available, vec!["Summary", "Plan"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn change_tracking_spans_sheets() {
        let mut workbook = Workbook::new()
            .with_sheet(Sheet::new("Cover"))
            .with_sheet(Sheet::new("TestPlan"))
            .with_origin("plan.xlsx");
        workbook.mark_clean();
        assert!(!workbook.has_changes());
        workbook
            .sheet_mut("TestPlan")
            .unwrap()
            .set_cell(17, 11, "Passed".into());
        assert!(workbook.has_changes());
        assert_eq!(workbook.origin(), Some(Path::new("plan.xlsx")));
    }

    #[test]
    fn push_sheet_replaces_by_name() {
        let mut workbook = Workbook::new().with_sheet(Sheet::new("TestPlan"));
        let mut replacement = Sheet::new("TestPlan");
        replacement.set_cell(1, 1, "x".into());
        workbook.push_sheet(replacement.clone());
        assert_eq!(workbook.sheets().len(), 1);
        assert_eq!(workbook.sheet("TestPlan").unwrap(), &replacement);
    }
}
