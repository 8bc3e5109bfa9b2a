//! Layout configuration of a test-plan sheet.
//!
//! The defaults describe the test-plan template in use: sheet `TestPlan`,
//! data rows from row 17, the test case identifier in column 1 and a
//! seven-column payload starting at column 11.

use std::borrow::Cow;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::cell::CellValue;
use crate::error::{PlanError, Result};

pub const DEFAULT_SHEET_NAME: &str = "TestPlan";
pub const DEFAULT_HEADER_ROW: usize = 17;
pub const DEFAULT_KEY_COLUMN: usize = 1;
pub const DEFAULT_PAYLOAD_START: usize = 11;
pub const DEFAULT_PAYLOAD_WIDTH: usize = 7;
pub const DEFAULT_HEADER_LABEL: &str = "Test Case ID";
pub const DEFAULT_SUITE_MARKER: &str = ".TS.";

/// Worksheet limits of the xlsx format.
pub const MAX_ROWS: usize = 1_048_576;
pub const MAX_COLUMNS: usize = 16_384;

/// Contiguous block of columns copied from source to destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSpan {
    /// First column (1-based).
    pub start: usize,
    pub width: usize,
}

impl PayloadSpan {
    pub fn new(start: usize, width: usize) -> Self {
        Self { start, width }
    }

    /// Last column of the span (inclusive). Saturates instead of overflowing;
    /// [`PlanLayout::validate`] rejects spans that would.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.width.saturating_sub(1))
    }

    fn checked_end(&self) -> Option<usize> {
        self.start.checked_add(self.width.checked_sub(1)?)
    }

    pub fn columns(&self) -> RangeInclusive<usize> {
        self.start..=self.end()
    }

    pub fn contains(&self, column: usize) -> bool {
        self.width > 0 && self.columns().contains(&column)
    }
}

impl Default for PayloadSpan {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_START, DEFAULT_PAYLOAD_WIDTH)
    }
}

/// Where the keys and payload live in a test-plan sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanLayout {
    /// Sheet looked up in both workbooks.
    pub sheet_name: String,
    /// First data row (inclusive), shared by source and destination.
    pub header_row: usize,
    pub key_column: usize,
    pub payload: PayloadSpan,
    /// Column title that is repeated inside the data region and never copied over.
    pub header_label: String,
    /// Substring marking test-suite section rows in the destination.
    pub suite_marker: String,
}

impl Default for PlanLayout {
    fn default() -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            header_row: DEFAULT_HEADER_ROW,
            key_column: DEFAULT_KEY_COLUMN,
            payload: PayloadSpan::default(),
            header_label: DEFAULT_HEADER_LABEL.to_string(),
            suite_marker: DEFAULT_SUITE_MARKER.to_string(),
        }
    }
}

impl PlanLayout {
    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    pub fn with_header_row(mut self, row: usize) -> Self {
        self.header_row = row;
        self
    }

    pub fn with_key_column(mut self, column: usize) -> Self {
        self.key_column = column;
        self
    }

    pub fn with_payload(mut self, payload: PayloadSpan) -> Self {
        self.payload = payload;
        self
    }

    /// Rightmost column any scan needs to read.
    pub fn last_column(&self) -> usize {
        self.key_column.max(self.payload.end())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sheet_name.is_empty() {
            return Err(PlanError::InvalidLayout("sheet name is empty".to_string()));
        }
        if self.header_row == 0 {
            return Err(PlanError::InvalidLayout(
                "header row is 1-based and must be at least 1".to_string(),
            ));
        }
        if self.key_column == 0 {
            return Err(PlanError::InvalidLayout(
                "key column is 1-based and must be at least 1".to_string(),
            ));
        }
        if self.payload.start == 0 {
            return Err(PlanError::InvalidLayout(
                "payload start column is 1-based and must be at least 1".to_string(),
            ));
        }
        if self.payload.width == 0 {
            return Err(PlanError::InvalidLayout(
                "payload width must be at least 1".to_string(),
            ));
        }
        if self.header_row > MAX_ROWS {
            return Err(PlanError::InvalidLayout(format!(
                "header row {} is past the last worksheet row {MAX_ROWS}",
                self.header_row
            )));
        }
        if self.key_column > MAX_COLUMNS {
            return Err(PlanError::InvalidLayout(format!(
                "key column {} is past the last worksheet column {MAX_COLUMNS}",
                self.key_column
            )));
        }
        match self.payload.checked_end() {
            Some(end) if end <= MAX_COLUMNS => {}
            _ => {
                return Err(PlanError::InvalidLayout(format!(
                    "payload of {} columns from column {} ends past the last worksheet column {MAX_COLUMNS}",
                    self.payload.width, self.payload.start
                )));
            }
        }
        if self.payload.contains(self.key_column) {
            return Err(PlanError::InvalidLayout(format!(
                "payload columns {}..={} overlap key column {}",
                self.payload.start,
                self.payload.end(),
                self.key_column
            )));
        }
        Ok(())
    }

    /// Decide whether a destination key may receive a copy.
    pub fn classify_key<'a>(&self, value: &'a CellValue) -> KeyClass<'a> {
        let Some(key) = value.key_text() else {
            return KeyClass::Skip(SkipReason::MissingKey);
        };
        if key == self.header_label {
            return KeyClass::Skip(SkipReason::HeaderLabel);
        }
        if !self.suite_marker.is_empty() && key.contains(self.suite_marker.as_str()) {
            return KeyClass::Skip(SkipReason::SuiteMarker);
        }
        KeyClass::Eligible(key)
    }
}

/// Why a destination row was left untouched without scanning the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    MissingKey,
    HeaderLabel,
    SuiteMarker,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingKey => "missing-key",
            Self::HeaderLabel => "header-label",
            Self::SuiteMarker => "suite-marker",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyClass<'a> {
    Eligible(Cow<'a, str>),
    Skip(SkipReason),
}
