use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlanError {
    /// Input path did not resolve, including after the executable-directory fallback.
    #[error("no such file: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The workbook has no sheet with the configured name.
    #[error("sheet '{sheet}' not found (available: {})", available.join(", "))]
    SheetNotFound {
        sheet: String,
        available: Vec<String>,
    },

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("{0}")]
    Message(String),
}

impl PlanError {
    /// Returns true when the error means an input document could not be located.
    ///
    /// Only [`PlanError::FileNotFound`] counts. A `NotFound` I/O error while
    /// writing an output or report is a failure of that write, not a missing input.
    #[must_use]
    pub fn is_file_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. })
    }
}


pub type Result<T> = std::result::Result<T, PlanError>;
