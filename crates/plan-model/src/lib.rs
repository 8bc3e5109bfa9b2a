pub mod cell;
pub mod error;
pub mod layout;
pub mod sheet;
pub mod workbook;

pub use cell::CellValue;
pub use error::{PlanError, Result};
pub use layout::{KeyClass, MAX_COLUMNS, MAX_ROWS, PayloadSpan, PlanLayout, SkipReason};
pub use sheet::{RowView, Sheet};
pub use workbook::Workbook;
