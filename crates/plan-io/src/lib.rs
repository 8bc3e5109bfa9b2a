pub mod adapter;
pub mod outcome_csv;
pub mod package;
pub mod paths;
pub mod xlsx;

pub use adapter::{DocumentAdapter, MemoryAdapter};
pub use outcome_csv::{write_outcome_report, write_outcome_report_to_path};
pub use package::{CellEdit, PackageEdits, PatchError, PatchSummary, patch_package};
pub use paths::{executable_dir, resolve_input_path, resolve_with_fallback};
pub use xlsx::XlsxAdapter;
