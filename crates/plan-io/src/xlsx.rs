//! Spreadsheet files on disk.
//!
//! Reading goes through calamine and accepts anything `open_workbook_auto`
//! understands (xlsx, xlsm, xlsb, xls, ods). A workbook read from an xlsx or
//! xlsm package is saved by patching that package, so only changed cells are
//! rewritten and formulas, styles, merged ranges and everything else survive.
//! Workbooks with no package behind them are written fresh via rust_xlsxwriter.

use std::path::Path;
use std::time::Instant;

use calamine::{Data, Reader, open_workbook_auto};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, XlsxError};
use tracing::{debug, info, warn};

use plan_model::{CellValue, MAX_COLUMNS, MAX_ROWS, PlanError, Result, Sheet, Workbook};

use crate::adapter::DocumentAdapter;
use crate::package::{CellEdit, PackageEdits, patch_package};

#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxAdapter;

impl XlsxAdapter {
    pub fn new() -> Self {
        Self
    }

    fn patch(&self, workbook: &Workbook, origin: &Path, path: &Path) -> Result<()> {
        let started = Instant::now();
        let mut edits = PackageEdits::new();
        for sheet in workbook.sheets() {
            let cells = sheet
                .changed_cells()
                .map(|(row, column, value)| {
                    Ok(CellEdit::new(
                        to_row(row - 1)? + 1,
                        u32::from(to_col(column - 1)?) + 1,
                        value.clone(),
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            edits.push_sheet(sheet.name(), cells);
        }
        let summary = patch_package(origin, path, &edits).map_err(|e| {
            PlanError::Spreadsheet(format!(
                "save {} from {}: {e}",
                path.display(),
                origin.display()
            ))
        })?;
        info!(
            path = %path.display(),
            origin = %origin.display(),
            cells = summary.cells,
            parts = summary.parts_rewritten,
            formulas_replaced = summary.formulas_replaced,
            duration_ms = started.elapsed().as_millis(),
            "saved workbook"
        );
        Ok(())
    }

    fn write_new(&self, workbook: &Workbook, path: &Path) -> Result<()> {
        let started = Instant::now();
        let mut output = XlsxWorkbook::new();
        for sheet in workbook.sheets() {
            let worksheet = output.add_worksheet();
            worksheet.set_name(sheet.name()).map_err(xlsx_error)?;
            for (row_index, cells) in sheet.rows().iter().enumerate() {
                if cells.is_empty() {
                    continue;
                }
                let row = to_row(row_index)?;
                for (col_index, value) in cells.iter().enumerate() {
                    if value.is_empty() {
                        continue;
                    }
                    let col = to_col(col_index)?;
                    match value {
                        CellValue::Empty => {}
                        CellValue::Text(text) | CellValue::Error(text) => {
                            worksheet.write_string(row, col, text).map_err(xlsx_error)?;
                        }
                        CellValue::Number(number) => {
                            worksheet
                                .write_number(row, col, *number)
                                .map_err(xlsx_error)?;
                        }
                        CellValue::DateTime(serial) => {
                            worksheet
                                .write_number_with_format(row, col, *serial, &date_format(*serial))
                                .map_err(xlsx_error)?;
                        }
                        CellValue::Bool(flag) => {
                            worksheet.write_boolean(row, col, *flag).map_err(xlsx_error)?;
                        }
                    }
                }
            }
        }
        output.save(path).map_err(|e| {
            PlanError::Spreadsheet(format!("save {}: {e}", path.display()))
        })?;
        info!(
            path = %path.display(),
            sheets = workbook.sheets().len(),
            duration_ms = started.elapsed().as_millis(),
            "wrote new workbook"
        );
        Ok(())
    }
}

impl DocumentAdapter for XlsxAdapter {
    fn open_workbook(&self, path: &Path) -> Result<Workbook> {
        if !path.is_file() {
            return Err(PlanError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let started = Instant::now();
        let mut source = open_workbook_auto(path)
            .map_err(|e| PlanError::Spreadsheet(format!("open {}: {e}", path.display())))?;
        let names: Vec<String> = source.sheet_names().to_vec();
        let mut workbook = Workbook::new();
        for name in names {
            let range = source.worksheet_range(&name).map_err(|e| {
                PlanError::Spreadsheet(format!("read sheet '{name}' in {}: {e}", path.display()))
            })?;
            // Range coordinates are relative to `start()`, which is 0-based.
            let (start_row, start_col) = range.start().unwrap_or((0, 0));
            let mut sheet = Sheet::new(name.as_str());
            let mut cells = 0usize;
            for (row, col, value) in range.used_cells() {
                let value = convert_value(value);
                if value == CellValue::Empty {
                    continue;
                }
                let row = start_row as usize + row + 1;
                let col = start_col as usize + col + 1;
                sheet.set_cell(row, col, value);
                cells += 1;
            }
            sheet.mark_clean();
            debug!(sheet = %name, cells, max_row = sheet.max_row(), "loaded sheet");
            workbook.push_sheet(sheet);
        }
        if is_package(path) {
            workbook = workbook.with_origin(path);
        }
        info!(
            path = %path.display(),
            sheets = workbook.sheets().len(),
            duration_ms = started.elapsed().as_millis(),
            "opened workbook"
        );
        Ok(workbook)
    }

    fn save_workbook(&self, workbook: &Workbook, path: &Path) -> Result<()> {
        match workbook.origin() {
            Some(origin) if is_package(origin) => self.patch(workbook, origin, path),
            Some(origin) => {
                warn!(
                    origin = %origin.display(),
                    "origin is not an xlsx package; writing values only"
                );
                self.write_new(workbook, path)
            }
            None => self.write_new(workbook, path),
        }
    }
}

/// xlsx and xlsm are zip packages that can be patched in place.
fn is_package(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xlsm"))
}

fn convert_value(value: &Data) -> CellValue {
    match value {
        Data::Empty => CellValue::Empty,
        Data::String(text) => CellValue::Text(text.clone()),
        Data::Float(number) => CellValue::Number(*number),
        Data::Int(number) => CellValue::Number(*number as f64),
        Data::Bool(flag) => CellValue::Bool(*flag),
        Data::DateTime(datetime) => CellValue::DateTime(datetime.as_f64()),
        Data::DateTimeIso(text) | Data::DurationIso(text) => CellValue::Text(text.clone()),
        Data::Error(error) => CellValue::Error(error.to_string()),
    }
}

/// Date, time or date-time display picked from the serial value.
fn date_format(serial: f64) -> Format {
    let has_date = serial.floor() > 0.0;
    let has_time = serial.fract().abs() > 0.0001;
    let pattern = match (has_date, has_time) {
        (true, true) => "m/d/yyyy h:mm",
        (false, true) => "h:mm:ss",
        _ => "m/d/yyyy",
    };
    Format::new().set_num_format(pattern)
}

fn to_row(index: usize) -> Result<u32> {
    if index >= MAX_ROWS {
        return Err(PlanError::Spreadsheet(format!(
            "row {} exceeds the xlsx limit of {MAX_ROWS}",
            index + 1
        )));
    }
    u32::try_from(index).map_err(|e| PlanError::Spreadsheet(e.to_string()))
}

fn to_col(index: usize) -> Result<u16> {
    if index >= MAX_COLUMNS {
        return Err(PlanError::Spreadsheet(format!(
            "column {} exceeds the xlsx limit of {MAX_COLUMNS}",
            index + 1
        )));
    }
    u16::try_from(index).map_err(|e| PlanError::Spreadsheet(e.to_string()))
}

fn xlsx_error(error: XlsxError) -> PlanError {
    PlanError::Spreadsheet(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_calamine_values() {
        assert_eq!(convert_value(&Data::Int(3)), CellValue::Number(3.0));
        assert_eq!(
            convert_value(&Data::String("TC.1".to_string())),
            CellValue::text("TC.1")
        );
        assert_eq!(convert_value(&Data::Bool(true)), CellValue::Bool(true));
        assert_eq!(convert_value(&Data::Empty), CellValue::Empty);
    }

    #[test]
    fn index_limits() {
        assert_eq!(to_row(0).unwrap(), 0);
        assert!(to_row(MAX_ROWS).is_err());
        assert_eq!(to_col(MAX_COLUMNS - 1).unwrap(), 16_383);
        assert!(to_col(MAX_COLUMNS).is_err());
    }

    #[test]
    fn packages_are_recognised_by_extension() {
        assert!(is_package(Path::new("plan.xlsx")));
        assert!(is_package(Path::new("PLAN.XLSM")));
        assert!(!is_package(Path::new("plan.xls")));
        assert!(!is_package(Path::new("plan.ods")));
    }
}
