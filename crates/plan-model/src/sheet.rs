//! 1-indexed sheet grid.
//!
//! Rows and columns are addressed the way spreadsheet users see them: row 1,
//! column 1 is the top-left cell. Reads outside the stored grid yield
//! [`CellValue::Empty`]; the grid never shrinks.
//!
//! Writes through [`Sheet::set_cell`] that change a value are remembered so a
//! document adapter can persist just those cells.

use std::collections::BTreeSet;

use crate::cell::CellValue;

static EMPTY_CELL: CellValue = CellValue::Empty;

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    /// `rows[0]` holds row 1. Rows may be ragged.
    rows: Vec<Vec<CellValue>>,
    /// `(row, column)` of cells whose value changed since the last `mark_clean`.
    changed: BTreeSet<(usize, usize)>,
}

/// Sheets compare by name and contents; the change log is bookkeeping.
impl PartialEq for Sheet {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.rows == other.rows
    }
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            changed: BTreeSet::new(),
        }
    }

    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
            changed: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Last row index that holds stored cells (0 for an empty sheet).
    pub fn max_row(&self) -> usize {
        self.rows.len()
    }

    pub fn max_column(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        if row == 0 || column == 0 {
            return &EMPTY_CELL;
        }
        self.rows
            .get(row - 1)
            .and_then(|cells| cells.get(column - 1))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Overwrite one cell, growing the grid when needed.
    ///
    /// Writing `Empty` outside the stored grid is a no-op, so clearing a cell
    /// never changes the sheet dimensions. Writing the value a cell already
    /// holds is not recorded as a change.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `column` is 0.
    pub fn set_cell(&mut self, row: usize, column: usize, value: CellValue) {
        assert!(row > 0 && column > 0, "sheet coordinates are 1-indexed");
        let in_grid = self
            .rows
            .get(row - 1)
            .is_some_and(|cells| column <= cells.len());
        if !in_grid && value == CellValue::Empty {
            return;
        }
        if self.cell(row, column) == &value {
            return;
        }
        if self.rows.len() < row {
            self.rows.resize_with(row, Vec::new);
        }
        let cells = &mut self.rows[row - 1];
        if cells.len() < column {
            cells.resize_with(column, CellValue::default);
        }
        cells[column - 1] = value;
        self.changed.insert((row, column));
    }

    /// Cells changed since the sheet was loaded, in row-major order.
    pub fn changed_cells(&self) -> impl Iterator<Item = (usize, usize, &CellValue)> + '_ {
        self.changed
            .iter()
            .map(|&(row, column)| (row, column, self.cell(row, column)))
    }

    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Forget recorded changes, typically right after loading.
    pub fn mark_clean(&mut self) {
        self.changed.clear();
    }

    pub fn row(&self, row: usize) -> RowView<'_> {
        RowView::new(self, row, 1, self.max_column().max(1))
    }

    /// Range-restricted row iteration, inclusive on both ends.
    ///
    /// Each view only exposes columns `min_col..=max_col`; reading outside
    /// that window yields `Empty` even if the sheet stores a value there.
    pub fn iter_rows(
        &self,
        min_row: usize,
        max_row: usize,
        min_col: usize,
        max_col: usize,
    ) -> impl Iterator<Item = RowView<'_>> + '_ {
        let min_row = min_row.max(1);
        (min_row..=max_row).map(move |row| RowView::new(self, row, min_col, max_col))
    }
}

/// Read-only view of one row restricted to a column window.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    index: usize,
    min_col: usize,
    max_col: usize,
    cells: &'a [CellValue],
}

impl<'a> RowView<'a> {
    fn new(sheet: &'a Sheet, index: usize, min_col: usize, max_col: usize) -> Self {
        let cells = if index == 0 {
            &[][..]
        } else {
            sheet.rows.get(index - 1).map_or(&[][..], Vec::as_slice)
        };
        Self {
            index,
            min_col: min_col.max(1),
            max_col,
            cells,
        }
    }

    /// 1-based row index in the owning sheet.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cell(&self, column: usize) -> &'a CellValue {
        if column < self.min_col || column > self.max_col {
            return &EMPTY_CELL;
        }
        self.cells.get(column - 1).unwrap_or(&EMPTY_CELL)
    }

    /// Cells `start..start + width`, padded with `Empty` past the stored row.
    pub fn span(self, start: usize, width: usize) -> impl Iterator<Item = &'a CellValue> {
        (start..start.saturating_add(width)).map(move |column| self.cell(column))
    }
}
