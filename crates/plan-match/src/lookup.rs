//! Source key lookups.

use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use plan_model::Sheet;

/// Inclusive row window and key column scanned in the source sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub first_row: usize,
    pub last_row: usize,
    pub key_column: usize,
}

impl ScanRange {
    pub fn new(first_row: usize, last_row: usize, key_column: usize) -> Self {
        Self {
            first_row,
            last_row,
            key_column,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_row > self.last_row
    }
}

/// Resolves a destination key to a source row.
pub trait KeyLookup {
    /// Index of the lowest source row in range whose key equals `key`.
    fn find(&self, key: &str) -> Option<usize>;

    /// Source rows hidden behind an earlier row with the same key, when the
    /// lookup saw the whole range while building. Scans report `None`.
    fn shadowed_rows(&self) -> Option<usize> {
        None
    }
}

/// Re-reads the source from the top of the range on every call.
pub struct NaiveScan<'s> {
    source: &'s Sheet,
    range: ScanRange,
}

impl<'s> NaiveScan<'s> {
    pub fn new(source: &'s Sheet, range: ScanRange) -> Self {
        Self { source, range }
    }
}

impl KeyLookup for NaiveScan<'_> {
    fn find(&self, key: &str) -> Option<usize> {
        let mut found = None;
        let mut pos = self.range.first_row;
        while found.is_none() && pos <= self.range.last_row {
            let candidate = self.source.cell(pos, self.range.key_column);
            if candidate.key_text().as_deref() == Some(key) {
                found = Some(pos);
            }
            pos += 1;
        }
        found
    }
}

/// Iterates only the key column of the range and stops at the first hit.
pub struct EarlyExitScan<'s> {
    source: &'s Sheet,
    range: ScanRange,
}

impl<'s> EarlyExitScan<'s> {
    pub fn new(source: &'s Sheet, range: ScanRange) -> Self {
        Self { source, range }
    }
}

impl KeyLookup for EarlyExitScan<'_> {
    fn find(&self, key: &str) -> Option<usize> {
        let column = self.range.key_column;
        self.source
            .iter_rows(self.range.first_row, self.range.last_row, column, column)
            .find(|row| row.cell(column).key_text().as_deref() == Some(key))
            .map(|row| row.index())
    }
}

/// Key to first row index, built in one pass over the source range.
#[derive(Debug, Default)]
pub struct HashIndex<'s> {
    rows: HashMap<Cow<'s, str>, usize>,
    duplicates: usize,
}

impl<'s> HashIndex<'s> {
    pub fn build(source: &'s Sheet, range: ScanRange) -> Self {
        let column = range.key_column;
        let mut index = Self::default();
        if range.is_empty() {
            return index;
        }
        for row in source.iter_rows(range.first_row, range.last_row, column, column) {
            let Some(key) = row.cell(column).key_text() else {
                continue;
            };
            // Keep the first occurrence so scan order decides duplicates.
            match index.rows.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(row.index());
                }
                Entry::Occupied(_) => index.duplicates += 1,
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl KeyLookup for HashIndex<'_> {
    fn find(&self, key: &str) -> Option<usize> {
        self.rows.get(key).copied()
    }

    fn shadowed_rows(&self) -> Option<usize> {
        Some(self.duplicates)
    }
}
