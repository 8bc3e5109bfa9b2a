//! Cell values as read from a spreadsheet document.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell value. Formatting is not modelled, except that date and
/// time serials keep their kind so they can be written back as dates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Date, time or date-time as an Excel serial number (1900 date system).
    DateTime(f64),
    /// Spreadsheet error literal such as `#N/A`.
    Error(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(value) => value.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Text used when this cell acts as a match key.
    ///
    /// Text is returned verbatim (no trimming, no case folding). Numbers and
    /// booleans use their display form. Empty cells and empty strings have no key.
    pub fn key_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Empty => None,
            Self::Text(value) if value.is_empty() => None,
            Self::Text(value) => Some(Cow::Borrowed(value.as_str())),
            Self::Number(_) | Self::Bool(_) | Self::DateTime(_) | Self::Error(_) => {
                Some(Cow::Owned(self.to_string()))
            }
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(value) | Self::Error(value) => f.write_str(value),
            Self::Number(value) | Self::DateTime(value) => f.write_str(&format_number(*value)),
            Self::Bool(true) => f.write_str("TRUE"),
            Self::Bool(false) => f.write_str("FALSE"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T> From<Option<T>> for CellValue
where
    T: Into<CellValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

fn format_number(value: f64) -> String {
    // Whole numbers print without a trailing ".0" so 1001 and "1001" compare equal.
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_text_is_verbatim_for_text() {
        let cell = CellValue::text(" TC.Login.001 ");
        assert_eq!(cell.key_text().as_deref(), Some(" TC.Login.001 "));
    }

    #[test]
    fn empty_string_has_no_key() {
        assert!(CellValue::text("").key_text().is_none());
        assert!(CellValue::Empty.key_text().is_none());
    }

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(CellValue::Number(1001.0).key_text().as_deref(), Some("1001"));
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
        assert_eq!(CellValue::Bool(true).to_string(), "TRUE");
    }

    #[test]
    fn date_serials_key_like_numbers() {
        let date = CellValue::DateTime(45123.0);
        assert_eq!(date.key_text().as_deref(), Some("45123"));
        assert_ne!(date, CellValue::Number(45123.0));
    }

    #[test]
    fn option_conversion() {
        assert_eq!(CellValue::from(None::<&str>), CellValue::Empty);
        assert_eq!(CellValue::from(Some("A")), CellValue::text("A"));
    }
}
