//! Declarative description of a source and its overrides.
//!
//! A [`SourceSpec`] is usually loaded from JSON:
//!
//! ```
//! use rowpack::config::SourceSpec;
//!
//! let spec = SourceSpec::from_json_str(r#"{
//!     "name": "rent",
//!     "url": "https://example.com/rent.csv",
//!     "header_lines": [4, 5],
//!     "start_line": 6,
//!     "columns": [{"name": "id", "type": "int"}, {"name": "amount", "type": "float"}]
//! }"#)?;
//! assert_eq!(spec.header_lines, Some(vec![4, 5]));
//! # Ok::<(), rowpack::RowpackError>(())
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RowpackResult;
use crate::meta::{ColumnSchema, default_header};
use crate::source::SourceFormat;
use crate::types::ValueType;

/// How to choose sheet(s) of a workbook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcelSheetSelection {
    /// The first sheet.
    #[default]
    First,
    /// A single named sheet.
    Sheet(String),
    /// Every sheet in workbook order, rows concatenated.
    AllSheets,
    /// The listed sheets in the given order, rows concatenated.
    Sheets(Vec<String>),
}

/// Declared column facts. All fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSpec {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub value_type: Option<ValueType>,
    pub description: Option<String>,
    /// 1-based character offset of a fixed-width field.
    pub start: Option<usize>,
    /// Character width of a fixed-width field.
    pub width: Option<usize>,
}

impl ColumnSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    /// Copy declared facts onto a schema row. Names are handled separately.
    pub(crate) fn apply(&self, col: &mut ColumnSchema) {
        if let Some(t) = self.value_type {
            col.value_type = Some(t);
        }
        if let Some(d) = &self.description {
            col.description = Some(d.clone());
        }
        col.start = self.start.or(col.start);
        col.width = self.width.or(col.width);
    }
}

/// Where a source lives and what is already known about its layout.
///
/// Every layout field is an override: when present it wins over what the intuiters infer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSpec {
    pub name: Option<String>,
    pub url: Option<String>,
    /// Explicit format; otherwise inferred from the file extension.
    pub format: Option<SourceFormat>,
    pub encoding: Option<String>,
    /// Field delimiter for delimited text.
    pub delimiter: Option<char>,
    pub sheets: ExcelSheetSelection,
    /// 1-based row numbers of the header rows.
    pub header_lines: Option<Vec<u64>>,
    /// 1-based row number of the first data row.
    pub start_line: Option<u64>,
    /// 1-based row number of the last data row.
    pub end_line: Option<u64>,
    pub columns: Vec<ColumnSpec>,
}

impl SourceSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> RowpackResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> RowpackResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Text encoding of the source. Only UTF-8 labels are accepted at load time.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_header_lines(mut self, lines: Vec<u64>) -> Self {
        self.header_lines = Some(lines);
        self
    }

    pub fn with_start_line(mut self, line: u64) -> Self {
        self.start_line = Some(line);
        self
    }

    pub fn with_end_line(mut self, line: u64) -> Self {
        self.end_line = Some(line);
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnSpec>) -> Self {
        self.columns = columns;
        self
    }

    /// Declared names for `n_cols` columns, or `None` when no column declares a name.
    /// Unnamed positions get `col{pos}`.
    pub fn declared_names(&self, n_cols: usize) -> Option<Vec<String>> {
        if self.columns.iter().all(|c| c.name.is_none()) {
            return None;
        }
        let names = (0..n_cols.max(self.columns.len()))
            .map(|i| {
                self.columns
                    .get(i)
                    .and_then(|c| c.name.clone())
                    .unwrap_or_else(|| default_header(i + 1))
            })
            .collect();
        Some(names)
    }

    /// `(position, type)` for each column with a declared type.
    pub fn declared_types(&self) -> Vec<(usize, ValueType)> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.value_type.map(|t| (i + 1, t)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_keeps_overrides() {
        let spec = SourceSpec::from_json_str(
            r#"{"format": "tsv", "delimiter": ";", "end_line": 20,
                "sheets": {"sheet": "Data"},
                "columns": [{"name": "a"}, {"type": "date", "start": 5, "width": 8}]}"#,
        )
        .unwrap();
        assert_eq!(spec.format, Some(SourceFormat::Tsv));
        assert_eq!(spec.delimiter, Some(';'));
        assert_eq!(spec.sheets, ExcelSheetSelection::Sheet("Data".into()));
        assert_eq!(spec.end_line, Some(20));
        assert_eq!(spec.columns[1].width, Some(8));
        assert_eq!(spec.declared_types(), vec![(2, ValueType::Date)]);
        assert_eq!(
            spec.declared_names(3),
            Some(vec!["a".to_owned(), "col2".to_owned(), "col3".to_owned()])
        );
    }

    #[test]
    fn mistyped_fields_are_json_errors() {
        let err = SourceSpec::from_json_str(r#"{"header_lines": "x"}"#).unwrap_err();
        assert!(matches!(err, crate::RowpackError::Json(_)));
    }

    #[test]
    fn no_declared_names_means_none() {
        let spec = SourceSpec::new().with_columns(vec![ColumnSpec::default().with_width(3)]);
        assert_eq!(spec.declared_names(2), None);
    }
}
