//! Metadata model stored in the metadata segment.
//!
//! The mapping has four well-known sections (`source`, `about`, `schema`, `stats`) and keeps
//! any other field it does not recognize, so older readers pass newer metadata through intact.
//! `schema` and `stats` are ordered tables addressed by the same 1-based column position used for
//! row values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{RowpackError, RowpackResult};
use crate::format::{decode_metadata, encode_metadata};
use crate::types::{Cell, ValueType};

/// Provenance of the container's rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// RFC 3339 timestamp of when the source was fetched or opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// Row counts and the header/data boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct About {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Every stored record, whatever its flag.
    #[serde(default)]
    pub n_records: u64,
    /// Data rows inside `[data_start_row, data_end_row]`.
    #[serde(default)]
    pub n_rows: u64,
    #[serde(default)]
    pub n_cols: u64,
    #[serde(default)]
    pub data_start_row: u64,
    #[serde(default)]
    pub data_end_row: u64,
    #[serde(default)]
    pub header_rows: Vec<u64>,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// One row of the schema table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// 1-based column position.
    pub pos: usize,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fixed-width start offset, when the source declared one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<usize>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl ColumnSchema {
    pub fn new(pos: usize, name: impl Into<String>) -> Self {
        Self {
            pos,
            name: name.into(),
            value_type: None,
            description: None,
            start: None,
            width: None,
            extra: BTreeMap::new(),
        }
    }
}

/// One row of the stats table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub pos: usize,
    pub name: String,
    /// All cells seen, nulls included.
    pub count: u64,
    pub nulls: u64,
    /// Cells that contributed to `mean`/`std`.
    pub numeric_count: u64,
    pub mean: Option<f64>,
    /// Sample standard deviation.
    pub std: Option<f64>,
    pub min: Option<Cell>,
    pub max: Option<Cell>,
    pub distinct: u64,
    /// True when distinct tracking hit its cap; `distinct` is then a lower bound.
    pub distinct_saturated: bool,
    pub max_length: usize,
}

impl ColumnStats {
    /// False when any number here has no JSON form.
    pub fn is_finite(&self) -> bool {
        let finite_cell = |c: &Option<Cell>| !matches!(c, Some(Cell::Float(f)) if !f.is_finite());
        self.mean.is_none_or(f64::is_finite)
            && self.std.is_none_or(f64::is_finite)
            && finite_cell(&self.min)
            && finite_cell(&self.max)
    }
}

/// Column address: 1-based position or current name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKey {
    Pos(usize),
    Name(String),
}

impl From<usize> for ColumnKey {
    fn from(pos: usize) -> Self {
        ColumnKey::Pos(pos)
    }
}

impl From<&str> for ColumnKey {
    fn from(name: &str) -> Self {
        ColumnKey::Name(name.to_owned())
    }
}

impl From<String> for ColumnKey {
    fn from(name: String) -> Self {
        ColumnKey::Name(name)
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKey::Pos(p) => write!(f, "at position {p}"),
            ColumnKey::Name(n) => write!(f, "named '{n}'"),
        }
    }
}

/// The full metadata mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub source: SourceMeta,
    #[serde(default)]
    pub about: About,
    #[serde(default)]
    pub schema: Vec<ColumnSchema>,
    #[serde(default)]
    pub stats: Vec<ColumnStats>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl Metadata {
    /// Column names in position order.
    pub fn headers(&self) -> Vec<String> {
        self.schema.iter().map(|c| c.name.clone()).collect()
    }

    pub fn n_cols(&self) -> usize {
        self.schema.len()
    }

    fn index_of(&self, key: &ColumnKey) -> Option<usize> {
        match key {
            ColumnKey::Pos(p) => (*p >= 1 && *p <= self.schema.len()).then(|| p - 1),
            ColumnKey::Name(n) => self.schema.iter().position(|c| &c.name == n),
        }
    }

    pub fn column(&self, key: impl Into<ColumnKey>) -> Option<&ColumnSchema> {
        let key = key.into();
        self.index_of(&key).map(|i| &self.schema[i])
    }

    /// Live view of one schema row; edits land directly in the table.
    pub fn column_mut(&mut self, key: impl Into<ColumnKey>) -> RowpackResult<Column<'_>> {
        let key = key.into();
        match self.index_of(&key) {
            Some(i) => Ok(Column::new(&mut self.schema[i])),
            None => Err(RowpackError::ColumnNotFound {
                key: key.to_string(),
            }),
        }
    }

    pub fn columns_mut(&mut self) -> impl Iterator<Item = Column<'_>> {
        self.schema.iter_mut().map(Column::new)
    }

    /// Grow the schema to `n` columns, naming new ones `col{pos}`.
    pub fn ensure_columns(&mut self, n: usize) {
        while self.schema.len() < n {
            let pos = self.schema.len() + 1;
            self.schema.push(ColumnSchema::new(pos, default_header(pos)));
        }
    }

    /// Replace column names, growing or shrinking the schema to match.
    pub fn set_headers<S: AsRef<str>>(&mut self, names: &[S]) {
        self.schema.truncate(names.len());
        self.ensure_columns(names.len());
        for (col, name) in self.schema.iter_mut().zip(names) {
            col.name = name.as_ref().to_owned();
        }
        self.sync();
    }

    /// Set `schema.type` for each listed column.
    pub fn set_column_types<K, I>(&mut self, types: I) -> RowpackResult<()>
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = (K, ValueType)>,
    {
        for (key, value_type) in types {
            self.column_mut(key)?.set_type(value_type);
        }
        Ok(())
    }

    pub fn stats_for(&self, key: impl Into<ColumnKey>) -> Option<&ColumnStats> {
        let pos = self.index_of(&key.into())? + 1;
        self.stats.iter().find(|s| s.pos == pos)
    }

    /// Re-derive `about.headers`/`about.n_cols` and renumber positions from the schema table.
    pub fn sync(&mut self) {
        for (i, col) in self.schema.iter_mut().enumerate() {
            col.pos = i + 1;
        }
        self.about.headers = self.headers();
        self.about.n_cols = self.schema.len() as u64;
    }

    pub fn to_json(&self) -> RowpackResult<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: JsonValue) -> RowpackResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| RowpackError::corrupt(format!("metadata does not match the expected shape: {e}")))
    }

    /// Encode to the metadata segment representation.
    ///
    /// JSON has no encoding for NaN or infinity, so statistics holding one are rejected here
    /// rather than written as a segment that cannot be read back.
    pub fn to_bytes(&self) -> RowpackResult<Vec<u8>> {
        if let Some(stats) = self.stats.iter().find(|s| !s.is_finite()) {
            return Err(RowpackError::SchemaMismatch {
                message: format!("statistics for column '{}' hold a non-finite number", stats.name),
            });
        }
        encode_metadata(&self.to_json()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> RowpackResult<Self> {
        Self::from_json(decode_metadata(bytes)?)
    }
}

/// Live view bound to one schema row.
///
/// Holds no state of its own; every getter and setter goes straight to the borrowed row.
#[derive(Debug)]
pub struct Column<'a> {
    row: &'a mut ColumnSchema,
}

impl<'a> Column<'a> {
    fn new(row: &'a mut ColumnSchema) -> Self {
        Self { row }
    }

    pub fn pos(&self) -> usize {
        self.row.pos
    }

    pub fn name(&self) -> &str {
        &self.row.name
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.row.value_type
    }

    pub fn description(&self) -> Option<&str> {
        self.row.description.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.row.name = name.into();
        self
    }

    pub fn set_type(&mut self, value_type: ValueType) -> &mut Self {
        self.row.value_type = Some(value_type);
        self
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.row.description = Some(description.into());
        self
    }

    /// Read any field by its metadata name.
    pub fn get(&self, field: &str) -> Option<JsonValue> {
        match field {
            "pos" => Some(JsonValue::from(self.row.pos)),
            "name" => Some(JsonValue::from(self.row.name.clone())),
            "type" => self.row.value_type.map(|t| JsonValue::from(t.as_str())),
            "description" => self.row.description.clone().map(JsonValue::from),
            "start" => self.row.start.map(JsonValue::from),
            "width" => self.row.width.map(JsonValue::from),
            other => self.row.extra.get(other).cloned(),
        }
    }

    /// Write any field by its metadata name. `pos` is fixed for the container's lifetime.
    pub fn set(&mut self, field: &str, value: JsonValue) -> RowpackResult<&mut Self> {
        let pos = self.row.pos;
        let invalid = |what: &str| RowpackError::SchemaMismatch {
            message: format!("column {pos} field '{field}' expects {what}"),
        };
        match field {
            "pos" => return Err(invalid("no writes (positions are fixed)")),
            "name" => self.row.name = value.as_str().ok_or_else(|| invalid("a string"))?.to_owned(),
            "type" => {
                let t = value.as_str().ok_or_else(|| invalid("a type name"))?;
                self.row.value_type = Some(t.parse().map_err(|_| invalid("a known type name"))?);
            }
            "description" => self.row.description = value.as_str().map(str::to_owned),
            "start" => self.row.start = value.as_u64().map(|v| v as usize),
            "width" => self.row.width = value.as_u64().map(|v| v as usize),
            other => {
                self.row.extra.insert(other.to_owned(), value);
            }
        }
        Ok(self)
    }
}

/// Name used for a column with no header text.
pub fn default_header(pos: usize) -> String {
    format!("col{pos}")
}

/// Lower-case and collapse every run of non-alphanumeric characters into a single `_`.
pub fn normalize_header(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_sep = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Build one name per column from the header rows, joining the rows' text per position with `_`.
pub fn synthesize_headers(header_rows: &[Vec<Cell>], n_cols: usize) -> Vec<String> {
    (0..n_cols)
        .map(|i| {
            let parts: Vec<String> = header_rows
                .iter()
                .filter_map(|row| row.get(i))
                .filter(|cell| !cell.is_empty())
                .map(|cell| normalize_header(&cell.to_string()))
                .filter(|part| !part.is_empty())
                .collect();
            if parts.is_empty() {
                default_header(i + 1)
            } else {
                parts.join("_")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cells(values: &[&str]) -> Vec<Cell> {
        values.iter().map(|v| Cell::from(*v)).collect()
    }

    #[test]
    fn non_finite_stats_are_refused_before_encoding() {
        let mut meta = Metadata::default();
        meta.stats.push(ColumnStats {
            pos: 1,
            name: "reading".into(),
            mean: Some(f64::INFINITY),
            ..ColumnStats::default()
        });
        assert!(matches!(meta.to_bytes(), Err(RowpackError::SchemaMismatch { .. })));
        meta.stats[0].mean = Some(1.5);
        meta.stats[0].max = Some(Cell::Float(f64::NAN));
        assert!(meta.to_bytes().is_err());
        meta.stats[0].max = Some(Cell::Float(2.0));
        assert_eq!(Metadata::from_bytes(&meta.to_bytes().unwrap()).unwrap(), meta);
    }

    #[test]
    fn two_header_rows_join_per_column() {
        let rows = vec![cells(&["a", "b"]), cells(&["x", "y"])];
        assert_eq!(synthesize_headers(&rows, 2), vec!["a_x", "b_y"]);
    }

    #[test]
    fn header_text_is_normalized_and_gaps_named_by_position() {
        let rows = vec![
            vec![Cell::from("Total Population (2010)"), Cell::Null, Cell::from("Rate, %")],
            vec![Cell::from(""), Cell::Null, Cell::Int(2012)],
        ];
        assert_eq!(
            synthesize_headers(&rows, 4),
            vec!["total_population_2010", "col2", "rate_2012", "col4"]
        );
    }

    #[test]
    fn no_header_rows_yield_positional_names() {
        assert_eq!(synthesize_headers(&[], 3), vec!["col1", "col2", "col3"]);
    }

    #[test]
    fn column_view_edits_land_in_schema() {
        let mut meta = Metadata::default();
        meta.set_headers(&["a", "b", "c", "d"]);

        meta.column_mut(1usize).unwrap().set_description("one");
        meta.column_mut("c").unwrap().set_description("C");
        meta.column_mut("d").unwrap().set("description", json!("D")).unwrap();
        meta.column_mut(2usize).unwrap().set("unit", json!("kg")).unwrap();

        assert_eq!(meta.schema[0].description.as_deref(), Some("one"));
        assert_eq!(meta.schema[2].description.as_deref(), Some("C"));
        assert_eq!(meta.schema[3].description.as_deref(), Some("D"));
        assert_eq!(meta.schema[1].extra.get("unit"), Some(&json!("kg")));
        assert!(meta.column_mut("zz").is_err());
        assert!(meta.column_mut(0usize).is_err());
    }

    #[test]
    fn position_is_not_writable() {
        let mut meta = Metadata::default();
        meta.set_headers(&["a"]);
        assert!(meta.column_mut(1usize).unwrap().set("pos", json!(5)).is_err());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let mut meta = Metadata::default();
        meta.set_headers(&["a", "b"]);
        meta.extra.insert("partition".to_string(), json!({"segment": 3}));
        meta.source.extra.insert("etag".to_string(), json!("abc"));
        meta.column_mut(1usize).unwrap().set_type(ValueType::Int);
        meta.stats.push(ColumnStats {
            pos: 1,
            name: "a".to_string(),
            count: 3,
            min: Some(Cell::Int(1)),
            max: Some(Cell::Int(9)),
            ..Default::default()
        });

        let back = Metadata::from_bytes(&meta.to_bytes().unwrap()).unwrap();
        assert_eq!(back, meta);
        assert_eq!(back.about.headers, vec!["a", "b"]);
    }
}
