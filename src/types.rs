//! Core data model types: scalar cells, column types and row tags.
//!
//! Every stored cell carries its own [`ScalarKind`], so a column can hold heterogeneous values
//! (a numeric column with one stray text cell round-trips losslessly). Column-wide types
//! ([`ValueType`]) are advisory metadata, never enforced on the cells.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Runtime kind of a single [`Cell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Date,
    Time,
    DateTime,
    Binary,
}

/// A single decoded value in a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    /// Missing value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// Date and time without zone.
    DateTime(NaiveDateTime),
    /// Opaque bytes.
    Binary(Vec<u8>),
}

impl Cell {
    /// Runtime kind tag of this cell.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Cell::Null => ScalarKind::Null,
            Cell::Bool(_) => ScalarKind::Bool,
            Cell::Int(_) => ScalarKind::Int,
            Cell::Float(_) => ScalarKind::Float,
            Cell::Str(_) => ScalarKind::Str,
            Cell::Date(_) => ScalarKind::Date,
            Cell::Time(_) => ScalarKind::Time,
            Cell::DateTime(_) => ScalarKind::DateTime,
            Cell::Binary(_) => ScalarKind::Binary,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// True for nulls and for strings that are empty after trimming.
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Str(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Str(s) => f.write_str(s),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Cell::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Cell::Binary(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Cell::Bool(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<i32> for Cell {
    fn from(v: i32) -> Self {
        Cell::Int(i64::from(v))
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Str(v.to_owned())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Str(v)
    }
}

impl From<NaiveDate> for Cell {
    fn from(v: NaiveDate) -> Self {
        Cell::Date(v)
    }
}

impl From<NaiveTime> for Cell {
    fn from(v: NaiveTime) -> Self {
        Cell::Time(v)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(v: NaiveDateTime) -> Self {
        Cell::DateTime(v)
    }
}

impl From<Vec<u8>> for Cell {
    fn from(v: Vec<u8>) -> Self {
        Cell::Binary(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// Column-level type recorded in the schema table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    Float,
    Bool,
    Date,
    Time,
    DateTime,
    String,
    Binary,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::Date => "date",
            ValueType::Time => "time",
            ValueType::DateTime => "datetime",
            ValueType::String => "string",
            ValueType::Binary => "binary",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ValueType::Date | ValueType::Time | ValueType::DateTime)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "int64" => Ok(ValueType::Int),
            "float" | "real" | "double" | "float64" => Ok(ValueType::Float),
            "bool" | "boolean" => Ok(ValueType::Bool),
            "date" => Ok(ValueType::Date),
            "time" => Ok(ValueType::Time),
            "datetime" | "timestamp" => Ok(ValueType::DateTime),
            "string" | "str" | "text" | "unicode" => Ok(ValueType::String),
            "binary" | "bytes" => Ok(ValueType::Binary),
            other => Err(format!("unknown column type '{other}'")),
        }
    }
}

/// Classification flag stored with every row record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowFlag {
    /// Header line.
    Header,
    /// Data line.
    Data,
    /// Blank or ignored line (titles, footnotes, separators).
    Blank,
}

impl RowFlag {
    pub fn as_char(&self) -> char {
        match self {
            RowFlag::Header => 'H',
            RowFlag::Data => 'D',
            RowFlag::Blank => 'B',
        }
    }

    pub(crate) fn to_byte(self) -> u8 {
        self.as_char() as u8
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'H' => Some(RowFlag::Header),
            b'D' => Some(RowFlag::Data),
            b'B' => Some(RowFlag::Blank),
            _ => None,
        }
    }
}

/// Which part of the source a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowGroup {
    /// Rows before the data start: titles, blank separators, header lines.
    Meta,
    /// Rows from the data start onward.
    Data,
}

impl RowGroup {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            RowGroup::Meta => 0,
            RowGroup::Data => 1,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RowGroup::Meta),
            1 => Some(RowGroup::Data),
            _ => None,
        }
    }
}

/// Positional tag stored with each row record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowTag {
    pub group: RowGroup,
    /// 1-based ordinal in original source order.
    pub row_number: u64,
    pub flag: RowFlag,
}

impl RowTag {
    pub fn new(group: RowGroup, row_number: u64, flag: RowFlag) -> Self {
        Self {
            group,
            row_number,
            flag,
        }
    }

    pub fn header(row_number: u64) -> Self {
        Self::new(RowGroup::Meta, row_number, RowFlag::Header)
    }

    pub fn data(row_number: u64) -> Self {
        Self::new(RowGroup::Data, row_number, RowFlag::Data)
    }

    pub fn blank(group: RowGroup, row_number: u64) -> Self {
        Self::new(group, row_number, RowFlag::Blank)
    }
}

/// A stored row: tag plus values.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub tag: RowTag,
    pub values: Vec<Cell>,
}

#[cfg(test)]
mod tests {
    use super::{Cell, RowFlag, ScalarKind, ValueType};
    use chrono::NaiveDate;

    #[test]
    fn empty_covers_null_and_blank_strings() {
        assert!(Cell::Null.is_empty());
        assert!(Cell::from("   ").is_empty());
        assert!(!Cell::from("x").is_empty());
        assert!(!Cell::Int(0).is_empty());
    }

    #[test]
    fn option_converts_to_null() {
        let none: Option<i64> = None;
        assert_eq!(Cell::from(none), Cell::Null);
        assert_eq!(Cell::from(Some(3_i64)).kind(), ScalarKind::Int);
    }

    #[test]
    fn display_formats_temporal_cells() {
        let d = NaiveDate::from_ymd_opt(2015, 3, 9).unwrap();
        assert_eq!(Cell::Date(d).to_string(), "2015-03-09");
        assert_eq!(Cell::Binary(vec![0xde, 0xad]).to_string(), "dead");
    }

    #[test]
    fn value_type_parses_aliases() {
        assert_eq!("Integer".parse::<ValueType>().unwrap(), ValueType::Int);
        assert_eq!("timestamp".parse::<ValueType>().unwrap(), ValueType::DateTime);
        assert!("decimal(3)".parse::<ValueType>().is_err());
    }

    #[test]
    fn flag_byte_round_trip() {
        for flag in [RowFlag::Header, RowFlag::Data, RowFlag::Blank] {
            assert_eq!(RowFlag::from_byte(flag.to_byte()), Some(flag));
        }
        assert_eq!(RowFlag::from_byte(b'Z'), None);
    }
}
