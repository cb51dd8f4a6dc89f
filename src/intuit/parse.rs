//! Cell classification shared by the row and type intuiters and the statistics pass.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::types::Cell;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%b %d, %Y"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// What a single cell looks like, after parsing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellClass {
    Empty,
    Int,
    Float,
    Date,
    Time,
    DateTime,
    Text,
}

impl CellClass {
    /// Numeric or temporal.
    pub(crate) fn is_typed(self) -> bool {
        !matches!(self, CellClass::Empty | CellClass::Text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Temporal {
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl Temporal {
    /// Total order across subtypes: dates sit at midnight, times on the epoch date.
    pub(crate) fn as_datetime(self) -> NaiveDateTime {
        match self {
            Temporal::Date(d) => d.and_time(NaiveTime::MIN),
            Temporal::Time(t) => NaiveDate::default().and_time(t),
            Temporal::DateTime(dt) => dt,
        }
    }
}

pub(crate) fn classify(cell: &Cell) -> CellClass {
    match cell {
        Cell::Null => CellClass::Empty,
        Cell::Int(_) => CellClass::Int,
        Cell::Float(f) if f.is_nan() => CellClass::Empty,
        Cell::Float(_) => CellClass::Float,
        Cell::Date(_) => CellClass::Date,
        Cell::Time(_) => CellClass::Time,
        Cell::DateTime(_) => CellClass::DateTime,
        Cell::Bool(_) | Cell::Binary(_) => CellClass::Text,
        Cell::Str(s) => classify_str(s),
    }
}

pub(crate) fn classify_str(s: &str) -> CellClass {
    let s = s.trim();
    if s.is_empty() {
        return CellClass::Empty;
    }
    if parse_int(s).is_some() {
        return CellClass::Int;
    }
    if parse_float(s).is_some() {
        return CellClass::Float;
    }
    match parse_temporal(s) {
        Some(Temporal::Date(_)) => CellClass::Date,
        Some(Temporal::Time(_)) => CellClass::Time,
        Some(Temporal::DateTime(_)) => CellClass::DateTime,
        None => CellClass::Text,
    }
}

/// Integer text that round-trips exactly. Leading zeros ("007") mark codes, not numbers.
pub(crate) fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

pub(crate) fn parse_float(s: &str) -> Option<f64> {
    let s = s.trim();
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s).as_bytes();
    if unsigned.len() > 1 && unsigned[0] == b'0' && unsigned[1].is_ascii_digit() {
        return None;
    }
    if !s
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
    {
        return None;
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

pub(crate) fn parse_temporal(s: &str) -> Option<Temporal> {
    let s = s.trim();
    // The shortest accepted form is "H:MM".
    if s.len() < 4 || !s.bytes().next().is_some_and(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(Temporal::DateTime(dt.naive_utc()));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Temporal::DateTime(dt));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(Temporal::Date(d));
        }
    }
    for fmt in TIME_FORMATS {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Some(Temporal::Time(t));
        }
    }
    None
}

/// Numeric view of a cell, parsing strings.
pub(crate) fn numeric_value(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Int(i) => Some(*i as f64),
        Cell::Float(f) if f.is_finite() => Some(*f),
        Cell::Str(s) => parse_int(s).map(|i| i as f64).or_else(|| parse_float(s)),
        _ => None,
    }
}

/// Temporal view of a cell, parsing strings.
pub(crate) fn temporal_value(cell: &Cell) -> Option<Temporal> {
    match cell {
        Cell::Date(d) => Some(Temporal::Date(*d)),
        Cell::Time(t) => Some(Temporal::Time(*t)),
        Cell::DateTime(dt) => Some(Temporal::DateTime(*dt)),
        Cell::Str(s) => parse_temporal(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_classify_by_first_successful_parse() {
        assert_eq!(classify_str("42"), CellClass::Int);
        assert_eq!(classify_str(" -3 "), CellClass::Int);
        assert_eq!(classify_str("1.5"), CellClass::Float);
        assert_eq!(classify_str("1e3"), CellClass::Float);
        assert_eq!(classify_str("2021-03-04"), CellClass::Date);
        assert_eq!(classify_str("12:30:00"), CellClass::Time);
        assert_eq!(classify_str("2021-03-04 12:30:00"), CellClass::DateTime);
        assert_eq!(classify_str("2021-03-04T12:30:00Z"), CellClass::DateTime);
        assert_eq!(classify_str("abc"), CellClass::Text);
        assert_eq!(classify_str("   "), CellClass::Empty);
        assert_eq!(classify_str("e"), CellClass::Text);
        assert_eq!(classify_str("nan"), CellClass::Text);
    }

    #[test]
    fn leading_zero_integers_are_codes() {
        assert_eq!(parse_int("007"), None);
        assert_eq!(parse_int("0"), Some(0));
        assert_eq!(classify_str("02134"), CellClass::Text);
        assert_eq!(parse_float("0.25"), Some(0.25));
    }

    #[test]
    fn native_cells_keep_their_kind() {
        assert_eq!(classify(&Cell::Int(1)), CellClass::Int);
        assert_eq!(classify(&Cell::Bool(true)), CellClass::Text);
        assert_eq!(classify(&Cell::Float(f64::NAN)), CellClass::Empty);
        assert_eq!(numeric_value(&Cell::from("2.5")), Some(2.5));
        assert!(temporal_value(&Cell::from("2020-01-01")).is_some());
    }
}
