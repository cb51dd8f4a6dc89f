//! Per-column value type inference.

use serde::Serialize;

use crate::error::RowpackResult;
use crate::intuit::parse::{CellClass, classify};
use crate::meta::default_header;
use crate::reader::Reader;
use crate::types::{Cell, ValueType};

/// Parse outcomes for one column over the sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub int: u64,
    pub float: u64,
    pub date: u64,
    pub time: u64,
    pub datetime: u64,
    pub string: u64,
    pub nulls: u64,
}

impl TypeCounts {
    fn record(&mut self, class: CellClass) {
        match class {
            CellClass::Empty => self.nulls += 1,
            CellClass::Int => self.int += 1,
            CellClass::Float => self.float += 1,
            CellClass::Date => self.date += 1,
            CellClass::Time => self.time += 1,
            CellClass::DateTime => self.datetime += 1,
            CellClass::Text => self.string += 1,
        }
    }

    /// Non-null cells seen.
    pub fn non_null(&self) -> u64 {
        self.int + self.float + self.date + self.time + self.datetime + self.string
    }

    /// Resolve the column type.
    ///
    /// Each candidate counts the cells it can hold: ints for int, ints and floats for float, all
    /// temporal cells for the temporal family. The best-supported candidate wins (ties favour
    /// int, then float, then temporal) provided it beats the number of plain strings; otherwise
    /// the column is a string. A temporal winner takes its most frequent subtype.
    pub fn resolve(&self) -> ValueType {
        if self.non_null() == 0 {
            return ValueType::String;
        }
        let temporal = self.date + self.time + self.datetime;
        let candidates = [
            (self.int, ValueType::Int),
            (self.int + self.float, ValueType::Float),
            (temporal, self.temporal_subtype()),
        ];
        let (support, winner) = candidates
            .iter()
            .copied()
            .fold((0, ValueType::String), |best, c| if c.0 > best.0 { c } else { best });
        if support > self.string {
            winner
        } else {
            ValueType::String
        }
    }

    fn temporal_subtype(&self) -> ValueType {
        if self.datetime >= self.date && self.datetime >= self.time {
            ValueType::DateTime
        } else if self.date >= self.time {
            ValueType::Date
        } else {
            ValueType::Time
        }
    }
}

/// Inference result for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnTypeReport {
    /// 1-based position.
    pub pos: usize,
    pub header: String,
    pub counts: TypeCounts,
    /// Longest non-null value, in characters.
    pub max_length: usize,
    pub resolved: ValueType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeReport {
    pub columns: Vec<ColumnTypeReport>,
    pub sampled_rows: u64,
}

impl TypeReport {
    /// `(position, type)` pairs ready for `set_column_types`.
    pub fn types(&self) -> impl Iterator<Item = (usize, ValueType)> + '_ {
        self.columns.iter().map(|c| (c.pos, c.resolved))
    }

    pub fn column(&self, header: &str) -> Option<&ColumnTypeReport> {
        self.columns.iter().find(|c| c.header == header)
    }
}

/// Samples rows and tallies how each column's cells parse.
#[derive(Debug, Clone)]
pub struct TypeIntuiter {
    pub sample_size: usize,
    headers: Vec<String>,
}

impl Default for TypeIntuiter {
    fn default() -> Self {
        Self {
            sample_size: 5000,
            headers: Vec::new(),
        }
    }
}

struct Tally {
    counts: Vec<TypeCounts>,
    max_length: Vec<usize>,
    rows: u64,
}

impl Tally {
    fn new(n_cols: usize) -> Self {
        Self {
            counts: vec![TypeCounts::default(); n_cols],
            max_length: vec![0; n_cols],
            rows: 0,
        }
    }

    fn add(&mut self, row: &[Cell]) {
        if row.len() > self.counts.len() {
            // Earlier rows lacked these cells; count them as null.
            let missing = TypeCounts {
                nulls: self.rows,
                ..TypeCounts::default()
            };
            self.counts.resize(row.len(), missing);
            self.max_length.resize(row.len(), 0);
        }
        for (i, counts) in self.counts.iter_mut().enumerate() {
            let cell = row.get(i).unwrap_or(&Cell::Null);
            let class = classify(cell);
            counts.record(class);
            if class != CellClass::Empty {
                let len = match cell {
                    Cell::Str(s) => s.trim().chars().count(),
                    other => other.to_string().chars().count(),
                };
                self.max_length[i] = self.max_length[i].max(len);
            }
        }
        self.rows += 1;
    }
}

impl TypeIntuiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_size(mut self, n: usize) -> Self {
        self.sample_size = n;
        self
    }

    /// Column names for the report; columns past the end get `col{pos}`.
    pub fn process_header<S: AsRef<str>>(mut self, headers: &[S]) -> Self {
        self.headers = headers.iter().map(|h| h.as_ref().to_owned()).collect();
        self
    }

    /// Infer types from up to `sample_size` rows.
    pub fn run<I, R>(&self, rows: I) -> TypeReport
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[Cell]>,
    {
        let mut tally = Tally::new(self.headers.len());
        for row in rows.into_iter().take(self.sample_size) {
            tally.add(row.as_ref());
        }
        self.report(tally)
    }

    /// Like [`Self::run`] over fallible rows; stops at the first error.
    pub fn try_run<I, R>(&self, rows: I) -> RowpackResult<TypeReport>
    where
        I: IntoIterator<Item = RowpackResult<R>>,
        R: AsRef<[Cell]>,
    {
        let mut tally = Tally::new(self.headers.len());
        for row in rows.into_iter().take(self.sample_size) {
            tally.add(row?.as_ref());
        }
        Ok(self.report(tally))
    }

    /// Infer types over a container's data rows, using its headers unless some were set.
    pub fn run_reader(&self, reader: &Reader) -> RowpackResult<TypeReport> {
        if self.headers.is_empty() {
            self.clone()
                .process_header(reader.headers())
                .try_run(reader.rows()?)
        } else {
            self.try_run(reader.rows()?)
        }
    }

    fn report(&self, tally: Tally) -> TypeReport {
        let columns = tally
            .counts
            .into_iter()
            .zip(tally.max_length)
            .enumerate()
            .map(|(i, (counts, max_length))| ColumnTypeReport {
                pos: i + 1,
                header: self
                    .headers
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| default_header(i + 1)),
                resolved: counts.resolve(),
                counts,
                max_length,
            })
            .collect();
        TypeReport {
            columns,
            sampled_rows: tally.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[&str]) -> Vec<Vec<Cell>> {
        values.iter().map(|v| vec![Cell::from(*v)]).collect()
    }

    #[test]
    fn integer_strings_resolve_to_int() {
        let report = TypeIntuiter::new().run(column(&["1", "2", "3"]));
        assert_eq!(report.columns[0].resolved, ValueType::Int);
        assert_eq!(report.columns[0].counts.int, 3);
    }

    #[test]
    fn floats_absorb_ints_and_beat_a_stray_string() {
        let report = TypeIntuiter::new().run(column(&["1.5", "2", "x"]));
        let c = &report.columns[0];
        assert_eq!((c.counts.int, c.counts.float, c.counts.string), (1, 1, 1));
        assert_eq!(c.resolved, ValueType::Float);
    }

    #[test]
    fn strings_win_when_they_match_the_best_support() {
        let report = TypeIntuiter::new().run(column(&["1", "a"]));
        assert_eq!(report.columns[0].resolved, ValueType::String);
    }

    #[test]
    fn temporal_subtype_is_the_most_frequent() {
        let report = TypeIntuiter::new().run(column(&[
            "2020-01-01",
            "2020-01-02",
            "2020-01-03 10:00:00",
            "n/a",
        ]));
        assert_eq!(report.columns[0].resolved, ValueType::Date);
    }

    #[test]
    fn all_null_column_is_string() {
        let report = TypeIntuiter::new()
            .process_header(&["empty"])
            .run(vec![vec![Cell::Null], vec![Cell::from("")]]);
        let c = report.column("empty").unwrap();
        assert_eq!(c.counts.nulls, 2);
        assert_eq!(c.resolved, ValueType::String);
    }

    #[test]
    fn late_wide_rows_backfill_nulls() {
        let rows = vec![vec![Cell::Int(1)], vec![Cell::Int(2), Cell::from("x")]];
        let report = TypeIntuiter::new().run(rows);
        assert_eq!(report.columns.len(), 2);
        assert_eq!(report.columns[1].header, "col2");
        assert_eq!(report.columns[1].counts.nulls, 1);
        assert_eq!(report.columns[1].counts.string, 1);
    }

    #[test]
    fn sample_size_limits_rows() {
        let report = TypeIntuiter::new()
            .with_sample_size(2)
            .run(column(&["1", "2", "x", "y", "z"]));
        assert_eq!(report.sampled_rows, 2);
        assert_eq!(report.columns[0].resolved, ValueType::Int);
    }
}
