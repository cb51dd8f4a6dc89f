//! Per-column summary statistics in one streaming pass.
//!
//! Mean and standard deviation use Welford's update so a single pass is numerically stable.
//! Distinct values are tracked exactly up to a cap, after which the count is a lower bound.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::NaiveDateTime;

use crate::error::RowpackResult;
use crate::intuit::parse::{Temporal, numeric_value, temporal_value};
use crate::meta::{ColumnSchema, ColumnStats};
use crate::reader::Reader;
use crate::types::{Cell, ValueType};

/// Distinct values tracked per column before the count saturates.
pub const DISTINCT_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq)]
enum OrderKey {
    Num(f64),
    Time(NaiveDateTime),
    Text(String),
}

impl OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (OrderKey::Num(a), OrderKey::Num(b)) => a.total_cmp(b),
            (OrderKey::Time(a), OrderKey::Time(b)) => a.cmp(b),
            (OrderKey::Text(a), OrderKey::Text(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

#[derive(Debug)]
struct ColumnAccumulator {
    pos: usize,
    name: String,
    value_type: ValueType,
    count: u64,
    nulls: u64,
    n: u64,
    mean: f64,
    m2: f64,
    min: Option<(OrderKey, Cell)>,
    max: Option<(OrderKey, Cell)>,
    distinct: HashSet<u64>,
    saturated: bool,
    max_length: usize,
}

impl ColumnAccumulator {
    fn new(pos: usize, name: String, value_type: ValueType) -> Self {
        Self {
            pos,
            name,
            value_type,
            count: 0,
            nulls: 0,
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: None,
            max: None,
            distinct: HashSet::new(),
            saturated: false,
            max_length: 0,
        }
    }

    fn add(&mut self, cell: &Cell, distinct_limit: usize) {
        self.count += 1;
        if cell.is_empty() || matches!(cell, Cell::Float(f) if f.is_nan()) {
            self.nulls += 1;
            return;
        }

        let text = match cell {
            Cell::Str(s) => s.trim().to_owned(),
            other => other.to_string(),
        };
        self.max_length = self.max_length.max(text.chars().count());

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let h = hasher.finish();
        if self.distinct.len() < distinct_limit {
            self.distinct.insert(h);
        } else if !self.distinct.contains(&h) {
            self.saturated = true;
        }

        // Infinities are counted but stay out of the moments and the range.
        if matches!(cell, Cell::Float(f) if f.is_infinite()) {
            return;
        }
        let key = if self.value_type.is_numeric() {
            numeric_value(cell).map(|x| {
                self.observe(x);
                OrderKey::Num(x)
            })
        } else if self.value_type.is_temporal() {
            temporal_value(cell).map(|t: Temporal| OrderKey::Time(t.as_datetime()))
        } else {
            Some(OrderKey::Text(text))
        };
        if let Some(key) = key {
            self.extend_range(key, cell);
        }
    }

    fn observe(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn extend_range(&mut self, key: OrderKey, cell: &Cell) {
        if self.min.as_ref().is_none_or(|(k, _)| key.cmp(k) == Ordering::Less) {
            self.min = Some((key.clone(), cell.clone()));
        }
        if self.max.as_ref().is_none_or(|(k, _)| key.cmp(k) == Ordering::Greater) {
            self.max = Some((key, cell.clone()));
        }
    }

    fn finish(self) -> ColumnStats {
        ColumnStats {
            pos: self.pos,
            name: self.name,
            count: self.count,
            nulls: self.nulls,
            numeric_count: self.n,
            mean: (self.n > 0).then_some(self.mean).filter(|m| m.is_finite()),
            std: (self.n > 1)
                .then(|| (self.m2 / (self.n - 1) as f64).sqrt())
                .filter(|s| s.is_finite()),
            min: self.min.map(|(_, c)| c),
            max: self.max.map(|(_, c)| c),
            distinct: self.distinct.len() as u64,
            distinct_saturated: self.saturated,
            max_length: self.max_length,
        }
    }
}

/// Streaming statistics over rows of a known schema.
#[derive(Debug)]
pub struct StatsCollector {
    columns: Vec<ColumnAccumulator>,
    distinct_limit: usize,
}

impl StatsCollector {
    /// One accumulator per schema column. Untyped columns are treated as strings.
    pub fn new(schema: &[ColumnSchema]) -> Self {
        let columns = schema
            .iter()
            .map(|c| {
                ColumnAccumulator::new(
                    c.pos,
                    c.name.clone(),
                    c.value_type.unwrap_or(ValueType::String),
                )
            })
            .collect();
        Self {
            columns,
            distinct_limit: DISTINCT_LIMIT,
        }
    }

    pub fn with_distinct_limit(mut self, limit: usize) -> Self {
        self.distinct_limit = limit;
        self
    }

    /// Add one row. Missing trailing cells count as nulls; extra cells are ignored.
    pub fn process(&mut self, row: &[Cell]) {
        for (i, acc) in self.columns.iter_mut().enumerate() {
            acc.add(row.get(i).unwrap_or(&Cell::Null), self.distinct_limit);
        }
    }

    pub fn finish(self) -> Vec<ColumnStats> {
        self.columns.into_iter().map(ColumnAccumulator::finish).collect()
    }
}

/// Statistics over every data row of a container, using its recorded column types.
pub fn collect_stats(reader: &Reader) -> RowpackResult<Vec<ColumnStats>> {
    let mut collector = StatsCollector::new(reader.schema());
    for row in reader.rows()? {
        collector.process(&row?);
    }
    Ok(collector.finish())
}
