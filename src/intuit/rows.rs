//! Header/data boundary detection over the leading rows of a source.
//!
//! Each sampled row is reduced to a few features (non-empty width, share of numeric or temporal
//! cells, which positions are typed) and classified against the sample as a whole. A small state
//! machine then walks the classes: leading noise, then a header block, then the first data row.

use crate::intuit::parse::{CellClass, classify};
use crate::types::Cell;

/// Classification of one sampled row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowClass {
    Blank,
    /// Titles, notes, footnotes: too narrow or too mixed to be a header or data.
    Noise,
    /// Narrow text row with several cells, e.g. a category row over merged columns. Kept only
    /// when directly followed by a header row.
    PartialHeader,
    HeaderLike,
    DataLike,
}

/// Result of [`RowIntuiter::run`]. Row numbers are 1-based positions in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct RowIntuition {
    pub header_lines: Vec<u64>,
    pub start_line: u64,
    /// Never inferred; carried so overrides can be merged into one value.
    pub end_line: Option<u64>,
    /// True when no row looked like data and the boundary fell back to a guess.
    pub ambiguous: bool,
    pub classes: Vec<RowClass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    LeadingNoise,
    Header,
    Data,
}

#[derive(Debug, Clone)]
struct RowFeatures {
    width: usize,
    typed: usize,
    typed_mask: Vec<bool>,
}

impl RowFeatures {
    fn of(row: &[Cell]) -> Self {
        let mut width = 0;
        let mut typed = 0;
        let typed_mask = row
            .iter()
            .map(|cell| {
                let class = classify(cell);
                if class != CellClass::Empty {
                    width += 1;
                }
                let is_typed = class.is_typed();
                if is_typed {
                    typed += 1;
                }
                is_typed
            })
            .collect();
        Self {
            width,
            typed,
            typed_mask,
        }
    }

    fn typed_fraction(&self) -> f64 {
        if self.width == 0 {
            0.0
        } else {
            self.typed as f64 / self.width as f64
        }
    }
}

/// Heuristic detector for header rows and the first data row.
///
/// Thresholds are public so callers can tune them for unusual sources.
#[derive(Debug, Clone)]
pub struct RowIntuiter {
    /// Leading rows examined.
    pub sample_size: usize,
    /// Typed share at or above which a row is data.
    pub data_threshold: f64,
    /// Typed share at or below which a row may be a header.
    pub header_threshold: f64,
    /// Rows narrower than this share of the modal width are noise.
    pub min_width_ratio: f64,
    /// Longest header block accepted before giving up on the sample.
    pub max_header_rows: usize,
}

impl Default for RowIntuiter {
    fn default() -> Self {
        Self {
            sample_size: 150,
            data_threshold: 0.5,
            header_threshold: 0.25,
            min_width_ratio: 0.5,
            max_header_rows: 10,
        }
    }
}

impl RowIntuiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_size(mut self, n: usize) -> Self {
        self.sample_size = n;
        self
    }

    /// Examine up to `sample_size` rows from `rows`.
    pub fn run<I, R>(&self, rows: I) -> RowIntuition
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[Cell]>,
    {
        let features: Vec<RowFeatures> = rows
            .into_iter()
            .take(self.sample_size)
            .map(|r| RowFeatures::of(r.as_ref()))
            .collect();
        self.run_features(&features)
    }

    fn run_features(&self, features: &[RowFeatures]) -> RowIntuition {
        let modal = modal_width(features);
        let data_columns = self.data_columns(features, modal);
        let classes: Vec<RowClass> = features
            .iter()
            .map(|f| self.classify(f, modal, &data_columns))
            .collect();

        let mut state = ScanState::LeadingNoise;
        let mut header_lines: Vec<u64> = Vec::new();
        let mut pending_partial: Option<u64> = None;
        let mut start_line = None;
        let mut overflow = false;

        for (i, class) in classes.iter().enumerate() {
            let row_number = i as u64 + 1;
            match class {
                RowClass::DataLike => {
                    start_line = Some(row_number);
                    state = ScanState::Data;
                    break;
                }
                RowClass::HeaderLike => {
                    if state != ScanState::Header {
                        // A new block replaces an earlier one separated from it by noise.
                        header_lines.clear();
                        header_lines.extend(pending_partial.take());
                    }
                    if header_lines.len() >= self.max_header_rows {
                        overflow = true;
                        break;
                    }
                    header_lines.push(row_number);
                    state = ScanState::Header;
                }
                RowClass::PartialHeader => {
                    pending_partial = Some(row_number);
                    if state == ScanState::Header {
                        state = ScanState::LeadingNoise;
                    }
                }
                RowClass::Blank | RowClass::Noise => {
                    pending_partial = None;
                    if state == ScanState::Header {
                        state = ScanState::LeadingNoise;
                    }
                }
            }
            if *class != RowClass::PartialHeader && *class != RowClass::HeaderLike {
                pending_partial = None;
            }
        }

        if state == ScanState::Data && !overflow {
            if let Some(start_line) = start_line {
                return RowIntuition {
                    header_lines,
                    start_line,
                    end_line: None,
                    ambiguous: false,
                    classes,
                };
            }
        }

        self.fallback(classes)
    }

    /// No data-like row: take the first header-like row as the header and start right after it.
    fn fallback(&self, classes: Vec<RowClass>) -> RowIntuition {
        let first_nonblank = |from: usize| {
            classes
                .iter()
                .enumerate()
                .skip(from)
                .find(|(_, c)| **c != RowClass::Blank)
                .map(|(i, _)| i as u64 + 1)
        };
        let header = classes.iter().position(|c| *c == RowClass::HeaderLike);
        let (header_lines, start_line) = match header {
            Some(i) => (vec![i as u64 + 1], first_nonblank(i + 1).unwrap_or(i as u64 + 2)),
            None => (Vec::new(), first_nonblank(0).unwrap_or(1)),
        };
        RowIntuition {
            header_lines,
            start_line,
            end_line: None,
            ambiguous: true,
            classes,
        }
    }

    /// Positions typed in at least half of the full-width rows in the back half of the sample.
    fn data_columns(&self, features: &[RowFeatures], modal: usize) -> Vec<usize> {
        let full: Vec<&RowFeatures> = features
            .iter()
            .filter(|f| f.width > 0 && f.width as f64 >= self.min_width_ratio * modal as f64)
            .collect();
        let tail = &full[full.len() / 2..];
        if tail.is_empty() {
            return Vec::new();
        }
        let n_cols = tail.iter().map(|f| f.typed_mask.len()).max().unwrap_or(0);
        (0..n_cols)
            .filter(|&c| {
                let typed = tail
                    .iter()
                    .filter(|f| f.typed_mask.get(c).copied().unwrap_or(false))
                    .count();
                typed > 0 && typed * 2 >= tail.len()
            })
            .collect()
    }

    fn classify(&self, f: &RowFeatures, modal: usize, data_columns: &[usize]) -> RowClass {
        if f.width == 0 {
            return RowClass::Blank;
        }
        if (f.width as f64) < self.min_width_ratio * modal as f64 {
            return if f.width >= 2 && f.typed == 0 {
                RowClass::PartialHeader
            } else {
                RowClass::Noise
            };
        }
        let fraction = f.typed_fraction();
        let covers_data_columns = !data_columns.is_empty()
            && data_columns
                .iter()
                .all(|&c| f.typed_mask.get(c).copied().unwrap_or(false));
        if fraction >= self.data_threshold || covers_data_columns {
            RowClass::DataLike
        } else if fraction <= self.header_threshold {
            RowClass::HeaderLike
        } else {
            RowClass::Noise
        }
    }
}

/// Most common non-zero width; ties go to the wider.
fn modal_width(features: &[RowFeatures]) -> usize {
    let mut counts = std::collections::BTreeMap::new();
    for f in features.iter().filter(|f| f.width > 0) {
        *counts.entry(f.width).or_insert(0usize) += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(width, n)| (*n, *width))
        .map(|(width, _)| width)
        .unwrap_or(0)
}
