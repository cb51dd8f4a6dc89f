//! Source-to-container load pipeline.
//!
//! [`load_rows`] runs the whole ingestion for one source:
//!
//! 1. Sample the leading rows and find the header/data boundary with the [`RowIntuiter`].
//!    Explicit `header_lines` / `start_line` / `end_line` in the [`SourceSpec`] win individually.
//! 2. Write every row with its tag: `H` for header lines, `D` for non-empty rows inside the data
//!    range, `B` otherwise.
//! 3. Finalize, then (optionally) intuit column types and compute statistics, persisting both
//!    through a metadata edit.
//! 4. Report the outcome to the configured [`LoadObserver`].
//!
//! # Examples
//!
//! ```
//! use rowpack::{Cell, RowStore};
//! use rowpack::config::SourceSpec;
//! use rowpack::load::LoadOptions;
//! use rowpack::source::GeneratorSource;
//! use rowpack::types::ValueType;
//!
//! let text = |v: &[&str]| v.iter().map(|s| Cell::from(*s)).collect::<Vec<_>>();
//! let mut source = GeneratorSource::from_rows(
//!     "rent",
//!     vec![
//!         vec![Cell::from("Rent survey"), Cell::Null, Cell::Null],
//!         vec![],
//!         text(&["id", "city", "amount"]),
//!         text(&["1", "Oslo", "10.5"]),
//!         text(&["2", "Bergen", "11"]),
//!     ],
//! );
//!
//! let store = RowStore::memory();
//! let meta = store
//!     .container("rent.rpk")
//!     .load_rows(&mut source, &SourceSpec::default(), &LoadOptions::default())?;
//!
//! assert_eq!(meta.about.header_rows, vec![3]);
//! assert_eq!(meta.about.data_start_row, 4);
//! assert_eq!(meta.about.headers, vec!["id", "city", "amount"]);
//! assert_eq!(meta.column("amount").and_then(|c| c.value_type), Some(ValueType::Float));
//! # Ok::<(), rowpack::RowpackError>(())
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::SourceSpec;
use crate::container::Container;
use crate::error::RowpackResult;
use crate::intuit::{RowIntuiter, TypeIntuiter};
use crate::meta::{Metadata, SourceMeta};
use crate::observability::{LoadContext, LoadObserver, LoadSeverity, LoadStats, severity_for_error};
use crate::source::{RowSource, SourceFormat, SourceRegistry, check_text_encoding, name_of};
use crate::types::{Cell, RowGroup, RowTag};
use crate::writer::WriterOptions;

/// Options for [`load_rows`] and [`load_path`].
#[derive(Clone)]
pub struct LoadOptions {
    /// Run the row intuiter when the `SourceSpec` leaves the boundary open.
    pub intuit_rows: bool,
    /// Intuit column types after finalize.
    pub intuit_types: bool,
    /// Compute column statistics after finalize.
    pub run_stats: bool,
    /// Leading rows buffered for the row intuiter.
    pub row_sample_size: usize,
    /// Data rows examined by the type intuiter.
    pub type_sample_size: usize,
    pub writer: WriterOptions,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn LoadObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: LoadSeverity,
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("intuit_rows", &self.intuit_rows)
            .field("intuit_types", &self.intuit_types)
            .field("run_stats", &self.run_stats)
            .field("row_sample_size", &self.row_sample_size)
            .field("type_sample_size", &self.type_sample_size)
            .field("writer", &self.writer)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            intuit_rows: true,
            intuit_types: true,
            run_stats: true,
            row_sample_size: RowIntuiter::default().sample_size,
            type_sample_size: TypeIntuiter::default().sample_size,
            writer: WriterOptions::default(),
            observer: None,
            alert_at_or_above: LoadSeverity::Critical,
        }
    }
}

/// Header lines and data range applied while writing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Boundary {
    header_lines: Vec<u64>,
    start: u64,
    end: Option<u64>,
}

impl Boundary {
    fn plan(sample: &[Vec<Cell>], spec: &SourceSpec, options: &LoadOptions) -> Self {
        let inferred = (options.intuit_rows
            && (spec.header_lines.is_none() || spec.start_line.is_none()))
        .then(|| {
            RowIntuiter::default()
                .with_sample_size(options.row_sample_size)
                .run(sample)
        });

        let header_lines = spec
            .header_lines
            .clone()
            .or_else(|| inferred.as_ref().map(|ri| ri.header_lines.clone()))
            .unwrap_or_default();
        let after_header = header_lines.iter().max().map_or(1, |h| h + 1);
        let start = match (spec.start_line, &inferred) {
            (Some(start), _) => start.max(1),
            (None, Some(ri)) if ri.start_line >= after_header => ri.start_line,
            (None, _) => after_header,
        };

        Self {
            header_lines,
            start,
            end: spec.end_line,
        }
    }

    fn tag(&self, row_number: u64, values: &[Cell]) -> RowTag {
        if self.header_lines.contains(&row_number) {
            RowTag::header(row_number)
        } else if row_number < self.start {
            RowTag::blank(RowGroup::Meta, row_number)
        } else if self.end.is_some_and(|end| row_number > end) || values.iter().all(Cell::is_empty) {
            RowTag::blank(RowGroup::Data, row_number)
        } else {
            RowTag::data(row_number)
        }
    }

    /// Widest trimmed row among the header rows and the sampled data rows.
    fn width(&self, sample: &[Vec<Cell>]) -> usize {
        sample
            .iter()
            .enumerate()
            .filter(|(i, row)| {
                let n = *i as u64 + 1;
                self.header_lines.contains(&n)
                    || (n >= self.start && self.end.is_none_or(|end| n <= end) && !row.is_empty())
            })
            .map(|(_, row)| trimmed_width(row))
            .max()
            .unwrap_or(0)
    }
}

fn trimmed_width(row: &[Cell]) -> usize {
    row.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1)
}

fn source_meta(source: &dyn RowSource, spec: &SourceSpec) -> SourceMeta {
    let mut meta = source.descriptor();
    if let Some(name) = &spec.name {
        meta.name = Some(name.clone());
    }
    if let Some(url) = &spec.url {
        meta.url = Some(url.clone());
    }
    if let Some(encoding) = &spec.encoding {
        meta.encoding = Some(encoding.clone());
    }
    meta.fetch_time = Some(chrono::Utc::now().to_rfc3339());
    meta
}

/// Load `source` into `container`, replacing whatever was there.
///
/// When an observer is configured, this function reports:
///
/// - `on_success` on success, with record, row and column counts
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
pub fn load_rows(
    container: &Container,
    source: &mut dyn RowSource,
    spec: &SourceSpec,
    options: &LoadOptions,
) -> RowpackResult<Metadata> {
    let ctx = LoadContext {
        location: container.location().to_owned(),
        source: spec.name.clone().unwrap_or_else(|| source.name().to_owned()),
        format: spec.format,
    };
    let result = run(container, source, spec, options);
    report(options, &ctx, &result);
    result
}

/// Open `path` through `registry` and load it. Failures to open are reported like load failures.
pub fn load_path(
    container: &Container,
    registry: &SourceRegistry,
    path: impl AsRef<Path>,
    spec: &SourceSpec,
    options: &LoadOptions,
) -> RowpackResult<Metadata> {
    let path = path.as_ref();
    let ctx = LoadContext {
        location: container.location().to_owned(),
        source: spec.name.clone().unwrap_or_else(|| name_of(path)),
        format: SourceFormat::resolve(path, spec).ok(),
    };
    let result = registry
        .open(path, spec)
        .and_then(|mut source| run(container, source.as_mut(), spec, options));
    report(options, &ctx, &result);
    result
}

fn report(options: &LoadOptions, ctx: &LoadContext, result: &RowpackResult<Metadata>) {
    let Some(obs) = options.observer.as_ref() else {
        return;
    };
    match result {
        Ok(meta) => obs.on_success(
            ctx,
            LoadStats {
                records: meta.about.n_records,
                rows: meta.about.n_rows,
                cols: meta.about.n_cols,
            },
        ),
        Err(e) => {
            let sev = severity_for_error(e);
            obs.on_failure(ctx, sev, e);
            if sev >= options.alert_at_or_above {
                obs.on_alert(ctx, sev, e);
            }
        }
    }
}

fn run(
    container: &Container,
    source: &mut dyn RowSource,
    spec: &SourceSpec,
    options: &LoadOptions,
) -> RowpackResult<Metadata> {
    check_text_encoding(spec)?;
    let descriptor = source_meta(source, spec);
    let mut writer = container.writer_with(&options.writer)?;
    writer.set_source(descriptor);

    let mut rows = source.rows()?;
    let sample = rows
        .by_ref()
        .take(options.row_sample_size)
        .collect::<RowpackResult<Vec<Vec<Cell>>>>()?;
    let boundary = Boundary::plan(&sample, spec, options);

    let n_cols = boundary.width(&sample).max(spec.columns.len());
    match spec.declared_names(n_cols) {
        Some(names) => writer.set_headers(&names)?,
        None if n_cols > 0 => writer.set_n_cols(n_cols)?,
        None => {}
    }
    writer.set_header_rows(boundary.header_lines.clone());
    writer.set_data_start_row(boundary.start);
    if let Some(end) = boundary.end {
        writer.set_data_end_row(end);
    }
    for (declared, col) in spec.columns.iter().zip(writer.meta_mut().schema.iter_mut()) {
        declared.apply(col);
    }

    for (i, row) in sample.into_iter().map(Ok).chain(rows).enumerate() {
        let row = row?;
        let row_number = i as u64 + 1;
        writer.append_row(boundary.tag(row_number, &row), &row)?;
    }
    let meta = writer.finalize()?;

    if options.intuit_types {
        let report = {
            let reader = container.reader()?;
            TypeIntuiter::default()
                .with_sample_size(options.type_sample_size)
                .run_reader(&reader)?
        };
        let n_cols = meta.n_cols();
        let mut editor = container.edit_metadata()?;
        editor.set_column_types(report.types())?;
        editor.set_column_types(
            spec.declared_types()
                .into_iter()
                .filter(|(pos, _)| *pos <= n_cols),
        )?;
        editor.commit()?;
    }
    if options.run_stats {
        container.run_stats()?;
    }
    container.info()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowFlag;

    fn row(values: &[&str]) -> Vec<Cell> {
        values
            .iter()
            .map(|v| if v.is_empty() { Cell::Null } else { Cell::from(*v) })
            .collect()
    }

    fn sample() -> Vec<Vec<Cell>> {
        vec![
            row(&["Title"]),
            row(&[]),
            row(&["a", "b", "c"]),
            row(&["1", "2", "3"]),
            row(&["4", "5", "6", ""]),
        ]
    }

    #[test]
    fn intuited_boundary() {
        let b = Boundary::plan(&sample(), &SourceSpec::default(), &LoadOptions::default());
        assert_eq!(b.header_lines, vec![3]);
        assert_eq!(b.start, 4);
        assert_eq!(b.width(&sample()), 3);
    }

    #[test]
    fn explicit_header_lines_push_start_past_them() {
        let spec = SourceSpec::new().with_header_lines(vec![3, 4]);
        let b = Boundary::plan(&sample(), &spec, &LoadOptions::default());
        assert_eq!(b.header_lines, vec![3, 4]);
        assert_eq!(b.start, 5);
    }

    #[test]
    fn without_intuition_everything_is_data() {
        let options = LoadOptions {
            intuit_rows: false,
            ..LoadOptions::default()
        };
        let b = Boundary::plan(&sample(), &SourceSpec::default(), &options);
        assert!(b.header_lines.is_empty());
        assert_eq!(b.start, 1);
        assert_eq!(b.tag(1, &row(&["Title"])).flag, RowFlag::Data);
        assert_eq!(b.tag(2, &[]).flag, RowFlag::Blank);
    }

    #[test]
    fn rows_past_the_end_are_blank() {
        let spec = SourceSpec::new().with_end_line(4);
        let b = Boundary::plan(&sample(), &spec, &LoadOptions::default());
        let tag = b.tag(5, &row(&["4", "5", "6"]));
        assert_eq!(tag.flag, RowFlag::Blank);
        assert_eq!(tag.group, RowGroup::Data);
        assert_eq!(b.tag(1, &row(&["Title"])).group, RowGroup::Meta);
    }
}
