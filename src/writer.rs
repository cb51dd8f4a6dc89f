//! Sequential, append-only construction of a container.
//!
//! A [`Writer`] holds the location exclusively from creation until [`Writer::finalize`] or
//! [`Writer::abort`]. Dropping an unfinalized writer aborts it, so an error anywhere in a load
//! never leaves an orphaned half-written container behind.

use std::borrow::Cow;
use std::io::{BufWriter, SeekFrom, Write};
use std::ops::RangeInclusive;

use crate::error::{RowpackError, RowpackResult};
use crate::format::{DEFAULT_METADATA_RESERVE, FileHeader, HEADER_SIZE, encode_record};
use crate::meta::{
    Column, ColumnKey, ColumnStats, Metadata, SourceMeta, default_header, synthesize_headers,
};
use crate::storage::{FileHandle, HandleGuard, RowStore};
use crate::types::{Cell, RowFlag, RowTag, ValueType};

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Options controlling container layout.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Bytes reserved for metadata between the header and the rows segment. Metadata larger
    /// than this is written after the rows instead.
    pub metadata_reserve: u64,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            metadata_reserve: DEFAULT_METADATA_RESERVE,
        }
    }
}

/// Exclusive write handle for one container location.
pub struct Writer {
    store: RowStore,
    location: String,
    file: Option<BufWriter<Box<dyn FileHandle>>>,
    header: FileHeader,
    meta: Metadata,
    buf: Vec<u8>,

    n_cols: Option<usize>,
    last_row: u64,
    header_row_numbers: Vec<u64>,
    header_values: Vec<Vec<Cell>>,
    data_runs: Vec<RangeInclusive<u64>>,

    explicit_headers: bool,
    header_rows_override: Option<Vec<u64>>,
    data_start_override: Option<u64>,
    data_end_override: Option<u64>,

    finalized: bool,
    _guard: HandleGuard,
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("location", &self.location)
            .field("n_records", &self.header.n_records)
            .field("n_cols", &self.n_cols)
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl Writer {
    pub(crate) fn create(
        store: RowStore,
        location: String,
        guard: HandleGuard,
        options: &WriterOptions,
    ) -> RowpackResult<Self> {
        let rows_offset = HEADER_SIZE as u64 + options.metadata_reserve;
        let mut file = BufWriter::with_capacity(WRITE_BUFFER_SIZE, store.storage().create(&location)?);
        // Zero header marks the file as unsealed until finalize.
        file.write_all(&vec![0u8; rows_offset as usize])?;

        Ok(Self {
            store,
            location,
            file: Some(file),
            header: FileHeader::new(rows_offset),
            meta: Metadata::default(),
            buf: Vec::with_capacity(4096),
            n_cols: None,
            last_row: 0,
            header_row_numbers: Vec::new(),
            header_values: Vec::new(),
            data_runs: Vec::new(),
            explicit_headers: false,
            header_rows_override: None,
            data_start_override: None,
            data_end_override: None,
            finalized: false,
            _guard: guard,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Records appended so far.
    pub fn n_records(&self) -> u64 {
        self.header.n_records
    }

    /// Column count, once fixed by headers or the first data row.
    pub fn n_cols(&self) -> Option<usize> {
        self.n_cols
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Metadata {
        &mut self.meta
    }

    pub fn set_source(&mut self, source: SourceMeta) {
        self.meta.source = source;
    }

    /// Fix the column count without naming columns.
    pub fn set_n_cols(&mut self, n: usize) -> RowpackResult<()> {
        match self.n_cols {
            Some(current) if current != n => Err(RowpackError::SchemaMismatch {
                message: format!("column count already fixed at {current}, cannot change to {n}"),
            }),
            _ => {
                self.n_cols = Some(n);
                self.meta.ensure_columns(n);
                Ok(())
            }
        }
    }

    /// Name the columns explicitly. Names are used verbatim instead of synthesized from header
    /// rows, and fix the column count.
    pub fn set_headers<S: AsRef<str>>(&mut self, names: &[S]) -> RowpackResult<()> {
        if let Some(n) = self.n_cols {
            if n != names.len() && self.header.n_records > 0 {
                return Err(RowpackError::SchemaMismatch {
                    message: format!("{} headers for {n} columns already written", names.len()),
                });
            }
        }
        self.n_cols = Some(names.len());
        self.meta.set_headers(names);
        self.explicit_headers = true;
        Ok(())
    }

    pub fn set_header_rows(&mut self, rows: Vec<u64>) {
        self.header_rows_override = Some(rows);
    }

    pub fn set_data_start_row(&mut self, row: u64) {
        self.data_start_override = Some(row);
    }

    pub fn set_data_end_row(&mut self, row: u64) {
        self.data_end_override = Some(row);
    }

    pub fn column(&mut self, key: impl Into<ColumnKey>) -> RowpackResult<Column<'_>> {
        self.meta.column_mut(key)
    }

    pub fn columns_mut(&mut self) -> impl Iterator<Item = Column<'_>> {
        self.meta.columns_mut()
    }

    pub fn set_column_types<K, I>(&mut self, types: I) -> RowpackResult<()>
    where
        K: Into<ColumnKey>,
        I: IntoIterator<Item = (K, ValueType)>,
    {
        self.meta.set_column_types(types)
    }

    pub fn set_stats(&mut self, stats: Vec<ColumnStats>) {
        self.meta.stats = stats;
    }

    /// Append one tagged row.
    pub fn append_row(&mut self, tag: RowTag, values: &[Cell]) -> RowpackResult<()> {
        if tag.row_number <= self.last_row {
            return Err(RowpackError::OutOfOrder {
                row_number: tag.row_number,
                previous: self.last_row,
            });
        }

        let values: Cow<'_, [Cell]> = match tag.flag {
            RowFlag::Data => self.fit_width(tag.row_number, values)?,
            RowFlag::Header => {
                self.header_row_numbers.push(tag.row_number);
                self.header_values.push(values.to_vec());
                Cow::Borrowed(values)
            }
            RowFlag::Blank => Cow::Borrowed(values),
        };

        self.buf.clear();
        encode_record(&mut self.buf, &tag, &values)?;
        let file = self.file.as_mut().ok_or_else(|| {
            RowpackError::corrupt(format!("writer for '{}' is closed", self.location))
        })?;
        file.write_all(&self.buf)?;

        self.header.rows_len += self.buf.len() as u64;
        self.header.n_records += 1;
        self.last_row = tag.row_number;
        if tag.flag == RowFlag::Data {
            self.note_data_row(tag.row_number);
        }
        Ok(())
    }

    /// Bulk form of [`Self::append_row`].
    pub fn append_rows<I, R>(&mut self, rows: I) -> RowpackResult<u64>
    where
        I: IntoIterator<Item = (RowTag, R)>,
        R: AsRef<[Cell]>,
    {
        let mut n = 0;
        for (tag, values) in rows {
            self.append_row(tag, values.as_ref())?;
            n += 1;
        }
        Ok(n)
    }

    /// Append a data row numbered after the last appended row.
    pub fn insert_row(&mut self, values: &[Cell]) -> RowpackResult<()> {
        self.append_row(RowTag::data(self.last_row + 1), values)
    }

    pub fn insert_rows<I, R>(&mut self, rows: I) -> RowpackResult<u64>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[Cell]>,
    {
        let mut n = 0;
        for values in rows {
            self.insert_row(values.as_ref())?;
            n += 1;
        }
        Ok(n)
    }

    /// Pad short data rows with nulls; trim surplus trailing nulls; reject real surplus cells.
    fn fit_width<'v>(&mut self, row_number: u64, values: &'v [Cell]) -> RowpackResult<Cow<'v, [Cell]>> {
        let n = match self.n_cols {
            Some(n) => n,
            None => {
                self.n_cols = Some(values.len());
                self.meta.ensure_columns(values.len());
                return Ok(Cow::Borrowed(values));
            }
        };
        if values.len() == n {
            return Ok(Cow::Borrowed(values));
        }
        if values.len() < n {
            let mut padded = values.to_vec();
            padded.resize(n, Cell::Null);
            return Ok(Cow::Owned(padded));
        }
        if values[n..].iter().all(Cell::is_empty) {
            return Ok(Cow::Borrowed(&values[..n]));
        }
        Err(RowpackError::SchemaMismatch {
            message: format!(
                "row {row_number} has {} cells but the container has {n} columns",
                values.len()
            ),
        })
    }

    fn note_data_row(&mut self, row_number: u64) {
        match self.data_runs.last_mut() {
            Some(run) if *run.end() + 1 == row_number => *run = *run.start()..=row_number,
            _ => self.data_runs.push(row_number..=row_number),
        }
    }

    fn data_rows_between(&self, start: u64, end: u64) -> u64 {
        self.data_runs
            .iter()
            .map(|run| {
                let lo = (*run.start()).max(start);
                let hi = (*run.end()).min(end);
                if hi >= lo { hi - lo + 1 } else { 0 }
            })
            .sum()
    }

    fn settle_metadata(&mut self) {
        let n_cols = self.n_cols.unwrap_or_else(|| {
            self.header_values.iter().map(Vec::len).max().unwrap_or(0)
        });
        self.meta.ensure_columns(n_cols);
        self.meta.schema.truncate(n_cols);
        if !self.explicit_headers {
            // Columns renamed through `column`/`meta_mut` keep their names.
            let names = synthesize_headers(&self.header_values, n_cols);
            for (col, name) in self.meta.schema.iter_mut().zip(names) {
                if col.name.is_empty() || col.name == default_header(col.pos) {
                    col.name = name;
                }
            }
        }

        let first_data = self.data_runs.first().map(|r| *r.start()).unwrap_or(0);
        let last_data = self.data_runs.last().map(|r| *r.end()).unwrap_or(0);
        let start = self.data_start_override.unwrap_or(first_data);
        let end = self.data_end_override.unwrap_or(last_data);

        let n_rows = self.data_rows_between(start, end);
        let about = &mut self.meta.about;
        about.header_rows = self
            .header_rows_override
            .clone()
            .unwrap_or_else(|| self.header_row_numbers.clone());
        about.data_start_row = start;
        about.data_end_row = end;
        about.n_records = self.header.n_records;
        about.n_rows = n_rows;
        if about.create_time.is_none() {
            about.create_time = Some(chrono::Utc::now().to_rfc3339());
        }
        self.meta.sync();
    }

    /// Seal the container: write metadata, then the header. Returns the final metadata.
    pub fn finalize(mut self) -> RowpackResult<Metadata> {
        self.settle_metadata();
        let mut file = self
            .file
            .take()
            .ok_or_else(|| RowpackError::corrupt(format!("writer for '{}' is closed", self.location)))?
            .into_inner()
            .map_err(|e| e.into_error())?;
        write_metadata(file.as_mut(), &mut self.header, &self.meta)?;
        self.finalized = true;
        Ok(std::mem::take(&mut self.meta))
    }

    /// Discard everything written and release the location.
    pub fn abort(mut self) -> RowpackResult<()> {
        self.discard()
    }

    fn discard(&mut self) -> RowpackResult<()> {
        self.file = None;
        self.finalized = true;
        self.store.storage().remove(&self.location)
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = self.discard();
        }
    }
}

/// Pick where new metadata of `len` bytes goes: the reserve if it fits, otherwise after the rows
/// segment. The segment the header currently points at is never overwritten, so a crash before
/// the header is rewritten leaves the previous metadata readable.
fn metadata_placement(header: &FileHeader, len: u64) -> u64 {
    let live = header.metadata_offset..header.metadata_offset + header.metadata_len;
    let free = |offset: u64| header.metadata_len == 0 || offset + len <= live.start || offset >= live.end;
    let reserve = HEADER_SIZE as u64;
    if len <= header.metadata_reserve() && free(reserve) {
        reserve
    } else if free(header.rows_end()) {
        header.rows_end()
    } else {
        live.end.max(header.rows_end())
    }
}

/// Write the metadata segment and sync it. The header is left untouched.
fn write_metadata_segment(
    file: &mut dyn FileHandle,
    header: &FileHeader,
    bytes: &[u8],
) -> RowpackResult<u64> {
    let offset = metadata_placement(header, bytes.len() as u64);
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.sync()?;
    Ok(offset)
}

/// Write `meta` to a free segment, sync, then rewrite the header to point at it. Row bytes are
/// never touched. Bytes past the rows and the new segment are stale once the header is synced
/// and get cut off.
pub(crate) fn write_metadata(
    file: &mut dyn FileHandle,
    header: &mut FileHeader,
    meta: &Metadata,
) -> RowpackResult<()> {
    let bytes = meta.to_bytes()?;
    let offset = write_metadata_segment(file, header, &bytes)?;

    header.metadata_offset = offset;
    header.metadata_len = bytes.len() as u64;
    header.metadata_crc = crc32fast::hash(&bytes);

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header.to_bytes())?;
    file.sync()?;

    file.truncate_to(header.rows_end().max(offset + header.metadata_len))?;
    Ok(())
}
