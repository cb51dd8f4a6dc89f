//! Sequential access to a finalized container.
//!
//! Every view ([`Reader::raw`], [`Reader::rows`], [`Reader::iter`], [`Reader::cursor`]) opens its
//! own cursor over the rows segment, so several views of one reader can be consumed
//! independently. Views stop at the first malformed record and report it as
//! [`RowpackError::Corrupt`].

use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{RowpackError, RowpackResult};
use crate::format::{FileHeader, HEADER_SIZE, RecordView};
use crate::meta::{ColumnKey, ColumnSchema, Metadata};
use crate::proxy::{HeaderIndex, RowProxy};
use crate::storage::{HandleGuard, ReadSeek, RowStore};
use crate::types::{Cell, RowFlag, RowRecord};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Read and validate the header and metadata segments.
pub(crate) fn read_sealed<R>(src: &mut R, location: &str) -> RowpackResult<(FileHeader, Metadata)>
where
    R: Read + Seek + ?Sized,
{
    src.seek(SeekFrom::Start(0))?;
    let mut head = Vec::with_capacity(HEADER_SIZE);
    (&mut *src).take(HEADER_SIZE as u64).read_to_end(&mut head)?;
    if FileHeader::is_unsealed(&head) {
        return Err(RowpackError::NotFinalized {
            location: location.to_owned(),
        });
    }
    let header = FileHeader::from_bytes(&head)?;

    src.seek(SeekFrom::Start(header.metadata_offset))?;
    let mut bytes = Vec::new();
    (&mut *src).take(header.metadata_len).read_to_end(&mut bytes)?;
    header.verify_metadata(&bytes)?;
    let meta = Metadata::from_bytes(&bytes)?;
    Ok((header, meta))
}

/// Shared read handle. Any number may be open at once; none while a writer or editor is.
pub struct Reader {
    store: RowStore,
    location: String,
    header: FileHeader,
    meta: Metadata,
    headers: Arc<HeaderIndex>,
    _guard: HandleGuard,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("location", &self.location)
            .field("n_records", &self.header.n_records)
            .field("headers", &self.headers.names())
            .finish()
    }
}

impl Reader {
    pub(crate) fn open(store: RowStore, location: String, guard: HandleGuard) -> RowpackResult<Self> {
        let mut src = store.storage().open_read(&location)?;
        let (header, meta) = read_sealed(src.as_mut(), &location)?;
        let headers = Arc::new(HeaderIndex::new(meta.headers()));
        Ok(Self {
            store,
            location,
            header,
            meta,
            headers,
            _guard: guard,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn file_header(&self) -> &FileHeader {
        &self.header
    }

    pub fn headers(&self) -> &[String] {
        self.headers.names()
    }

    pub fn schema(&self) -> &[ColumnSchema] {
        &self.meta.schema
    }

    pub fn column(&self, key: impl Into<ColumnKey>) -> Option<&ColumnSchema> {
        self.meta.column(key)
    }

    pub fn n_records(&self) -> u64 {
        self.header.n_records
    }

    /// Data rows inside the boundary.
    pub fn n_rows(&self) -> u64 {
        self.meta.about.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.meta.n_cols()
    }

    pub fn data_start_row(&self) -> u64 {
        self.meta.about.data_start_row
    }

    pub fn data_end_row(&self) -> u64 {
        self.meta.about.data_end_row
    }

    /// Lending cursor over every stored record, for partial decoding.
    pub fn cursor(&self) -> RowpackResult<RowCursor<'_>> {
        let mut src = BufReader::with_capacity(
            READ_BUFFER_SIZE,
            self.store.storage().open_read(&self.location)?,
        );
        src.seek(SeekFrom::Start(self.header.rows_offset))?;
        Ok(RowCursor {
            src,
            remaining: self.header.n_records,
            bytes_left: self.header.rows_len,
            scratch: Vec::new(),
            _reader: PhantomData,
        })
    }

    /// Every record with its tag: header, data and blank rows in stored order.
    pub fn raw(&self) -> RowpackResult<RawRows<'_>> {
        Ok(RawRows {
            cursor: self.cursor()?,
            done: false,
        })
    }

    /// Values of the data rows inside the boundary.
    pub fn rows(&self) -> RowpackResult<DataRows<'_>> {
        self.data_rows(None)
    }

    /// Like [`Self::rows`], decoding only the first `n` cells of each row.
    pub fn rows_prefix(&self, n: usize) -> RowpackResult<DataRows<'_>> {
        self.data_rows(Some(n))
    }

    fn data_rows(&self, width: Option<usize>) -> RowpackResult<DataRows<'_>> {
        Ok(DataRows {
            cursor: self.cursor()?,
            start: self.data_start_row(),
            end: self.data_end_row(),
            width,
            done: false,
        })
    }

    /// Data rows as [`RowProxy`] values addressable by column name.
    pub fn iter(&self) -> RowpackResult<ProxyRows<'_>> {
        Ok(ProxyRows {
            rows: self.rows()?,
            headers: Arc::clone(&self.headers),
        })
    }

    /// The stored header rows, verbatim.
    pub fn header_rows(&self) -> RowpackResult<Vec<RowRecord>> {
        let Some(last) = self.meta.about.header_rows.iter().max().copied() else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut cursor = self.cursor()?;
        while let Some(view) = cursor.next_record()? {
            let tag = view.tag();
            if tag.row_number > last {
                break;
            }
            if tag.flag == RowFlag::Header {
                out.push(RowRecord {
                    tag,
                    values: view.values()?,
                });
            }
        }
        Ok(out)
    }

    /// Release the handle. Equivalent to dropping it.
    pub fn close(self) {}
}

/// Lending cursor over the rows segment. Each record borrows the cursor's buffer until the next
/// call.
pub struct RowCursor<'r> {
    src: BufReader<Box<dyn ReadSeek>>,
    remaining: u64,
    bytes_left: u64,
    scratch: Vec<u8>,
    _reader: PhantomData<&'r Reader>,
}

impl RowCursor<'_> {
    /// Records not yet read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn next_record(&mut self) -> RowpackResult<Option<RecordView<'_>>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if self.bytes_left < 4 {
            return Err(RowpackError::corrupt("rows segment ends before its last record"));
        }
        let len = self.src.read_u32::<LittleEndian>().map_err(truncated)? as u64;
        if len + 4 > self.bytes_left {
            return Err(RowpackError::corrupt(format!(
                "record of {len} bytes overruns the rows segment"
            )));
        }
        self.scratch.resize(len as usize, 0);
        self.src.read_exact(&mut self.scratch).map_err(truncated)?;
        self.bytes_left -= len + 4;
        self.remaining -= 1;
        RecordView::parse(&self.scratch).map(Some)
    }
}

fn truncated(err: std::io::Error) -> RowpackError {
    if err.kind() == ErrorKind::UnexpectedEof {
        RowpackError::corrupt("rows segment truncated")
    } else {
        RowpackError::Io(err)
    }
}

/// Iterator over every record. See [`Reader::raw`].
pub struct RawRows<'r> {
    cursor: RowCursor<'r>,
    done: bool,
}

impl Iterator for RawRows<'_> {
    type Item = RowpackResult<RowRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let record = match self.cursor.next_record() {
            Ok(Some(view)) => view.values().map(|values| RowRecord {
                tag: view.tag(),
                values,
            }),
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e),
        };
        if record.is_err() {
            self.done = true;
        }
        Some(record)
    }
}

/// Iterator over data-row values. See [`Reader::rows`].
pub struct DataRows<'r> {
    cursor: RowCursor<'r>,
    start: u64,
    end: u64,
    width: Option<usize>,
    done: bool,
}

impl Iterator for DataRows<'_> {
    type Item = RowpackResult<Vec<Cell>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let view = match self.cursor.next_record() {
                Ok(Some(view)) => view,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let tag = view.tag();
            // Row numbers only grow, so nothing after the end row can qualify.
            if tag.row_number > self.end {
                self.done = true;
                return None;
            }
            if tag.flag != RowFlag::Data || tag.row_number < self.start {
                continue;
            }
            let values = match self.width {
                Some(n) => view.first(n),
                None => view.values(),
            };
            if values.is_err() {
                self.done = true;
            }
            return Some(values);
        }
    }
}

/// Iterator over data rows as [`RowProxy`]. See [`Reader::iter`].
pub struct ProxyRows<'r> {
    rows: DataRows<'r>,
    headers: Arc<HeaderIndex>,
}

impl Iterator for ProxyRows<'_> {
    type Item = RowpackResult<RowProxy>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = self.rows.next()?;
        Some(values.map(|values| RowProxy::new(Arc::clone(&self.headers), values)))
    }
}
