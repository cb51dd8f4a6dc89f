//! Delimited-text source.

use std::io::{BufReader, Read};
use std::path::Path;

use crate::config::SourceSpec;
use crate::error::{RowpackError, RowpackResult};
use crate::meta::SourceMeta;
use crate::source::{RowIter, RowSource, TextInput, check_text_encoding, name_of, text_cell};
use crate::types::Cell;

/// Rows of a delimited text file, read without interpreting any line as a header.
///
/// Rules:
///
/// - Rows may have different widths.
/// - Empty lines come through as empty rows instead of being skipped.
/// - Fields are trimmed; empty fields become null.
/// - Bytes that are not valid UTF-8 are replaced rather than rejected.
#[derive(Debug, Clone)]
pub struct CsvSource {
    name: String,
    input: TextInput,
    delimiter: u8,
    url: Option<String>,
}

impl CsvSource {
    /// Comma-separated file at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let input = TextInput::Path(path.to_path_buf());
        Self {
            name: name_of(path),
            url: input.url(),
            input,
            delimiter: b',',
        }
    }

    /// Tab-separated file at `path`.
    pub fn tsv(path: impl AsRef<Path>) -> Self {
        Self::from_path(path).with_delimiter(b'\t')
    }

    /// Delimited text already in memory.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            input: TextInput::Bytes(bytes.into()),
            delimiter: b',',
            url: None,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    fn configured(mut self, spec: &SourceSpec) -> RowpackResult<Self> {
        check_text_encoding(spec)?;
        if let Some(d) = spec.delimiter {
            if !d.is_ascii() {
                return Err(RowpackError::SchemaMismatch {
                    message: format!("delimiter {d:?} is not an ASCII character"),
                });
            }
            self.delimiter = d as u8;
        }
        Ok(self)
    }
}

pub(crate) fn open_csv(path: &Path, spec: &SourceSpec) -> RowpackResult<Box<dyn RowSource>> {
    Ok(Box::new(CsvSource::from_path(path).configured(spec)?))
}

pub(crate) fn open_tsv(path: &Path, spec: &SourceSpec) -> RowpackResult<Box<dyn RowSource>> {
    Ok(Box::new(CsvSource::tsv(path).configured(spec)?))
}

impl RowSource for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> SourceMeta {
        SourceMeta {
            name: Some(self.name.clone()),
            url: self.url.clone(),
            encoding: Some("utf-8".to_owned()),
            ..SourceMeta::default()
        }
    }

    fn rows(&mut self) -> RowpackResult<RowIter<'_>> {
        let rdr = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(self.input.open()?);
        // The csv reader drops empty lines; a second pass over the raw bytes finds the line each
        // record starts on so the empty rows can be put back.
        let mut starts = RecordStarts::new(BufReader::new(self.input.open()?), self.delimiter);
        let mut next_line = 1u64;
        Ok(Box::new(rdr.into_byte_records().flat_map(move |record| {
            let record = match record {
                Ok(r) => r,
                Err(e) => return vec![Err(RowpackError::from(e))],
            };
            let line = match starts.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return vec![Err(e)],
                None => next_line,
            };
            let mut out: Vec<RowpackResult<Vec<Cell>>> = Vec::new();
            while next_line < line {
                out.push(Ok(Vec::new()));
                next_line += 1;
            }
            next_line = line + 1 + embedded_newlines(&record);
            out.push(Ok(record
                .iter()
                .map(|field| text_cell(&String::from_utf8_lossy(field)))
                .collect()));
            out
        })))
    }
}

/// Line breaks inside quoted fields; the record spans that many extra lines.
fn embedded_newlines(record: &::csv::ByteRecord) -> u64 {
    record
        .iter()
        .map(|f| f.iter().filter(|b| **b == b'\n').count() as u64)
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Unquoted field; `true` right after a delimiter or at the start of a record.
    Field(bool),
    Quoted,
    /// A quote inside a quoted field: either an escaped quote or the closing one.
    QuoteInQuoted,
}

/// 1-based line on which each non-empty record starts, following the csv reader's quoting
/// rules: quotes open a field only at its start, and `""` inside quotes is a literal quote.
struct RecordStarts<R> {
    bytes: std::io::Bytes<R>,
    delimiter: u8,
    line: u64,
    in_record: bool,
    state: ScanState,
}

impl<R: Read> RecordStarts<R> {
    fn new(reader: R, delimiter: u8) -> Self {
        Self {
            bytes: reader.bytes(),
            delimiter,
            line: 1,
            in_record: false,
            state: ScanState::Field(true),
        }
    }

    /// Feed one byte; returns the start line when it opens a record.
    fn step(&mut self, b: u8) -> Option<u64> {
        match self.state {
            ScanState::Quoted => {
                if b == b'"' {
                    self.state = ScanState::QuoteInQuoted;
                } else if b == b'\n' {
                    self.line += 1;
                }
                return None;
            }
            ScanState::QuoteInQuoted if b == b'"' => {
                self.state = ScanState::Quoted;
                return None;
            }
            ScanState::QuoteInQuoted => self.state = ScanState::Field(false),
            ScanState::Field(_) => {}
        }
        match b {
            b'\n' | b'\r' => {
                if b == b'\n' {
                    self.line += 1;
                }
                self.in_record = false;
                self.state = ScanState::Field(true);
                None
            }
            _ => {
                let opened = (!self.in_record).then_some(self.line);
                self.in_record = true;
                self.state = if b == self.delimiter {
                    ScanState::Field(true)
                } else if b == b'"' && self.state == ScanState::Field(true) {
                    ScanState::Quoted
                } else {
                    ScanState::Field(false)
                };
                opened
            }
        }
    }
}

impl<R: Read> Iterator for RecordStarts<R> {
    type Item = RowpackResult<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(b) = self.bytes.next() {
            match b {
                Ok(b) => {
                    if let Some(line) = self.step(b) {
                        return Some(Ok(line));
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(source: &mut CsvSource) -> Vec<Vec<Cell>> {
        source.rows().unwrap().map(Result::unwrap).collect()
    }

    #[test]
    fn ragged_rows_and_empty_fields() {
        let mut src = CsvSource::from_bytes("t", "Title\n\na, b ,c\n1,,3\n");
        let rows = collect(&mut src);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], vec![Cell::from("Title")]);
        assert!(rows[1].is_empty());
        assert_eq!(rows[2], vec![Cell::from("a"), Cell::from("b"), Cell::from("c")]);
        assert_eq!(rows[3][1], Cell::Null);
    }

    #[test]
    fn quoted_newlines_do_not_invent_blank_rows() {
        let mut src = CsvSource::from_bytes("t", "a,\"multi\nline\"\n\n1,2\n");
        let rows = collect(&mut src);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][1], Cell::from("multi\nline"));
        assert!(rows[1].is_empty());
        assert_eq!(rows[2][0], Cell::from("1"));
    }

    #[test]
    fn crlf_blank_lines_keep_line_numbers() {
        let mut src =
            CsvSource::from_bytes("t", "Title\r\n\r\n\r\nname,age\r\nada,36\r\n\r\nnote\r\n");
        let rows = collect(&mut src);
        assert_eq!(rows.len(), 7);
        assert!(rows[1].is_empty() && rows[2].is_empty() && rows[5].is_empty());
        assert_eq!(rows[3], vec![Cell::from("name"), Cell::from("age")]);
        assert_eq!(rows[6], vec![Cell::from("note")]);
    }

    #[test]
    fn quote_inside_an_unquoted_field_is_literal() {
        let mut src = CsvSource::from_bytes("t", "5\"3,x\n\ny\n");
        let rows = collect(&mut src);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], Cell::from("5\"3"));
        assert!(rows[1].is_empty());
        assert_eq!(rows[2], vec![Cell::from("y")]);
    }

    #[test]
    fn rows_can_be_read_twice() {
        let mut src = CsvSource::from_bytes("t", "a\tb\n1\t2\n").with_delimiter(b'\t');
        assert_eq!(collect(&mut src), collect(&mut src));
        assert_eq!(collect(&mut src)[1], vec![Cell::from("1"), Cell::from("2")]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut src = CsvSource::from_bytes("t", b"caf\xe9,x\n".to_vec());
        let rows = collect(&mut src);
        assert_eq!(rows[0][0], Cell::from("caf\u{fffd}"));
    }

    #[test]
    fn wide_delimiter_is_rejected() {
        let spec = SourceSpec {
            delimiter: Some('→'),
            ..SourceSpec::default()
        };
        assert!(CsvSource::from_bytes("t", "").configured(&spec).is_err());
    }
}
