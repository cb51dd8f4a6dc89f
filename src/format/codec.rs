//! Tagged binary encoding shared by the metadata segment and row records.
//!
//! Every value starts with a one-byte kind tag. Fixed-size payloads follow directly; strings,
//! binaries, arrays and maps carry a `u32` length prefix. Cells inside a record can therefore be
//! skipped without being decoded.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike};
use serde_json::{Map, Number, Value as JsonValue};

use crate::error::{RowpackError, RowpackResult};
use crate::types::{Cell, RowFlag, RowGroup, RowTag};

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_UINT: u8 = 0x04;
const TAG_FLOAT: u8 = 0x05;
const TAG_STR: u8 = 0x06;
const TAG_BINARY: u8 = 0x07;
const TAG_DATE: u8 = 0x08;
const TAG_TIME: u8 = 0x09;
const TAG_DATETIME: u8 = 0x0A;
const TAG_ARRAY: u8 = 0x10;
const TAG_MAP: u8 = 0x11;

const MAX_DEPTH: usize = 64;

/// Record prefix: group (1) + row_number (8) + flag (1) + n_cells (4).
const RECORD_FIXED: usize = 14;

fn put_len(buf: &mut Vec<u8>, len: usize, what: &str) -> RowpackResult<()> {
    let len = u32::try_from(len)
        .map_err(|_| RowpackError::encoding(format!("{what} of {len} bytes exceeds u32 length prefix")))?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn put_bytes(buf: &mut Vec<u8>, tag: u8, bytes: &[u8], what: &str) -> RowpackResult<()> {
    buf.push(tag);
    put_len(buf, bytes.len(), what)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Append one tagged cell to `buf`.
pub fn encode_cell(buf: &mut Vec<u8>, cell: &Cell) -> RowpackResult<()> {
    match cell {
        Cell::Null => buf.push(TAG_NULL),
        Cell::Bool(false) => buf.push(TAG_FALSE),
        Cell::Bool(true) => buf.push(TAG_TRUE),
        Cell::Int(v) => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Cell::Float(v) => {
            buf.push(TAG_FLOAT);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Cell::Str(s) => put_bytes(buf, TAG_STR, s.as_bytes(), "string")?,
        Cell::Binary(b) => put_bytes(buf, TAG_BINARY, b, "binary")?,
        Cell::Date(d) => {
            buf.push(TAG_DATE);
            buf.extend_from_slice(&d.num_days_from_ce().to_le_bytes());
        }
        Cell::Time(t) => {
            buf.push(TAG_TIME);
            buf.extend_from_slice(&t.num_seconds_from_midnight().to_le_bytes());
            buf.extend_from_slice(&t.nanosecond().to_le_bytes());
        }
        Cell::DateTime(dt) => {
            let utc = dt.and_utc();
            buf.push(TAG_DATETIME);
            buf.extend_from_slice(&utc.timestamp().to_le_bytes());
            buf.extend_from_slice(&utc.timestamp_subsec_nanos().to_le_bytes());
        }
    }
    Ok(())
}

/// Append a complete length-prefixed record to `buf`.
///
/// `buf` is not cleared, so callers can batch several records into one write.
pub fn encode_record(buf: &mut Vec<u8>, tag: &RowTag, values: &[Cell]) -> RowpackResult<()> {
    let len_at = buf.len();
    buf.extend_from_slice(&[0u8; 4]);
    buf.push(tag.group.to_byte());
    buf.extend_from_slice(&tag.row_number.to_le_bytes());
    buf.push(tag.flag.to_byte());
    put_len(buf, values.len(), "row")?;
    for cell in values {
        encode_cell(buf, cell)?;
    }
    let body_len = buf.len() - len_at - 4;
    let body_len = u32::try_from(body_len)
        .map_err(|_| RowpackError::encoding(format!("record of {body_len} bytes is too large")))?;
    LittleEndian::write_u32(&mut buf[len_at..len_at + 4], body_len);
    Ok(())
}

/// Bounds-checked reader over an in-memory slice.
struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> RowpackResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| RowpackError::corrupt(format!("value runs past end of segment at byte {}", self.pos)))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> RowpackResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> RowpackResult<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn i32(&mut self) -> RowpackResult<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    fn u64(&mut self) -> RowpackResult<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    fn i64(&mut self) -> RowpackResult<i64> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    fn f64(&mut self) -> RowpackResult<f64> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    fn len_prefixed(&mut self) -> RowpackResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> RowpackResult<String> {
        let bytes = self.len_prefixed()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| RowpackError::corrupt(format!("invalid utf-8 in string cell: {e}")))
    }

    fn is_done(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

fn decode_cell(dec: &mut Decoder<'_>) -> RowpackResult<Cell> {
    let tag = dec.u8()?;
    let cell = match tag {
        TAG_NULL => Cell::Null,
        TAG_FALSE => Cell::Bool(false),
        TAG_TRUE => Cell::Bool(true),
        TAG_INT => Cell::Int(dec.i64()?),
        TAG_FLOAT => Cell::Float(dec.f64()?),
        TAG_STR => Cell::Str(dec.string()?),
        TAG_BINARY => Cell::Binary(dec.len_prefixed()?.to_vec()),
        TAG_DATE => {
            let days = dec.i32()?;
            NaiveDate::from_num_days_from_ce_opt(days)
                .map(Cell::Date)
                .ok_or_else(|| RowpackError::corrupt(format!("date out of range: {days} days")))?
        }
        TAG_TIME => {
            let secs = dec.u32()?;
            let nanos = dec.u32()?;
            NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
                .map(Cell::Time)
                .ok_or_else(|| RowpackError::corrupt(format!("time out of range: {secs}s")))?
        }
        TAG_DATETIME => {
            let secs = dec.i64()?;
            let nanos = dec.u32()?;
            DateTime::from_timestamp(secs, nanos)
                .map(|dt| Cell::DateTime(dt.naive_utc()))
                .ok_or_else(|| RowpackError::corrupt(format!("timestamp out of range: {secs}s")))?
        }
        other => return Err(RowpackError::corrupt(format!("unknown cell tag 0x{other:02x}"))),
    };
    Ok(cell)
}

fn skip_cell(dec: &mut Decoder<'_>) -> RowpackResult<()> {
    let tag = dec.u8()?;
    match tag {
        TAG_NULL | TAG_FALSE | TAG_TRUE => {}
        TAG_INT | TAG_FLOAT | TAG_TIME => {
            dec.take(8)?;
        }
        TAG_DATE => {
            dec.take(4)?;
        }
        TAG_DATETIME => {
            dec.take(12)?;
        }
        TAG_STR | TAG_BINARY => {
            dec.len_prefixed()?;
        }
        other => return Err(RowpackError::corrupt(format!("unknown cell tag 0x{other:02x}"))),
    }
    Ok(())
}

/// Borrowed view of one record body; cells are decoded on demand.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    tag: RowTag,
    n_cells: usize,
    cells: &'a [u8],
}

impl<'a> RecordView<'a> {
    /// Parse the fixed prefix of a record body (without its length prefix).
    pub fn parse(body: &'a [u8]) -> RowpackResult<Self> {
        if body.len() < RECORD_FIXED {
            return Err(RowpackError::corrupt(format!("record body of {} bytes", body.len())));
        }
        let group = RowGroup::from_byte(body[0])
            .ok_or_else(|| RowpackError::corrupt(format!("unknown row group {}", body[0])))?;
        let row_number = LittleEndian::read_u64(&body[1..9]);
        let flag = RowFlag::from_byte(body[9])
            .ok_or_else(|| RowpackError::corrupt(format!("unknown row flag 0x{:02x}", body[9])))?;
        let n_cells = LittleEndian::read_u32(&body[10..14]) as usize;
        Ok(Self {
            tag: RowTag::new(group, row_number, flag),
            n_cells,
            cells: &body[RECORD_FIXED..],
        })
    }

    pub fn tag(&self) -> RowTag {
        self.tag
    }

    /// Number of cells stored in the record.
    pub fn len(&self) -> usize {
        self.n_cells
    }

    pub fn is_empty(&self) -> bool {
        self.n_cells == 0
    }

    /// Decode the cell at 0-based `index`, skipping the ones before it.
    pub fn cell(&self, index: usize) -> RowpackResult<Option<Cell>> {
        if index >= self.n_cells {
            return Ok(None);
        }
        let mut dec = Decoder::new(self.cells);
        for _ in 0..index {
            skip_cell(&mut dec)?;
        }
        decode_cell(&mut dec).map(Some)
    }

    /// Decode at most the first `n` cells.
    pub fn first(&self, n: usize) -> RowpackResult<Vec<Cell>> {
        let take = n.min(self.n_cells);
        // Every cell takes at least its tag byte.
        let mut out = Vec::with_capacity(take.min(self.cells.len()));
        let mut dec = Decoder::new(self.cells);
        for _ in 0..take {
            out.push(decode_cell(&mut dec)?);
        }
        Ok(out)
    }

    /// Decode every cell.
    pub fn values(&self) -> RowpackResult<Vec<Cell>> {
        self.first(self.n_cells)
    }
}

/// Encode a metadata tree.
pub fn encode_metadata(value: &JsonValue) -> RowpackResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(1024);
    encode_json(&mut buf, value)?;
    Ok(buf)
}

fn encode_json(buf: &mut Vec<u8>, value: &JsonValue) -> RowpackResult<()> {
    match value {
        JsonValue::Null => buf.push(TAG_NULL),
        JsonValue::Bool(false) => buf.push(TAG_FALSE),
        JsonValue::Bool(true) => buf.push(TAG_TRUE),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                buf.push(TAG_INT);
                buf.extend_from_slice(&i.to_le_bytes());
            } else if let Some(u) = n.as_u64() {
                buf.push(TAG_UINT);
                buf.extend_from_slice(&u.to_le_bytes());
            } else {
                let f = n
                    .as_f64()
                    .ok_or_else(|| RowpackError::encoding(format!("number {n} has no f64 form")))?;
                buf.push(TAG_FLOAT);
                buf.extend_from_slice(&f.to_le_bytes());
            }
        }
        JsonValue::String(s) => put_bytes(buf, TAG_STR, s.as_bytes(), "string")?,
        JsonValue::Array(items) => {
            buf.push(TAG_ARRAY);
            put_len(buf, items.len(), "array")?;
            for item in items {
                encode_json(buf, item)?;
            }
        }
        JsonValue::Object(map) => {
            buf.push(TAG_MAP);
            put_len(buf, map.len(), "map")?;
            for (k, v) in map {
                put_len(buf, k.len(), "map key")?;
                buf.extend_from_slice(k.as_bytes());
                encode_json(buf, v)?;
            }
        }
    }
    Ok(())
}

/// Decode a metadata tree; trailing bytes are an error.
pub fn decode_metadata(bytes: &[u8]) -> RowpackResult<JsonValue> {
    let mut dec = Decoder::new(bytes);
    let value = decode_json(&mut dec, 0)?;
    if !dec.is_done() {
        return Err(RowpackError::corrupt("trailing bytes after metadata"));
    }
    Ok(value)
}

fn decode_json(dec: &mut Decoder<'_>, depth: usize) -> RowpackResult<JsonValue> {
    if depth > MAX_DEPTH {
        return Err(RowpackError::corrupt("metadata nested too deeply"));
    }
    let tag = dec.u8()?;
    let value = match tag {
        TAG_NULL => JsonValue::Null,
        TAG_FALSE => JsonValue::Bool(false),
        TAG_TRUE => JsonValue::Bool(true),
        TAG_INT => JsonValue::Number(dec.i64()?.into()),
        TAG_UINT => JsonValue::Number(dec.u64()?.into()),
        TAG_FLOAT => Number::from_f64(dec.f64()?)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        TAG_STR => JsonValue::String(dec.string()?),
        TAG_ARRAY => {
            let n = dec.u32()? as usize;
            let mut items = Vec::with_capacity(n.min(4096));
            for _ in 0..n {
                items.push(decode_json(dec, depth + 1)?);
            }
            JsonValue::Array(items)
        }
        TAG_MAP => {
            let n = dec.u32()? as usize;
            let mut map = Map::new();
            for _ in 0..n {
                let key = dec.string()?;
                let v = decode_json(dec, depth + 1)?;
                map.insert(key, v);
            }
            JsonValue::Object(map)
        }
        other => return Err(RowpackError::corrupt(format!("unknown metadata tag 0x{other:02x}"))),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn body_of(buf: &[u8]) -> &[u8] {
        let len = LittleEndian::read_u32(&buf[..4]) as usize;
        assert_eq!(buf.len(), len + 4);
        &buf[4..]
    }

    fn mixed_row() -> Vec<Cell> {
        let day = NaiveDate::from_ymd_opt(2004, 2, 29).unwrap();
        vec![
            Cell::Null,
            Cell::Bool(true),
            Cell::Int(-7),
            Cell::Float(2.5),
            Cell::from("héllo"),
            Cell::Date(day),
            Cell::Time(NaiveTime::from_hms_milli_opt(23, 59, 1, 250).unwrap()),
            Cell::DateTime(day.and_hms_opt(1, 2, 3).unwrap()),
            Cell::Binary(vec![0, 1, 255]),
        ]
    }

    #[test]
    fn record_preserves_tag_and_every_kind() {
        let values = mixed_row();
        let tag = RowTag::data(12);
        let mut buf = Vec::new();
        encode_record(&mut buf, &tag, &values).unwrap();

        let view = RecordView::parse(body_of(&buf)).unwrap();
        assert_eq!(view.tag(), tag);
        assert_eq!(view.len(), values.len());
        assert_eq!(view.values().unwrap(), values);
    }

    #[test]
    fn cell_lookup_skips_preceding_cells() {
        let values = mixed_row();
        let mut buf = Vec::new();
        encode_record(&mut buf, &RowTag::header(1), &values).unwrap();
        let view = RecordView::parse(body_of(&buf)).unwrap();

        assert_eq!(view.cell(4).unwrap(), Some(Cell::from("héllo")));
        assert_eq!(view.cell(8).unwrap(), Some(Cell::Binary(vec![0, 1, 255])));
        assert_eq!(view.cell(9).unwrap(), None);
        assert_eq!(view.first(2).unwrap(), values[..2].to_vec());
    }

    #[test]
    fn truncated_record_is_corrupt() {
        let mut buf = Vec::new();
        encode_record(&mut buf, &RowTag::data(1), &[Cell::from("abcdef")]).unwrap();
        let body = &buf[4..buf.len() - 2];
        let view = RecordView::parse(body).unwrap();
        assert!(matches!(view.values(), Err(RowpackError::Corrupt { .. })));
    }

    #[test]
    fn metadata_tree_survives_encoding() {
        let meta = json!({
            "source": {"url": "http://example.com/a.csv", "encoding": null},
            "about": {"data_start_row": 4, "header_rows": [3], "big": u64::MAX},
            "schema": [{"pos": 1, "name": "a", "ratio": 0.25, "flag": true}],
        });
        let bytes = encode_metadata(&meta).unwrap();
        assert_eq!(decode_metadata(&bytes).unwrap(), meta);
    }

    #[test]
    fn metadata_rejects_trailing_bytes() {
        let mut bytes = encode_metadata(&json!({"a": 1})).unwrap();
        bytes.push(TAG_NULL);
        assert!(decode_metadata(&bytes).is_err());
    }
}
