//! Binary layout of a rowpack container.
//!
//! ```text
//! +----------------------+---------------------------+-----------------+----------------------+
//! | header (128 B)       | metadata reserve          | rows segment    | [trailing metadata]  |
//! +----------------------+---------------------------+-----------------+----------------------+
//!
//! Header (little-endian):
//! - magic: 4 bytes "RWPK"
//! - version_major: 2 bytes, version_minor: 2 bytes
//! - flags: 4 bytes
//! - metadata_offset: 8 bytes, metadata_len: 8 bytes
//! - rows_offset: 8 bytes, rows_len: 8 bytes
//! - n_records: 8 bytes
//! - metadata_crc: 4 bytes (CRC32 of the metadata segment)
//! - header_crc: 4 bytes (CRC32 of every preceding header byte)
//! - zero padding
//!
//! Record:
//! - body_len: 4 bytes
//! - group: 1 byte, row_number: 8 bytes, flag: 1 byte ('H' / 'D' / 'B')
//! - n_cells: 4 bytes
//! - cells: kind tag (1 byte) + payload
//! ```
//!
//! The header is written last, on finalize. A file whose magic is still zero was never sealed.

pub mod codec;

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{RowpackError, RowpackResult};

pub use codec::{RecordView, decode_metadata, encode_metadata, encode_record};

/// Magic bytes at offset zero of a finalized container.
pub const MAGIC: &[u8; 4] = b"RWPK";
/// Major format version; readers reject a different major.
pub const VERSION_MAJOR: u16 = 1;
/// Minor format version; additive changes only.
pub const VERSION_MINOR: u16 = 0;
/// Fixed header segment size.
pub const HEADER_SIZE: usize = 128;
/// Default space reserved for metadata between the header and the rows segment.
pub const DEFAULT_METADATA_RESERVE: u64 = 16 * 1024;

const CRC_COVERED: usize = 56;

/// Header segment of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub flags: u32,
    pub metadata_offset: u64,
    pub metadata_len: u64,
    pub rows_offset: u64,
    pub rows_len: u64,
    pub n_records: u64,
    pub metadata_crc: u32,
}

impl FileHeader {
    pub fn new(rows_offset: u64) -> Self {
        Self {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            flags: 0,
            metadata_offset: HEADER_SIZE as u64,
            metadata_len: 0,
            rows_offset,
            rows_len: 0,
            n_records: 0,
            metadata_crc: 0,
        }
    }

    /// End of the rows segment.
    pub fn rows_end(&self) -> u64 {
        self.rows_offset + self.rows_len
    }

    /// Bytes available for metadata between the header and the rows segment.
    pub fn metadata_reserve(&self) -> u64 {
        self.rows_offset.saturating_sub(HEADER_SIZE as u64)
    }

    /// Serialize to exactly [`HEADER_SIZE`] bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&self.version_major.to_le_bytes());
        buf.extend_from_slice(&self.version_minor.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.metadata_offset.to_le_bytes());
        buf.extend_from_slice(&self.metadata_len.to_le_bytes());
        buf.extend_from_slice(&self.rows_offset.to_le_bytes());
        buf.extend_from_slice(&self.rows_len.to_le_bytes());
        buf.extend_from_slice(&self.n_records.to_le_bytes());
        buf.extend_from_slice(&self.metadata_crc.to_le_bytes());
        debug_assert_eq!(buf.len(), CRC_COVERED);

        let checksum = crc32fast::hash(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.resize(HEADER_SIZE, 0);
        buf
    }

    /// True when the header region has never been written (all-zero magic).
    pub fn is_unsealed(bytes: &[u8]) -> bool {
        bytes.len() < MAGIC.len() || bytes[..MAGIC.len()].iter().all(|b| *b == 0)
    }

    /// Deserialize and validate magic, version and header checksum.
    pub fn from_bytes(bytes: &[u8]) -> RowpackResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RowpackError::corrupt(format!(
                "header segment truncated ({} of {HEADER_SIZE} bytes)",
                bytes.len()
            )));
        }

        let mut cursor = Cursor::new(bytes);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(RowpackError::corrupt(format!("bad magic {magic:?}")));
        }

        let version_major = cursor.read_u16::<LittleEndian>()?;
        let version_minor = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u32::<LittleEndian>()?;
        let metadata_offset = cursor.read_u64::<LittleEndian>()?;
        let metadata_len = cursor.read_u64::<LittleEndian>()?;
        let rows_offset = cursor.read_u64::<LittleEndian>()?;
        let rows_len = cursor.read_u64::<LittleEndian>()?;
        let n_records = cursor.read_u64::<LittleEndian>()?;
        let metadata_crc = cursor.read_u32::<LittleEndian>()?;
        let checksum = cursor.read_u32::<LittleEndian>()?;

        let computed = crc32fast::hash(&bytes[..CRC_COVERED]);
        if computed != checksum {
            return Err(RowpackError::corrupt("header checksum mismatch"));
        }
        if version_major != VERSION_MAJOR {
            return Err(RowpackError::corrupt(format!(
                "unsupported format version {version_major}.{version_minor} (expected {VERSION_MAJOR}.x)"
            )));
        }
        if rows_offset < HEADER_SIZE as u64 || metadata_offset < HEADER_SIZE as u64 {
            return Err(RowpackError::corrupt("segment offset inside header"));
        }

        Ok(Self {
            version_major,
            version_minor,
            flags,
            metadata_offset,
            metadata_len,
            rows_offset,
            rows_len,
            n_records,
            metadata_crc,
        })
    }

    /// Validate a metadata segment against the recorded checksum.
    pub fn verify_metadata(&self, bytes: &[u8]) -> RowpackResult<()> {
        if bytes.len() as u64 != self.metadata_len {
            return Err(RowpackError::corrupt("metadata segment truncated"));
        }
        if crc32fast::hash(bytes) != self.metadata_crc {
            return Err(RowpackError::corrupt("metadata checksum mismatch"));
        }
        Ok(())
    }
}
