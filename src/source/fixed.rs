//! Fixed-width text source.

use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::{ColumnSpec, SourceSpec};
use crate::error::{RowpackError, RowpackResult};
use crate::meta::SourceMeta;
use crate::source::{RowIter, RowSource, TextInput, check_text_encoding, name_of, text_cell};
use crate::types::Cell;

/// Rows of a fixed-width text file, one per line, split at declared column offsets.
///
/// Each [`ColumnSpec`] needs a `width`; `start` (1-based) defaults to the end of the previous
/// column. Lines shorter than a field yield a truncated or null cell.
#[derive(Debug, Clone)]
pub struct FixedWidthSource {
    name: String,
    input: TextInput,
    /// 0-based character offset and width per column.
    fields: Vec<(usize, usize)>,
}

impl FixedWidthSource {
    pub fn from_path(path: impl AsRef<Path>, columns: &[ColumnSpec]) -> RowpackResult<Self> {
        let path = path.as_ref();
        Ok(Self {
            name: name_of(path),
            input: TextInput::Path(path.to_path_buf()),
            fields: layout(columns)?,
        })
    }

    pub fn from_bytes(
        name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        columns: &[ColumnSpec],
    ) -> RowpackResult<Self> {
        Ok(Self {
            name: name.into(),
            input: TextInput::Bytes(bytes.into()),
            fields: layout(columns)?,
        })
    }

    fn split(&self, line: &str) -> Vec<Cell> {
        let chars: Vec<char> = line.chars().collect();
        self.fields
            .iter()
            .map(|&(start, width)| {
                let lo = start.min(chars.len());
                let hi = start.saturating_add(width).min(chars.len());
                text_cell(&chars[lo..hi].iter().collect::<String>())
            })
            .collect()
    }
}

fn layout(columns: &[ColumnSpec]) -> RowpackResult<Vec<(usize, usize)>> {
    if columns.is_empty() {
        return Err(RowpackError::SchemaMismatch {
            message: "fixed-width source needs column widths".to_owned(),
        });
    }
    let mut next = 0;
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let width = c.width.ok_or_else(|| RowpackError::SchemaMismatch {
                message: format!("fixed-width column {} has no width", i + 1),
            })?;
            let start = c.start.map_or(next, |s| s.saturating_sub(1));
            next = start.checked_add(width).ok_or_else(|| RowpackError::SchemaMismatch {
                message: format!("fixed-width column {} ends past the largest offset", i + 1),
            })?;
            Ok((start, width))
        })
        .collect()
}

pub(crate) fn open_fixed(path: &Path, spec: &SourceSpec) -> RowpackResult<Box<dyn RowSource>> {
    check_text_encoding(spec)?;
    Ok(Box::new(FixedWidthSource::from_path(path, &spec.columns)?))
}

impl RowSource for FixedWidthSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> SourceMeta {
        SourceMeta {
            name: Some(self.name.clone()),
            url: self.input.url(),
            encoding: Some("utf-8".to_owned()),
            ..SourceMeta::default()
        }
    }

    fn rows(&mut self) -> RowpackResult<RowIter<'_>> {
        let reader = BufReader::new(self.input.open()?);
        let this = &*self;
        Ok(Box::new(reader.split(b'\n').map(move |line| {
            let mut line = line?;
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let text = String::from_utf8_lossy(&line);
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            Ok(this.split(&text))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(widths: &[usize]) -> Vec<ColumnSpec> {
        widths.iter().map(|w| ColumnSpec::default().with_width(*w)).collect()
    }

    #[test]
    fn splits_at_running_offsets() {
        let mut src =
            FixedWidthSource::from_bytes("fw", "id  name  \r\n1   ada\n\n", &columns(&[4, 6])).unwrap();
        let rows: Vec<Vec<Cell>> = src.rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![Cell::from("id"), Cell::from("name")]);
        assert_eq!(rows[1], vec![Cell::from("1"), Cell::from("ada")]);
        assert!(rows[2].is_empty());
    }

    #[test]
    fn explicit_start_is_one_based() {
        let mut spec = columns(&[2]);
        spec[0].start = Some(3);
        let mut src = FixedWidthSource::from_bytes("fw", "abcdef\n", &spec).unwrap();
        let rows: Vec<Vec<Cell>> = src.rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows[0], vec![Cell::from("cd")]);
    }

    #[test]
    fn overflowing_layout_is_a_schema_error() {
        let mut spec = columns(&[usize::MAX]);
        spec[0].start = Some(3);
        let err = FixedWidthSource::from_bytes("fw", "", &spec).unwrap_err();
        assert!(matches!(err, RowpackError::SchemaMismatch { .. }));
        let err = FixedWidthSource::from_bytes("fw", "", &columns(&[4, usize::MAX, 1])).unwrap_err();
        assert!(matches!(err, RowpackError::SchemaMismatch { .. }));
    }

    #[test]
    fn non_utf8_encoding_is_refused() {
        let mut spec = SourceSpec::default();
        spec.columns = columns(&[2]);
        spec.encoding = Some("windows-1252".into());
        let err = open_fixed(Path::new("stations.txt"), &spec).err().unwrap();
        assert!(matches!(err, RowpackError::Encoding { .. }));
    }

    #[test]
    fn missing_width_is_a_schema_error() {
        let err = FixedWidthSource::from_bytes("fw", "", &[ColumnSpec::named("a")]).unwrap_err();
        assert!(matches!(err, RowpackError::SchemaMismatch { .. }));
    }
}
