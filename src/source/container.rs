use std::path::Path;

use crate::config::SourceSpec;
use crate::container::Container;
use crate::error::RowpackResult;
use crate::meta::SourceMeta;
use crate::reader::Reader;
use crate::source::{RowIter, RowSource, name_of};
use crate::storage::RowStore;

/// Every stored record of a finalized container, header and blank rows included, so a reload
/// re-derives the boundary from the same rows. Gaps in the stored row numbers come back as
/// empty rows, keeping each row at its original number.
///
/// Holds a read handle on the container for as long as the source lives.
#[derive(Debug)]
pub struct ContainerSource {
    name: String,
    reader: Reader,
}

impl ContainerSource {
    pub fn new(reader: Reader) -> Self {
        Self {
            name: reader.location().to_owned(),
            reader,
        }
    }

    pub fn open(container: &Container) -> RowpackResult<Self> {
        Ok(Self::new(container.reader()?))
    }

    /// A container file on the local filesystem.
    pub fn from_path(path: impl AsRef<Path>) -> RowpackResult<Self> {
        let path = path.as_ref();
        let root = path.parent().unwrap_or_else(|| Path::new(""));
        let mut source = Self::open(&RowStore::local(root).container(&name_of(path)))?;
        source.name = name_of(path);
        Ok(source)
    }

    pub fn reader(&self) -> &Reader {
        &self.reader
    }
}

pub(crate) fn open_container(path: &Path, _spec: &SourceSpec) -> RowpackResult<Box<dyn RowSource>> {
    Ok(Box::new(ContainerSource::from_path(path)?))
}

impl RowSource for ContainerSource {
    fn name(&self) -> &str {
        &self.name
    }

    /// The stored provenance, so a copy still names where its rows came from.
    fn descriptor(&self) -> SourceMeta {
        let mut meta = self.reader.meta().source.clone();
        if meta.name.is_none() {
            meta.name = Some(self.name.clone());
        }
        meta
    }

    fn rows(&mut self) -> RowpackResult<RowIter<'_>> {
        let mut next_row = 1u64;
        Ok(Box::new(self.reader.raw()?.flat_map(move |record| {
            let record = match record {
                Ok(r) => r,
                Err(e) => return vec![Err(e)],
            };
            let mut out = Vec::new();
            while next_row < record.tag.row_number {
                out.push(Ok(Vec::new()));
                next_row += 1;
            }
            next_row = record.tag.row_number + 1;
            out.push(Ok(record.values));
            out
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, RowGroup, RowTag};

    #[test]
    fn stored_rows_come_back_at_their_numbers() {
        let store = RowStore::memory();
        let container = store.container("src");
        let mut w = container.writer().unwrap();
        w.append_row(RowTag::header(2), &[Cell::from("id")]).unwrap();
        w.append_row(RowTag::blank(RowGroup::Data, 3), &[]).unwrap();
        w.append_row(RowTag::data(5), &[Cell::Int(7)]).unwrap();
        w.finalize().unwrap();

        let mut src = ContainerSource::open(&container).unwrap();
        let rows: Vec<Vec<Cell>> = src.rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 5);
        assert!(rows[0].is_empty() && rows[2].is_empty() && rows[3].is_empty());
        assert_eq!(rows[1], vec![Cell::from("id")]);
        assert_eq!(rows[4], vec![Cell::Int(7)]);

        let again: Vec<Vec<Cell>> = src.rows().unwrap().map(Result::unwrap).collect();
        assert_eq!(again, rows);
        assert_eq!(src.name(), "src");
    }

    #[test]
    fn source_holds_a_read_handle() {
        let store = RowStore::memory();
        let container = store.container("held");
        let mut w = container.writer().unwrap();
        w.insert_row(&[Cell::Int(1)]).unwrap();
        w.finalize().unwrap();

        let src = ContainerSource::open(&container).unwrap();
        assert!(container.writer().is_err());
        drop(src);
        assert!(container.writer().is_ok());
    }
}
