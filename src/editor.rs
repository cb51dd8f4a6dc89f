//! Metadata edits on a finalized container.

use crate::error::{RowpackError, RowpackResult};
use crate::format::FileHeader;
use crate::meta::{Column, ColumnKey, ColumnStats, Metadata};
use crate::reader::read_sealed;
use crate::storage::{FileHandle, HandleGuard};
use crate::types::ValueType;
use crate::writer::write_metadata;

/// Exclusive handle for changing the metadata of a finalized container.
///
/// Nothing is written until [`MetadataEditor::commit`]; dropping the editor discards the edits
/// and releases the location. The rows segment is never rewritten.
pub struct MetadataEditor {
    location: String,
    file: Box<dyn FileHandle>,
    header: FileHeader,
    meta: Metadata,
    _guard: HandleGuard,
}

impl std::fmt::Debug for MetadataEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataEditor")
            .field("location", &self.location)
            .field("header", &self.header)
            .finish()
    }
}

impl MetadataEditor {
    pub(crate) fn open(
        mut file: Box<dyn FileHandle>,
        location: String,
        guard: HandleGuard,
    ) -> RowpackResult<Self> {
        let (header, meta) = read_sealed(file.as_mut(), &location)?;
        Ok(Self {
            location,
            file,
            header,
            meta,
            _guard: guard,
        })
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Metadata {
        &mut self.meta
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

    /// Rename every column; `about.headers` follows. The column count cannot change.
    pub fn set_headers<S: AsRef<str>>(&mut self, names: &[S]) -> RowpackResult<()> {
        if names.len() != self.meta.n_cols() {
            return Err(RowpackError::SchemaMismatch {
                message: format!(
                    "{} names for a container with {} columns",
                    names.len(),
                    self.meta.n_cols()
                ),
            });
        }
        self.meta.set_headers(names);
        Ok(())
    }

    /// Write the edited metadata and header.
    pub fn commit(mut self) -> RowpackResult<Metadata> {
        self.meta.sync();
        write_metadata(self.file.as_mut(), &mut self.header, &self.meta)?;
        Ok(self.meta)
    }
}
