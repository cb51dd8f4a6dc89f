//! Handle for one container location.

use std::path::Path;

use crate::config::SourceSpec;
use crate::editor::MetadataEditor;
use crate::error::RowpackResult;
use crate::intuit::{TypeIntuiter, TypeReport};
use crate::load::{LoadOptions, load_path, load_rows};
use crate::meta::{ColumnStats, Metadata};
use crate::reader::Reader;
use crate::source::{RowSource, SourceRegistry};
use crate::stats::collect_stats;
use crate::storage::{AccessMode, RowStore};
use crate::writer::{Writer, WriterOptions};

/// A location inside a [`RowStore`]. Creating the handle does not touch storage.
#[derive(Debug, Clone)]
pub struct Container {
    store: RowStore,
    location: String,
}

impl Container {
    pub(crate) fn new(store: RowStore, location: String) -> Self {
        Self { store, location }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn store(&self) -> &RowStore {
        &self.store
    }

    pub fn exists(&self) -> RowpackResult<bool> {
        self.store.storage().exists(&self.location)
    }

    /// Create (or truncate) the container and open it for writing.
    pub fn writer(&self) -> RowpackResult<Writer> {
        self.writer_with(&WriterOptions::default())
    }

    pub fn writer_with(&self, options: &WriterOptions) -> RowpackResult<Writer> {
        let guard = self.store.acquire(&self.location, AccessMode::Write)?;
        Writer::create(self.store.clone(), self.location.clone(), guard, options)
    }

    pub fn reader(&self) -> RowpackResult<Reader> {
        let guard = self.store.acquire(&self.location, AccessMode::Read)?;
        Reader::open(self.store.clone(), self.location.clone(), guard)
    }

    /// Open the metadata of a finalized container for editing.
    pub fn edit_metadata(&self) -> RowpackResult<MetadataEditor> {
        let guard = self.store.acquire(&self.location, AccessMode::Write)?;
        let file = self.store.storage().open_update(&self.location)?;
        MetadataEditor::open(file, self.location.clone(), guard)
    }

    /// Snapshot of the stored metadata.
    pub fn info(&self) -> RowpackResult<Metadata> {
        Ok(self.reader()?.meta().clone())
    }

    /// Delete the container. Fails while any handle holds it.
    pub fn remove(&self) -> RowpackResult<()> {
        let _guard = self.store.acquire(&self.location, AccessMode::Write)?;
        self.store.storage().remove(&self.location)
    }

    /// Infer column types from the stored data rows and record them in the schema.
    pub fn intuit_types(&self, intuiter: &TypeIntuiter) -> RowpackResult<TypeReport> {
        let report = {
            let reader = self.reader()?;
            intuiter.run_reader(&reader)?
        };
        let mut editor = self.edit_metadata()?;
        editor.set_column_types(report.types())?;
        editor.commit()?;
        Ok(report)
    }

    /// Compute per-column statistics over the data rows and record them in `stats`.
    pub fn run_stats(&self) -> RowpackResult<Vec<ColumnStats>> {
        let stats = {
            let reader = self.reader()?;
            collect_stats(&reader)?
        };
        let mut editor = self.edit_metadata()?;
        editor.set_stats(stats.clone());
        editor.commit()?;
        Ok(stats)
    }

    /// Ingest `source` into this container. See [`crate::load`].
    pub fn load_rows(
        &self,
        source: &mut dyn RowSource,
        spec: &SourceSpec,
        options: &LoadOptions,
    ) -> RowpackResult<Metadata> {
        load_rows(self, source, spec, options)
    }

    /// Open the file at `path` with the built-in adapters and ingest it.
    pub fn load_path(
        &self,
        path: impl AsRef<Path>,
        spec: &SourceSpec,
        options: &LoadOptions,
    ) -> RowpackResult<Metadata> {
        load_path(self, &SourceRegistry::builtin(), path, spec, options)
    }
}
