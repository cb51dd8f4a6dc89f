//! Source adapters: anything that yields rows of cells in order.
//!
//! Most callers open a file with [`open_source`], which picks an adapter from the file
//! extension (or [`SourceSpec::format`]) through the [`SourceRegistry`] capability table.
//! Adapters can also be built directly:
//! - [`GeneratorSource`] for rows produced in code
//! - [`CsvSource`] for delimited text
//! - [`FixedWidthSource`] for fixed-width text
//! - [`ContainerSource`] for the rows of another container
//! - `ExcelSource` for workbooks (cargo feature `excel`)

pub mod container;
pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod fixed;
pub mod generator;

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::SourceSpec;
use crate::error::{RowpackError, RowpackResult};
use crate::meta::SourceMeta;
use crate::types::Cell;

pub use self::container::ContainerSource;
pub use self::csv::CsvSource;
#[cfg(feature = "excel")]
pub use self::excel::ExcelSource;
pub use self::fixed::FixedWidthSource;
pub use self::generator::GeneratorSource;

/// Iterator handed out by [`RowSource::rows`].
pub type RowIter<'a> = Box<dyn Iterator<Item = RowpackResult<Vec<Cell>>> + 'a>;

/// Contract every source adapter implements.
pub trait RowSource {
    /// Short name used in logs and as the default `source.name`.
    fn name(&self) -> &str;

    /// Provenance recorded in the container's `source` section.
    fn descriptor(&self) -> SourceMeta {
        SourceMeta {
            name: Some(self.name().to_owned()),
            ..SourceMeta::default()
        }
    }

    /// Rows in source order, starting from the first. May be called more than once.
    fn rows(&mut self) -> RowpackResult<RowIter<'_>>;
}

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Comma-separated values.
    Csv,
    /// Tab-separated values.
    Tsv,
    /// Fixed-width text laid out by column widths.
    Fixed,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Excel,
    /// Another rowpack container.
    Container,
}

impl SourceFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" | "tab" => Some(Self::Tsv),
            "txt" | "fw" | "fixed" => Some(Self::Fixed),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            "rpk" => Some(Self::Container),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> RowpackResult<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| RowpackError::SchemaMismatch {
                message: format!(
                    "cannot infer format: path has no extension ({})",
                    path.display()
                ),
            })?;
        Self::from_extension(ext).ok_or_else(|| RowpackError::SchemaMismatch {
            message: format!(
                "cannot infer format from extension '{ext}' for path ({})",
                path.display()
            ),
        })
    }

    /// The `SourceSpec` format, else the one implied by the extension.
    pub fn resolve(path: &Path, spec: &SourceSpec) -> RowpackResult<Self> {
        match spec.format {
            Some(f) => Ok(f),
            None => Self::from_path(path),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Fixed => "fixed",
            Self::Excel => "excel",
            Self::Container => "container",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a format can be opened in this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Available,
    Disabled(String),
}

type Opener = fn(&Path, &SourceSpec) -> RowpackResult<Box<dyn RowSource>>;

struct Entry {
    capability: Capability,
    opener: Option<Opener>,
}

/// Capability table from format to adapter, built once at startup.
pub struct SourceRegistry {
    entries: BTreeMap<SourceFormat, Entry>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, e)| (k, &e.capability)))
            .finish()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SourceRegistry {
    /// Every adapter compiled into this build; the rest are listed as disabled.
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        let available = |opener: Opener| Entry {
            capability: Capability::Available,
            opener: Some(opener),
        };
        entries.insert(SourceFormat::Csv, available(csv::open_csv));
        entries.insert(SourceFormat::Tsv, available(csv::open_tsv));
        entries.insert(SourceFormat::Fixed, available(fixed::open_fixed));
        entries.insert(SourceFormat::Container, available(container::open_container));

        #[cfg(feature = "excel")]
        entries.insert(SourceFormat::Excel, available(excel::open_excel));
        #[cfg(not(feature = "excel"))]
        entries.insert(
            SourceFormat::Excel,
            Entry {
                capability: Capability::Disabled("enable cargo feature 'excel'".to_owned()),
                opener: None,
            },
        );

        Self { entries }
    }

    pub fn capability(&self, format: SourceFormat) -> Capability {
        self.entries
            .get(&format)
            .map(|e| e.capability.clone())
            .unwrap_or_else(|| Capability::Disabled("no adapter registered".to_owned()))
    }

    /// Turn a format off, e.g. to forbid spreadsheet input in a service.
    pub fn disable(&mut self, format: SourceFormat, reason: impl Into<String>) {
        self.entries.insert(
            format,
            Entry {
                capability: Capability::Disabled(reason.into()),
                opener: None,
            },
        );
    }

    /// Open `path` with the adapter for its format.
    pub fn open(&self, path: &Path, spec: &SourceSpec) -> RowpackResult<Box<dyn RowSource>> {
        let format = SourceFormat::resolve(path, spec)?;
        match self.entries.get(&format) {
            Some(Entry {
                opener: Some(open), ..
            }) => open(path, spec),
            _ => match self.capability(format) {
                Capability::Disabled(reason) => Err(RowpackError::CapabilityDisabled {
                    capability: format!("{format} source"),
                    reason,
                }),
                Capability::Available => Err(RowpackError::CapabilityDisabled {
                    capability: format!("{format} source"),
                    reason: "no adapter registered".to_owned(),
                }),
            },
        }
    }
}

/// Open `path` through the built-in registry.
pub fn open_source(path: impl AsRef<Path>, spec: &SourceSpec) -> RowpackResult<Box<dyn RowSource>> {
    SourceRegistry::builtin().open(path.as_ref(), spec)
}

/// Bytes behind a text adapter.
#[derive(Debug, Clone)]
pub(crate) enum TextInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl TextInput {
    pub(crate) fn open(&self) -> RowpackResult<Box<dyn Read + '_>> {
        Ok(match self {
            TextInput::Path(p) => Box::new(File::open(p)?),
            TextInput::Bytes(b) => Box::new(b.as_slice()),
        })
    }

    pub(crate) fn url(&self) -> Option<String> {
        match self {
            TextInput::Path(p) => Some(format!("file://{}", p.display())),
            TextInput::Bytes(_) => None,
        }
    }
}

/// Text adapters decode UTF-8 only; any other declared encoding is refused instead of being
/// recorded for bytes that were never decoded with it.
pub(crate) fn check_text_encoding(spec: &SourceSpec) -> RowpackResult<()> {
    match spec.encoding.as_deref() {
        None => Ok(()),
        Some(label) if is_utf8_label(label) => Ok(()),
        Some(label) => Err(RowpackError::encoding(format!(
            "cannot decode '{label}' text; only utf-8 (and its ascii subset) is supported"
        ))),
    }
}

fn is_utf8_label(label: &str) -> bool {
    matches!(
        label.trim().to_ascii_lowercase().as_str(),
        "utf-8" | "utf8" | "ascii" | "us-ascii"
    )
}

/// Display name for a path: its file name, else the whole path.
pub(crate) fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Text field to cell: trimmed, empty becomes null.
pub(crate) fn text_cell(raw: &str) -> Cell {
    let t = raw.trim();
    if t.is_empty() {
        Cell::Null
    } else {
        Cell::Str(t.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(SourceFormat::from_extension("CSV"), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::from_extension("xlsx"), Some(SourceFormat::Excel));
        assert_eq!(SourceFormat::from_extension("parquet"), None);
        assert!(SourceFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn only_utf8_encodings_are_accepted() {
        assert!(check_text_encoding(&SourceSpec::default()).is_ok());
        let mut spec = SourceSpec::default();
        spec.encoding = Some("UTF8".into());
        assert!(check_text_encoding(&spec).is_ok());
        spec.encoding = Some("latin-1".into());
        assert!(matches!(check_text_encoding(&spec), Err(RowpackError::Encoding { .. })));
        assert_eq!(SourceFormat::from_extension("rpk"), Some(SourceFormat::Container));
    }

    #[test]
    fn explicit_format_beats_extension() {
        let spec = SourceSpec::new().with_format(SourceFormat::Tsv);
        assert_eq!(
            SourceFormat::resolve(Path::new("a.csv"), &spec).unwrap(),
            SourceFormat::Tsv
        );
    }

    #[test]
    fn disabled_format_reports_capability_error() {
        let mut registry = SourceRegistry::builtin();
        registry.disable(SourceFormat::Csv, "not allowed here");
        assert_eq!(
            registry.capability(SourceFormat::Csv),
            Capability::Disabled("not allowed here".into())
        );
        let err = registry
            .open(Path::new("x.csv"), &SourceSpec::default())
            .err()
            .unwrap();
        assert!(matches!(err, RowpackError::CapabilityDisabled { .. }));
    }

    #[cfg(not(feature = "excel"))]
    #[test]
    fn excel_is_disabled_without_feature() {
        let err = open_source("book.xlsx", &SourceSpec::default()).err().unwrap();
        assert!(err.to_string().contains("excel"));
    }
}
