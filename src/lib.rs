//! `rowpack` normalizes messy tabular sources into a self-describing binary row container.
//!
//! A container stores every row of the source, titles and footnotes included, each tagged with
//! its original row number and a flag (`H` header, `D` data, `B` blank/ignored). Alongside the
//! rows it keeps a metadata document: provenance, the header/data boundary, a per-column schema
//! and per-column statistics.
//!
//! ## Loading a source
//!
//! The usual entrypoint is [`Container::load_path`] (or [`Container::load_rows`] for an
//! in-code [`source::RowSource`]). It finds the header rows and the first data row with the
//! [`intuit::RowIntuiter`], writes the container, then infers column types and statistics.
//!
//! ```no_run
//! use rowpack::RowStore;
//! use rowpack::config::SourceSpec;
//! use rowpack::load::LoadOptions;
//!
//! # fn main() -> Result<(), rowpack::RowpackError> {
//! let store = RowStore::local("data/packed");
//! let meta = store
//!     .container("rent.rpk")
//!     .load_path("rent.csv", &SourceSpec::default(), &LoadOptions::default())?;
//! println!("headers={:?} rows={}", meta.about.headers, meta.about.n_rows);
//! # Ok(())
//! # }
//! ```
//!
//! ## Writing and reading directly
//!
//! ```rust
//! use rowpack::{Cell, RowStore};
//!
//! # fn main() -> Result<(), rowpack::RowpackError> {
//! let store = RowStore::memory();
//! let container = store.container("people.rpk");
//!
//! let mut writer = container.writer()?;
//! writer.set_headers(&["name", "age"])?;
//! writer.insert_row(&[Cell::from("ada"), Cell::Int(36)])?;
//! writer.insert_row(&[Cell::from("alan"), Cell::Int(41)])?;
//! writer.finalize()?;
//!
//! let reader = container.reader()?;
//! let ages: Vec<i64> = reader
//!     .iter()?
//!     .map(|row| row.map(|r| r["age"].as_i64().unwrap_or(0)))
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(ages, vec![36, 41]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`storage`]: the filesystem abstraction, handle exclusivity and [`RowStore`]
//! - [`writer`], [`reader`], [`editor`]: container handles
//! - [`format`]: on-disk layout and the tagged binary codec
//! - [`meta`]: the metadata model and column views
//! - [`intuit`]: header/data boundary and column type inference
//! - [`stats`]: per-column statistics
//! - [`source`]: source adapters and the format capability table
//! - [`load`], [`observability`]: the load pipeline and its observers
//! - [`config`]: declarative source descriptions
//!
//! ## Cargo features
//!
//! - `excel`: spreadsheet sources through `calamine`
//! - `excel_test_writer`: Excel integration tests that generate workbooks at runtime

pub mod config;
pub mod container;
pub mod editor;
pub mod error;
pub mod format;
pub mod intuit;
pub mod load;
pub mod meta;
pub mod observability;
pub mod proxy;
pub mod reader;
pub mod source;
pub mod stats;
pub mod storage;
pub mod types;
pub mod writer;

pub use container::Container;
pub use error::{RowpackError, RowpackResult};
pub use meta::Metadata;
pub use storage::RowStore;
pub use types::{Cell, RowFlag, RowGroup, RowTag, ValueType};
