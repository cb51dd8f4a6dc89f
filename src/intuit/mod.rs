//! Heuristic inference over raw rows: where the header ends and data begins, and what type
//! each column holds.

pub(crate) mod parse;
pub mod rows;
pub mod types;

pub use rows::{RowClass, RowIntuiter, RowIntuition};
pub use types::{ColumnTypeReport, TypeCounts, TypeIntuiter, TypeReport};
