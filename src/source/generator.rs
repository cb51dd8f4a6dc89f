use std::fmt;

use crate::error::RowpackResult;
use crate::source::{RowIter, RowSource};
use crate::types::Cell;

type RowFactory = Box<dyn FnMut() -> Box<dyn Iterator<Item = Vec<Cell>>>>;

/// Rows produced in code, by a closure that starts a fresh iterator for every pass.
pub struct GeneratorSource {
    name: String,
    factory: RowFactory,
}

impl fmt::Debug for GeneratorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorSource")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl GeneratorSource {
    pub fn new<F, I>(name: impl Into<String>, mut factory: F) -> Self
    where
        F: FnMut() -> I + 'static,
        I: IntoIterator<Item = Vec<Cell>>,
        I::IntoIter: 'static,
    {
        Self {
            name: name.into(),
            factory: Box::new(move || Box::new(factory().into_iter())),
        }
    }

    /// Rows held in memory.
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self::new(name, move || rows.clone())
    }
}

impl RowSource for GeneratorSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn rows(&mut self) -> RowpackResult<RowIter<'_>> {
        Ok(Box::new((self.factory)().map(Ok)))
    }
}
