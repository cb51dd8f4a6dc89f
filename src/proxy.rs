use std::collections::HashMap;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use crate::error::{RowpackError, RowpackResult};
use crate::types::Cell;

/// Column names shared by every proxy produced from one reader.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderIndex {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new(names: Vec<String>) -> Self {
        let mut by_name = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // First occurrence wins for duplicate names.
            by_name.entry(name.clone()).or_insert(i);
        }
        Self { names, by_name }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 0-based index of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

/// One data row addressable by 0-based index or by column name.
///
/// The proxy owns its values; mutating it never touches the container.
#[derive(Debug, Clone, PartialEq)]
pub struct RowProxy {
    headers: Arc<HeaderIndex>,
    values: Vec<Cell>,
}

impl RowProxy {
    pub fn new(headers: Arc<HeaderIndex>, values: Vec<Cell>) -> Self {
        Self { headers, values }
    }

    pub fn headers(&self) -> &[String] {
        self.headers.names()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.headers.position(name).and_then(|i| self.values.get(i))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Cell> {
        self.headers
            .position(name)
            .and_then(|i| self.values.get_mut(i))
    }

    /// Replace the value of a named column.
    pub fn set(&mut self, name: &str, value: impl Into<Cell>) -> RowpackResult<()> {
        match self.get_mut(name) {
            Some(cell) => {
                *cell = value.into();
                Ok(())
            }
            None => Err(RowpackError::ColumnNotFound {
                key: format!("named '{name}'"),
            }),
        }
    }

    pub fn row(&self) -> &[Cell] {
        &self.values
    }

    pub fn into_row(self) -> Vec<Cell> {
        self.values
    }

    /// `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.headers
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Index<usize> for RowProxy {
    type Output = Cell;

    fn index(&self, index: usize) -> &Cell {
        &self.values[index]
    }
}

impl IndexMut<usize> for RowProxy {
    fn index_mut(&mut self, index: usize) -> &mut Cell {
        &mut self.values[index]
    }
}

impl Index<&str> for RowProxy {
    type Output = Cell;

    fn index(&self, name: &str) -> &Cell {
        match self.get(name) {
            Some(cell) => cell,
            None => panic!("no column named '{name}'"),
        }
    }
}

impl IndexMut<&str> for RowProxy {
    fn index_mut(&mut self, name: &str) -> &mut Cell {
        match self.headers.position(name) {
            Some(i) if i < self.values.len() => &mut self.values[i],
            _ => panic!("no column named '{name}'"),
        }
    }
}
