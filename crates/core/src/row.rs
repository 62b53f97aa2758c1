//! Row structure.
//!
//! A `Row` is the materialized column values of one tuple. Rows held by the
//! storage layer are shared as `Arc<Row>`; rows built by executor nodes are owned.

use crate::value::Value;
use alloc::vec::Vec;

/// Fixed per-row overhead used in memory accounting.
const ROW_OVERHEAD: usize = core::mem::size_of::<Vec<Value>>();

/// A row of values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Row {
    /// Values stored in this row, indexed by column position.
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row with the given values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Creates a row with no columns.
    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row and returns its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Gets a value at the given column index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the number of values in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns an estimate of the memory this row occupies, in bytes.
    pub fn estimated_size(&self) -> usize {
        ROW_OVERHEAD + self.values.iter().map(Value::estimated_size).sum::<usize>()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
