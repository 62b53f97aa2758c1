//! Output shape declarations.

use crate::types::DataType;
use alloc::string::String;
use alloc::vec::Vec;

/// One output column: its name and type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDesc {
    /// Column name as seen by the consumer.
    pub name: String,
    /// Column data type.
    pub data_type: DataType,
}

impl ColumnDesc {
    /// Creates a column descriptor.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// The ordered column list a node produces.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowShape {
    columns: Vec<ColumnDesc>,
}

impl RowShape {
    /// Creates a shape from column descriptors.
    pub fn new(columns: Vec<ColumnDesc>) -> Self {
        Self { columns }
    }

    /// A shape with no columns, declared by nodes that produce no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the columns in output order.
    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the shape has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Finds a column position by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Returns the same column types under new names.
    ///
    /// Missing names keep the original column name.
    pub fn renamed<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| match names.get(i) {
                Some(name) => ColumnDesc::new(name.as_ref(), col.data_type),
                None => col.clone(),
            })
            .collect();
        Self { columns }
    }

    /// Estimated width of one row of this shape, in bytes.
    pub fn estimated_width(&self) -> usize {
        self.columns.iter().map(|c| c.data_type.estimated_width()).sum()
    }
}
