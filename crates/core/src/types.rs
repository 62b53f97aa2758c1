//! Data type definitions.

/// Column data types understood by the executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
    /// Binary data
    Bytes,
}

impl DataType {
    /// Returns the stored width in bytes for fixed-width types.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            DataType::Boolean => Some(1),
            DataType::Int32 => Some(4),
            DataType::Int64 | DataType::Float64 => Some(8),
            DataType::String | DataType::Bytes => None,
        }
    }

    /// Returns a width estimate used when sizing hash tables ahead of a build.
    pub fn estimated_width(&self) -> usize {
        // Variable-width columns are assumed to be short strings.
        self.fixed_width().unwrap_or(32)
    }

    /// Returns the type name as it appears in plans and errors.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Int32 => "int4",
            DataType::Int64 => "int8",
            DataType::Float64 => "float8",
            DataType::String => "text",
            DataType::Bytes => "bytea",
        }
    }
}
