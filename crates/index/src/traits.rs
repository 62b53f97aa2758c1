//! Index access-method interface.
//!
//! An index that can answer a qualifier as a set of candidate TIDs implements
//! `BitmapIndex`. The executor's bitmap index scan calls into it once per
//! execution and never iterates the index row by row.

use crate::bitmap::TidBitmap;
use core::ops::Bound;
use strata_core::{Result, Value};

/// Comparison operator of an index qualifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanOp {
    /// key = argument
    Eq,
    /// key < argument
    Lt,
    /// key <= argument
    Le,
    /// key > argument
    Gt,
    /// key >= argument
    Ge,
}

impl ScanOp {
    /// Checks whether `key op argument` holds.
    pub fn matches(&self, key: &Value, argument: &Value) -> bool {
        match self {
            ScanOp::Eq => key == argument,
            ScanOp::Lt => key < argument,
            ScanOp::Le => key <= argument,
            ScanOp::Gt => key > argument,
            ScanOp::Ge => key >= argument,
        }
    }

    /// Returns the operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            ScanOp::Eq => "=",
            ScanOp::Lt => "<",
            ScanOp::Le => "<=",
            ScanOp::Gt => ">",
            ScanOp::Ge => ">=",
        }
    }
}

/// A single-column qualifier: `column op argument`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanKey {
    /// Column position in the indexed relation.
    pub column: usize,
    pub op: ScanOp,
    pub argument: Value,
}

impl ScanKey {
    /// Creates a scan key.
    pub fn new(column: usize, op: ScanOp, argument: impl Into<Value>) -> Self {
        Self {
            column,
            op,
            argument: argument.into(),
        }
    }

    /// Returns the key range this qualifier selects.
    ///
    /// Values of other types sort by type first, so a range over the whole
    /// ordered domain would also cover them; callers keep keys of one type.
    pub fn bounds(&self) -> (Bound<&Value>, Bound<&Value>) {
        let arg = &self.argument;
        match self.op {
            ScanOp::Eq => (Bound::Included(arg), Bound::Included(arg)),
            ScanOp::Lt => (Bound::Unbounded, Bound::Excluded(arg)),
            ScanOp::Le => (Bound::Unbounded, Bound::Included(arg)),
            ScanOp::Gt => (Bound::Excluded(arg), Bound::Unbounded),
            ScanOp::Ge => (Bound::Included(arg), Bound::Unbounded),
        }
    }

    /// Checks a key against the qualifier. NULL never matches.
    pub fn matches(&self, key: &Value) -> bool {
        !key.is_null() && !self.argument.is_null() && self.op.matches(key, &self.argument)
    }
}

/// Index that produces a candidate bitmap for a qualifier.
pub trait BitmapIndex {
    /// Returns the index name, used in diagnostics.
    fn name(&self) -> &str;

    /// Returns the indexed column position.
    fn key_column(&self) -> usize;

    /// Builds the candidate set for `key`.
    ///
    /// Implementations may return lossy pages; the consumer rechecks them.
    fn build_from_qualifier(&self, key: &ScanKey) -> Result<TidBitmap>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_op_matches() {
        let five = Value::Int64(5);
        assert!(ScanOp::Eq.matches(&Value::Int64(5), &five));
        assert!(ScanOp::Lt.matches(&Value::Int64(4), &five));
        assert!(!ScanOp::Lt.matches(&Value::Int64(5), &five));
        assert!(ScanOp::Le.matches(&Value::Int64(5), &five));
        assert!(ScanOp::Gt.matches(&Value::Int64(6), &five));
        assert!(ScanOp::Ge.matches(&Value::Int64(5), &five));
    }

    #[test]
    fn test_null_never_matches() {
        let key = ScanKey::new(0, ScanOp::Eq, Value::Null);
        assert!(!key.matches(&Value::Null));
        let key = ScanKey::new(0, ScanOp::Ge, 1i64);
        assert!(!key.matches(&Value::Null));
    }

    #[test]
    fn test_bounds() {
        let key = ScanKey::new(2, ScanOp::Gt, 10i64);
        assert_eq!(
            key.bounds(),
            (Bound::Excluded(&Value::Int64(10)), Bound::Unbounded)
        );
        assert_eq!(ScanOp::Ge.symbol(), ">=");
    }
}
