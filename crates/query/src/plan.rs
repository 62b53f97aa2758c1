//! Plan trees handed to the executor.
//!
//! A `Plan` names the node kinds and their parameters; relations and indexes
//! are borrowed from the caller for the lifetime of execution.

use crate::expr::Expr;
use alloc::boxed::Box;
use alloc::vec::Vec;
use strata_core::RowShape;
use strata_index::{BitmapIndex, ScanOp};
use strata_storage::{HeapRelation, ScanDirection};

/// Indexed search condition of a bitmap index scan.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexQual {
    /// `column op arg`
    Compare { column: usize, op: ScanOp, arg: Expr },
    /// `column = ANY(args)`
    InList { column: usize, args: Vec<Expr> },
}

impl IndexQual {
    /// Returns the indexed column the qualifier references.
    pub fn column(&self) -> usize {
        match self {
            IndexQual::Compare { column, .. } | IndexQual::InList { column, .. } => *column,
        }
    }

    /// Returns the argument expressions.
    pub fn args(&self) -> &[Expr] {
        match self {
            IndexQual::Compare { arg, .. } => core::slice::from_ref(arg),
            IndexQual::InList { args, .. } => args,
        }
    }

    /// Returns the comparison operator.
    pub fn op(&self) -> ScanOp {
        match self {
            IndexQual::Compare { op, .. } => *op,
            IndexQual::InList { .. } => ScanOp::Eq,
        }
    }
}

/// Physical plan tree.
#[derive(Clone)]
pub enum Plan<'a> {
    /// Full scan of a heap relation in physical order.
    SeqScan {
        relation: &'a dyn HeapRelation,
        direction: ScanDirection,
        qual: Option<Expr>,
    },
    /// Candidate bitmap from one index qualifier.
    BitmapIndexScan {
        index: &'a dyn BitmapIndex,
        qual: IndexQual,
    },
    /// Intersection of bitmap-producing children.
    BitmapAnd(Vec<Plan<'a>>),
    /// Union of bitmap-producing children.
    BitmapOr(Vec<Plan<'a>>),
    /// Child rows re-exposed under a declared shape.
    SubqueryScan {
        input: Box<Plan<'a>>,
        projection: Option<Vec<Expr>>,
        shape: RowShape,
    },
    /// Hash table built from the child's rows.
    Hash {
        input: Box<Plan<'a>>,
        keys: Vec<Expr>,
        keep_nulls: bool,
        estimated_rows: usize,
    },
}

impl<'a> Plan<'a> {
    /// Forward sequential scan without a filter.
    pub fn seq_scan(relation: &'a dyn HeapRelation) -> Self {
        Plan::SeqScan {
            relation,
            direction: ScanDirection::Forward,
            qual: None,
        }
    }

    pub fn bitmap_index_scan(index: &'a dyn BitmapIndex, qual: IndexQual) -> Self {
        Plan::BitmapIndexScan { index, qual }
    }

    pub fn subquery_scan(input: Plan<'a>, projection: Option<Vec<Expr>>, shape: RowShape) -> Self {
        Plan::SubqueryScan {
            input: Box::new(input),
            projection,
            shape,
        }
    }

    pub fn hash(input: Plan<'a>, keys: Vec<Expr>) -> Self {
        Plan::Hash {
            input: Box::new(input),
            keys,
            keep_nulls: false,
            estimated_rows: 0,
        }
    }

    /// Returns true for plans whose node produces a bitmap.
    pub fn produces_bitmap(&self) -> bool {
        matches!(
            self,
            Plan::BitmapIndexScan { .. } | Plan::BitmapAnd(_) | Plan::BitmapOr(_)
        )
    }
}
