//! Strata Query - pull-based query execution.
//!
//! This crate provides the executor including:
//!
//! - `expr`: scalar expressions evaluated against rows and parameters
//! - `plan`: plan trees handed to the executor
//! - `context`: the execution context and its configuration
//! - `executor`: the node protocol, the node kinds (sequential scan, bitmap
//!   index scan with AND/OR, subquery scan, hash) and the driver
//!
//! # Example
//!
//! ```rust
//! use strata_core::{ColumnDesc, DataType, Row, RowShape, Snapshot, TxId, Value};
//! use strata_query::executor::{execute, ExecFlags};
//! use strata_query::{ExecContext, Expr, Plan};
//! use strata_storage::{AllVisible, MemoryHeap, ScanDirection};
//!
//! let shape = RowShape::new(vec![ColumnDesc::new("id", DataType::Int64)]);
//! let mut users = MemoryHeap::new("users", shape);
//! for id in 1..=5i64 {
//!     users.insert(Row::new(vec![Value::Int64(id)]), TxId(1));
//! }
//!
//! let plan = Plan::SeqScan {
//!     relation: &users,
//!     direction: ScanDirection::Forward,
//!     qual: Some(Expr::gt(Expr::column(0), Expr::literal(3i64))),
//! };
//! let snapshot = Snapshot::any();
//! let ctx = ExecContext::new(&snapshot, &AllVisible);
//! let output = execute(&plan, &ctx, ExecFlags::default()).unwrap();
//!
//! assert_eq!(output.rows.len(), 2);
//! assert_eq!(output.stats[0].instrumentation.rows_filtered, 3);
//! ```

#![no_std]

extern crate alloc;

pub mod context;
pub mod executor;
pub mod expr;
pub mod plan;

pub use context::{ExecConfig, ExecContext};
pub use executor::{execute, ExecFlags, ExecNode, NodeKind, NodeState, QueryOutput};
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use plan::{IndexQual, Plan};
