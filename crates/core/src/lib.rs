//! Strata Core - foundational types shared by the Strata execution engine.
//!
//! - `Tid`: physical row-version locator (block number, in-block offset)
//! - `DataType` / `Value`: runtime values that flow through executor nodes
//! - `Row`: a row of values
//! - `RowShape` / `ColumnDesc`: the declared output shape of a node
//! - `TupleSlot`: carrier for one row, borrowed from storage or owned
//! - `Snapshot` / `TxId`: the visibility rule a scan runs under
//! - `Error`: error taxonomy shared by every crate in the workspace
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use strata_core::{Row, Tid, TupleSlot, Value};
//!
//! let row = Arc::new(Row::new(vec![Value::Int64(1), Value::String("Alice".into())]));
//! let mut slot = TupleSlot::new();
//! slot.store_borrowed(Tid::new(0, 1), row);
//!
//! assert!(slot.is_borrowed());
//! assert_eq!(slot.row().and_then(|r| r.get(1)), Some(&Value::String("Alice".into())));
//!
//! slot.materialize();
//! assert!(!slot.is_borrowed());
//! ```

#![no_std]

extern crate alloc;

mod error;
mod row;
mod shape;
mod slot;
mod snapshot;
mod tid;
mod types;
mod value;

pub use error::{Error, Result};
pub use row::Row;
pub use shape::{ColumnDesc, RowShape};
pub use slot::{SlotContents, TupleSlot};
pub use snapshot::{Snapshot, TxId};
pub use tid::{BlockNumber, OffsetNumber, Tid, MAX_TUPLES_PER_PAGE};
pub use types::DataType;
pub use value::Value;
