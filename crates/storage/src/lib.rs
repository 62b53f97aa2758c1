//! Strata Storage - storage-side interfaces consumed by the executor.
//!
//! This crate provides:
//!
//! - `HeapRelation` / `HeapScan`: physical-order access to row versions
//! - `MemoryHeap`: a paged in-memory heap relation
//! - `VisibilityOracle` / `MvccVisibility`: snapshot visibility of row versions
//! - `SpillStore` / `MemorySpill`: batch files for hash tables that outgrow memory
//!
//! # Example
//!
//! ```rust
//! use strata_core::{Row, RowShape, Snapshot, TxId, Value};
//! use strata_storage::{HeapRelation, MemoryHeap, MvccVisibility, ScanDirection, VisibilityOracle};
//!
//! let mut heap = MemoryHeap::new("t", RowShape::empty());
//! heap.insert(Row::new(vec![Value::Int64(1)]), TxId(1));
//! heap.insert(Row::new(vec![Value::Int64(2)]), TxId(5));
//!
//! let snapshot = Snapshot::new(TxId(3), TxId(4), vec![]);
//! let oracle = MvccVisibility::new();
//! let mut scan = heap.begin_scan(&snapshot, ScanDirection::Forward).unwrap();
//! let mut visible = 0;
//! while let Some(tuple) = scan.fetch_next(ScanDirection::Forward).unwrap() {
//!     if oracle.is_visible(&tuple, &snapshot) {
//!         visible += 1;
//!     }
//! }
//! assert_eq!(visible, 1);
//! ```

#![no_std]

extern crate alloc;

pub mod codec;
pub mod heap;
pub mod spill;
pub mod visibility;

pub use heap::{HeapRelation, HeapScan, HeapTuple, MemoryHeap, ScanDirection, ScanPosition, TupleHeader};
pub use spill::{MemorySpill, MemorySpillProvider, SpillProvider, SpillStore, SpilledTuple};
pub use visibility::{AllVisible, MvccVisibility, VisibilityOracle};
