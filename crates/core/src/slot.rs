//! Tuple slots.
//!
//! A `TupleSlot` carries the current row of an executor node. Its contents are
//! either borrowed from the storage layer (a shared handle to the stored row,
//! pinned only until the producing node is asked for its next row) or owned by
//! the slot after being built or materialized by a node.
//!
//! Nodes hand slots out as `&TupleSlot` tied to `&mut self`, so a consumer
//! cannot hold a borrowed row across the next fetch.

use crate::row::Row;
use crate::tid::Tid;
use alloc::sync::Arc;

/// What a slot currently holds.
#[derive(Clone, Debug, Default)]
pub enum SlotContents {
    /// No row.
    #[default]
    Empty,
    /// Row data owned by the storage layer.
    Borrowed(Arc<Row>),
    /// Row data owned by the slot.
    Owned(Row),
}

/// Carrier for one row's data.
#[derive(Clone, Debug, Default)]
pub struct TupleSlot {
    /// Physical location of the row, when it came from a base relation.
    tid: Option<Tid>,
    contents: SlotContents,
}

impl TupleSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a row borrowed from storage, replacing the previous contents.
    pub fn store_borrowed(&mut self, tid: Tid, row: Arc<Row>) {
        self.tid = Some(tid);
        self.contents = SlotContents::Borrowed(row);
    }

    /// Stores a row owned by the slot, replacing the previous contents.
    pub fn store_owned(&mut self, tid: Option<Tid>, row: Row) {
        self.tid = tid;
        self.contents = SlotContents::Owned(row);
    }

    /// Empties the slot, releasing any borrowed row.
    pub fn clear(&mut self) {
        self.tid = None;
        self.contents = SlotContents::Empty;
    }

    /// Returns true if the slot holds no row.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self.contents, SlotContents::Empty)
    }

    /// Returns true if the slot references storage-owned data.
    #[inline]
    pub fn is_borrowed(&self) -> bool {
        matches!(self.contents, SlotContents::Borrowed(_))
    }

    /// Returns the tuple identifier of the row, if it has one.
    #[inline]
    pub fn tid(&self) -> Option<Tid> {
        self.tid
    }

    /// Returns the slot contents.
    pub fn contents(&self) -> &SlotContents {
        &self.contents
    }

    /// Returns the current row.
    #[inline]
    pub fn row(&self) -> Option<&Row> {
        match &self.contents {
            SlotContents::Empty => None,
            SlotContents::Borrowed(row) => Some(row.as_ref()),
            SlotContents::Owned(row) => Some(row),
        }
    }

    /// Copies borrowed contents into slot-owned memory.
    ///
    /// Owned and empty slots are left untouched.
    pub fn materialize(&mut self) {
        if let SlotContents::Borrowed(row) = &self.contents {
            let owned = Row::clone(row);
            self.contents = SlotContents::Owned(owned);
        }
    }

    /// Returns an owned copy of the current row.
    pub fn to_row(&self) -> Option<Row> {
        self.row().cloned()
    }
}
