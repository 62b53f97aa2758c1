//! Heap relations and scans.
//!
//! `HeapRelation` is the storage-side surface a sequential scan consumes: it
//! opens a `HeapScan` that hands back row versions with their TIDs in physical
//! order, in either direction. `MemoryHeap` is a paged in-memory relation
//! implementing it.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use strata_core::{
    BlockNumber, Error, OffsetNumber, Result, Row, RowShape, Snapshot, Tid, TxId,
    MAX_TUPLES_PER_PAGE,
};

/// Transaction stamps of one row version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TupleHeader {
    /// Inserting transaction.
    pub xmin: TxId,
    /// Deleting transaction, `TxId::INVALID` while live.
    pub xmax: TxId,
}

impl TupleHeader {
    /// Header of a row version inserted by `xmin` and never deleted.
    pub fn inserted_by(xmin: TxId) -> Self {
        Self {
            xmin,
            xmax: TxId::INVALID,
        }
    }
}

/// A row version as returned by a heap scan.
#[derive(Clone, Debug, PartialEq)]
pub struct HeapTuple {
    pub tid: Tid,
    pub header: TupleHeader,
    /// Shared handle to the stored row data.
    pub row: Arc<Row>,
}

/// Physical scan direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanDirection {
    #[default]
    Forward,
    Backward,
}

impl ScanDirection {
    /// Returns the opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            ScanDirection::Forward => ScanDirection::Backward,
            ScanDirection::Backward => ScanDirection::Forward,
        }
    }
}

/// A saved scan position, produced by `HeapScan::mark`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanPosition {
    /// Before the first row version.
    BeforeStart,
    /// On the row version with this TID.
    At(Tid),
    /// After the last row version.
    AfterEnd,
}

/// A relation whose row versions can be scanned in physical order.
pub trait HeapRelation {
    /// Returns the relation name.
    fn name(&self) -> &str;

    /// Returns the shape of stored rows.
    fn shape(&self) -> &RowShape;

    /// Returns true if scans opened on this relation support mark/restore.
    fn supports_positioning(&self) -> bool {
        false
    }

    /// Opens a scan positioned before the first row (forward) or after the
    /// last row (backward).
    fn begin_scan<'r>(
        &'r self,
        snapshot: &Snapshot,
        direction: ScanDirection,
    ) -> Result<Box<dyn HeapScan + 'r>>;
}

/// An open scan over a heap relation.
pub trait HeapScan {
    /// Returns the next row version in `direction`, or None at the end.
    ///
    /// Row versions are returned regardless of visibility.
    fn fetch_next(&mut self, direction: ScanDirection) -> Result<Option<HeapTuple>>;

    /// Repositions the scan to its starting point without reopening it.
    fn rescan(&mut self) -> Result<()>;

    /// Returns the current position.
    fn mark(&self) -> Result<ScanPosition> {
        Err(Error::storage("scan does not support positioning"))
    }

    /// Returns to a position produced by `mark`.
    fn restore(&mut self, position: ScanPosition) -> Result<()> {
        let _ = position;
        Err(Error::storage("scan does not support positioning"))
    }

    /// Returns the number of distinct blocks visited so far.
    fn blocks_read(&self) -> u64;
}

/// Paged in-memory heap relation.
#[derive(Debug)]
pub struct MemoryHeap {
    name: String,
    shape: RowShape,
    tuples_per_page: usize,
    positioning: bool,
    pages: BTreeMap<BlockNumber, Vec<Option<HeapTuple>>>,
    live: usize,
}

impl MemoryHeap {
    /// Creates an empty heap.
    pub fn new(name: impl Into<String>, shape: RowShape) -> Self {
        Self {
            name: name.into(),
            shape,
            tuples_per_page: MAX_TUPLES_PER_PAGE,
            positioning: true,
            pages: BTreeMap::new(),
            live: 0,
        }
    }

    /// Sets how many row versions `insert` places on each page.
    pub fn with_tuples_per_page(mut self, tuples_per_page: usize) -> Self {
        self.tuples_per_page = tuples_per_page.clamp(1, MAX_TUPLES_PER_PAGE);
        self
    }

    /// Enables or disables mark/restore support on scans.
    pub fn with_positioning(mut self, positioning: bool) -> Self {
        self.positioning = positioning;
        self
    }

    /// Appends a row version inserted by `xmin`, returning its TID.
    pub fn insert(&mut self, row: Row, xmin: TxId) -> Tid {
        let (block, offset) = match self.pages.iter().next_back() {
            Some((&block, slots)) if slots.len() < self.tuples_per_page => {
                (block, slots.len() as OffsetNumber + 1)
            }
            Some((&block, _)) => (block + 1, 1),
            None => (0, 1),
        };
        let tid = Tid::new(block, offset);
        self.place(tid, TupleHeader::inserted_by(xmin), row);
        tid
    }

    /// Places a row version at a specific TID.
    pub fn insert_at(&mut self, tid: Tid, header: TupleHeader, row: Row) -> Result<()> {
        if !tid.is_valid() || tid.offset() as usize > MAX_TUPLES_PER_PAGE {
            return Err(Error::storage(format!("invalid tuple location {}", tid)));
        }
        if self.get(tid).is_some() {
            return Err(Error::storage(format!("tuple {} already exists", tid)));
        }
        self.place(tid, header, row);
        Ok(())
    }

    /// Stamps a row version as deleted by `xmax`.
    pub fn delete(&mut self, tid: Tid, xmax: TxId) -> Result<()> {
        let slot = self
            .pages
            .get_mut(&tid.block())
            .and_then(|slots| slots.get_mut((tid.offset() as usize).checked_sub(1)?))
            .and_then(|slot| slot.as_mut());
        match slot {
            Some(tuple) => {
                tuple.header.xmax = xmax;
                Ok(())
            }
            None => Err(Error::storage(format!("tuple {} not found", tid))),
        }
    }

    /// Returns the row version at `tid`.
    pub fn get(&self, tid: Tid) -> Option<&HeapTuple> {
        if !tid.is_valid() {
            return None;
        }
        self.pages
            .get(&tid.block())?
            .get(tid.offset() as usize - 1)?
            .as_ref()
    }

    /// Returns the number of stored row versions.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if the heap stores nothing.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns the number of allocated pages.
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    fn place(&mut self, tid: Tid, header: TupleHeader, row: Row) {
        let slots = self.pages.entry(tid.block()).or_default();
        let idx = tid.offset() as usize - 1;
        if slots.len() <= idx {
            slots.resize(idx + 1, None);
        }
        slots[idx] = Some(HeapTuple {
            tid,
            header,
            row: Arc::new(row),
        });
        self.live += 1;
    }
}

impl HeapRelation for MemoryHeap {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> &RowShape {
        &self.shape
    }

    fn supports_positioning(&self) -> bool {
        self.positioning
    }

    fn begin_scan<'r>(
        &'r self,
        _snapshot: &Snapshot,
        direction: ScanDirection,
    ) -> Result<Box<dyn HeapScan + 'r>> {
        let locations: Vec<Tid> = self
            .pages
            .values()
            .flat_map(|slots| slots.iter().flatten().map(|t| t.tid))
            .collect();
        tracing::trace!(relation = %self.name, tuples = locations.len(), "begin heap scan");
        let mut scan = MemoryHeapScan {
            heap: self,
            locations,
            start: direction,
            cursor: Cursor::BeforeStart,
            last_block: None,
            blocks_read: 0,
        };
        scan.reset();
        Ok(Box::new(scan))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cursor {
    BeforeStart,
    At(usize),
    AfterEnd,
}

/// Bidirectional cursor over a `MemoryHeap`.
struct MemoryHeapScan<'r> {
    heap: &'r MemoryHeap,
    /// TIDs of the row versions present when the scan was opened.
    locations: Vec<Tid>,
    start: ScanDirection,
    cursor: Cursor,
    last_block: Option<BlockNumber>,
    blocks_read: u64,
}

impl MemoryHeapScan<'_> {
    fn reset(&mut self) {
        self.cursor = match self.start {
            ScanDirection::Forward => Cursor::BeforeStart,
            ScanDirection::Backward => Cursor::AfterEnd,
        };
    }

    fn step(&self, direction: ScanDirection) -> Cursor {
        let len = self.locations.len();
        match (self.cursor, direction) {
            (Cursor::BeforeStart, ScanDirection::Forward) if len > 0 => Cursor::At(0),
            (Cursor::BeforeStart, _) => Cursor::BeforeStart,
            (Cursor::AfterEnd, ScanDirection::Backward) if len > 0 => Cursor::At(len - 1),
            (Cursor::AfterEnd, _) => Cursor::AfterEnd,
            (Cursor::At(i), ScanDirection::Forward) if i + 1 < len => Cursor::At(i + 1),
            (Cursor::At(_), ScanDirection::Forward) => Cursor::AfterEnd,
            (Cursor::At(0), ScanDirection::Backward) => Cursor::BeforeStart,
            (Cursor::At(i), ScanDirection::Backward) => Cursor::At(i - 1),
        }
    }
}

impl HeapScan for MemoryHeapScan<'_> {
    fn fetch_next(&mut self, direction: ScanDirection) -> Result<Option<HeapTuple>> {
        self.cursor = self.step(direction);
        let Cursor::At(i) = self.cursor else {
            return Ok(None);
        };
        let tid = self.locations[i];
        let tuple = self
            .heap
            .get(tid)
            .ok_or_else(|| Error::storage(format!("tuple {} vanished during scan", tid)))?;
        if self.last_block != Some(tid.block()) {
            self.last_block = Some(tid.block());
            self.blocks_read += 1;
        }
        Ok(Some(tuple.clone()))
    }

    fn rescan(&mut self) -> Result<()> {
        self.reset();
        self.last_block = None;
        Ok(())
    }

    fn mark(&self) -> Result<ScanPosition> {
        if !self.heap.positioning {
            return Err(Error::storage("scan does not support positioning"));
        }
        Ok(match self.cursor {
            Cursor::BeforeStart => ScanPosition::BeforeStart,
            Cursor::At(i) => ScanPosition::At(self.locations[i]),
            Cursor::AfterEnd => ScanPosition::AfterEnd,
        })
    }

    fn restore(&mut self, position: ScanPosition) -> Result<()> {
        if !self.heap.positioning {
            return Err(Error::storage("scan does not support positioning"));
        }
        self.cursor = match position {
            ScanPosition::BeforeStart => Cursor::BeforeStart,
            ScanPosition::AfterEnd => Cursor::AfterEnd,
            ScanPosition::At(tid) => match self.locations.binary_search(&tid) {
                Ok(i) => Cursor::At(i),
                Err(_) => {
                    return Err(Error::storage(format!("cannot restore to unknown tuple {}", tid)))
                }
            },
        };
        Ok(())
    }

    fn blocks_read(&self) -> u64 {
        self.blocks_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use strata_core::{ColumnDesc, DataType, Value};

    fn heap_of(n: i64) -> MemoryHeap {
        let shape = RowShape::new(vec![ColumnDesc::new("a", DataType::Int64)]);
        let mut heap = MemoryHeap::new("t", shape).with_tuples_per_page(2);
        for i in 1..=n {
            heap.insert(Row::new(vec![Value::Int64(i)]), TxId(1));
        }
        heap
    }

    fn drain(scan: &mut dyn HeapScan, direction: ScanDirection) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(t) = scan.fetch_next(direction).unwrap() {
            out.push(t.row.get(0).and_then(Value::as_i64).unwrap());
        }
        out
    }

    #[test]
    fn test_insert_fills_pages() {
        let heap = heap_of(5);
        assert_eq!(heap.len(), 5);
        assert_eq!(heap.num_pages(), 3);
        assert!(heap.get(Tid::new(1, 2)).is_some());
        assert!(heap.get(Tid::new(2, 2)).is_none());
        assert!(heap.get(Tid::new(0, 0)).is_none());
    }

    #[test]
    fn test_forward_and_backward_scan() {
        let heap = heap_of(5);
        let snap = Snapshot::any();
        let mut fwd = heap.begin_scan(&snap, ScanDirection::Forward).unwrap();
        assert_eq!(drain(fwd.as_mut(), ScanDirection::Forward), vec![1, 2, 3, 4, 5]);
        assert_eq!(fwd.blocks_read(), 3);
        // Exhausted scans stay exhausted.
        assert!(fwd.fetch_next(ScanDirection::Forward).unwrap().is_none());

        let mut bwd = heap.begin_scan(&snap, ScanDirection::Backward).unwrap();
        assert_eq!(drain(bwd.as_mut(), ScanDirection::Backward), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_rescan_restarts() {
        let heap = heap_of(3);
        let snap = Snapshot::any();
        let mut scan = heap.begin_scan(&snap, ScanDirection::Forward).unwrap();
        scan.fetch_next(ScanDirection::Forward).unwrap();
        scan.rescan().unwrap();
        assert_eq!(drain(scan.as_mut(), ScanDirection::Forward), vec![1, 2, 3]);
    }

    #[test]
    fn test_mark_restore() {
        let heap = heap_of(4);
        let snap = Snapshot::any();
        let mut scan = heap.begin_scan(&snap, ScanDirection::Forward).unwrap();
        scan.fetch_next(ScanDirection::Forward).unwrap();
        scan.fetch_next(ScanDirection::Forward).unwrap();
        let mark = scan.mark().unwrap();
        assert_eq!(mark, ScanPosition::At(Tid::new(0, 2)));
        assert_eq!(drain(scan.as_mut(), ScanDirection::Forward), vec![3, 4]);
        scan.restore(mark).unwrap();
        assert_eq!(drain(scan.as_mut(), ScanDirection::Forward), vec![3, 4]);
    }

    #[test]
    fn test_positioning_can_be_disabled() {
        let heap = heap_of(1).with_positioning(false);
        assert!(!heap.supports_positioning());
        let snap = Snapshot::any();
        let scan = heap.begin_scan(&snap, ScanDirection::Forward).unwrap();
        assert!(matches!(scan.mark(), Err(Error::Storage { .. })));
    }

    #[test]
    fn test_insert_at_and_delete() {
        let mut heap = MemoryHeap::new("t", RowShape::empty());
        let tid = Tid::new(4, 3);
        heap.insert_at(tid, TupleHeader::inserted_by(TxId(2)), Row::empty()).unwrap();
        assert!(heap.insert_at(tid, TupleHeader::default(), Row::empty()).is_err());
        assert!(heap.insert_at(Tid::new(0, 0), TupleHeader::default(), Row::empty()).is_err());

        heap.delete(tid, TxId(3)).unwrap();
        assert_eq!(heap.get(tid).unwrap().header.xmax, TxId(3));
        assert!(heap.delete(Tid::new(4, 1), TxId(3)).is_err());

        // Next appended row follows the highest block.
        assert_eq!(heap.insert(Row::empty(), TxId(2)), Tid::new(4, 4));
    }
}
