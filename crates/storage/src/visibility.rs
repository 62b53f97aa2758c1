//! Row-version visibility.
//!
//! Executor nodes ask a `VisibilityOracle` whether a fetched row version is
//! visible under the query's snapshot and skip it otherwise. `MvccVisibility`
//! applies the usual insert/delete stamp rules against a snapshot and a set
//! of aborted transactions.

use crate::heap::HeapTuple;
use hashbrown::HashSet;
use strata_core::{Snapshot, TxId};

/// Decides whether a row version is visible under a snapshot.
pub trait VisibilityOracle {
    fn is_visible(&self, tuple: &HeapTuple, snapshot: &Snapshot) -> bool;
}

impl<F> VisibilityOracle for F
where
    F: Fn(&HeapTuple, &Snapshot) -> bool,
{
    fn is_visible(&self, tuple: &HeapTuple, snapshot: &Snapshot) -> bool {
        self(tuple, snapshot)
    }
}

/// Oracle under which every row version is visible.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllVisible;

impl VisibilityOracle for AllVisible {
    fn is_visible(&self, _tuple: &HeapTuple, _snapshot: &Snapshot) -> bool {
        true
    }
}

/// Snapshot visibility over insert/delete stamps.
///
/// A transaction that finished before the snapshot counts as committed unless
/// it is recorded as aborted.
#[derive(Clone, Debug, Default)]
pub struct MvccVisibility {
    aborted: HashSet<TxId>,
}

impl MvccVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a transaction as aborted.
    pub fn mark_aborted(&mut self, txid: TxId) {
        self.aborted.insert(txid);
    }

    /// Returns true if `txid` is recorded as aborted.
    pub fn is_aborted(&self, txid: TxId) -> bool {
        self.aborted.contains(&txid)
    }

    fn committed_before(&self, txid: TxId, snapshot: &Snapshot) -> bool {
        !self.is_aborted(txid) && snapshot.saw_finished(txid)
    }
}

impl VisibilityOracle for MvccVisibility {
    fn is_visible(&self, tuple: &HeapTuple, snapshot: &Snapshot) -> bool {
        if snapshot.is_any() {
            return true;
        }
        let header = &tuple.header;
        let own = |txid: TxId| !txid.is_invalid() && txid == snapshot.current_txid;

        // Inserted by ourselves, or committed before the snapshot.
        if !own(header.xmin) && !self.committed_before(header.xmin, snapshot) {
            return false;
        }

        if header.xmax.is_invalid() {
            return true;
        }
        if own(header.xmax) {
            return false;
        }
        // A delete counts only once it committed before the snapshot.
        !self.committed_before(header.xmax, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::TupleHeader;
    use alloc::sync::Arc;
    use alloc::vec;
    use strata_core::{Row, Tid};

    fn tuple(xmin: u64, xmax: u64) -> HeapTuple {
        HeapTuple {
            tid: Tid::new(0, 1),
            header: TupleHeader {
                xmin: TxId(xmin),
                xmax: TxId(xmax),
            },
            row: Arc::new(Row::empty()),
        }
    }

    fn snapshot() -> Snapshot {
        // 10..20 window with 12 still running.
        Snapshot::new(TxId(10), TxId(20), vec![TxId(12)])
    }

    #[test]
    fn test_insert_visibility() {
        let oracle = MvccVisibility::new();
        let snap = snapshot();
        assert!(oracle.is_visible(&tuple(5, 0), &snap));
        assert!(oracle.is_visible(&tuple(11, 0), &snap));
        assert!(!oracle.is_visible(&tuple(12, 0), &snap));
        assert!(!oracle.is_visible(&tuple(25, 0), &snap));
    }

    #[test]
    fn test_delete_visibility() {
        let oracle = MvccVisibility::new();
        let snap = snapshot();
        assert!(!oracle.is_visible(&tuple(5, 6), &snap));
        // Deleter still running or started later: row still visible.
        assert!(oracle.is_visible(&tuple(5, 12), &snap));
        assert!(oracle.is_visible(&tuple(5, 30), &snap));
    }

    #[test]
    fn test_aborted_transactions() {
        let mut oracle = MvccVisibility::new();
        oracle.mark_aborted(TxId(6));
        oracle.mark_aborted(TxId(7));
        let snap = snapshot();
        assert!(!oracle.is_visible(&tuple(6, 0), &snap));
        assert!(oracle.is_visible(&tuple(5, 7), &snap));
    }

    #[test]
    fn test_own_changes() {
        let oracle = MvccVisibility::new();
        let snap = snapshot().with_current(TxId(12));
        assert!(oracle.is_visible(&tuple(12, 0), &snap));
        assert!(!oracle.is_visible(&tuple(5, 12), &snap));
    }

    #[test]
    fn test_any_snapshot_and_closures() {
        let oracle = MvccVisibility::new();
        assert!(oracle.is_visible(&tuple(99, 0), &Snapshot::any()));
        assert!(AllVisible.is_visible(&tuple(99, 0), &snapshot()));

        let odd_offsets = |t: &HeapTuple, _: &Snapshot| t.tid.offset() % 2 == 1;
        assert!(odd_offsets.is_visible(&tuple(1, 0), &snapshot()));
    }
}
