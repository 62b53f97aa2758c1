//! MVCC snapshots.
//!
//! A snapshot records which transactions had committed when it was taken:
//! everything below `xmin` is settled, nothing at or above `xmax` is visible,
//! and transactions listed in `xip` were still running.

use alloc::vec::Vec;
use core::fmt;

/// Transaction identifier. Zero is reserved as "invalid".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TxId(pub u64);

impl TxId {
    /// The invalid transaction id, used for "never deleted".
    pub const INVALID: TxId = TxId(0);

    /// Returns true if this is the invalid id.
    #[inline]
    pub fn is_invalid(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point-in-time visibility rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Oldest transaction still running when the snapshot was taken.
    pub xmin: TxId,
    /// First transaction id not yet assigned when the snapshot was taken.
    pub xmax: TxId,
    /// Transactions in progress at snapshot time, sorted.
    xip: Vec<TxId>,
    /// The transaction reading under this snapshot, if any.
    pub current_txid: TxId,
    /// Sees every row version regardless of transaction status.
    any: bool,
}

impl Snapshot {
    /// Creates a snapshot from its bounds and in-progress list.
    pub fn new(xmin: TxId, xmax: TxId, mut xip: Vec<TxId>) -> Self {
        xip.sort_unstable();
        xip.dedup();
        Self {
            xmin,
            xmax,
            xip,
            current_txid: TxId::INVALID,
            any: false,
        }
    }

    /// A snapshot that treats every row version as visible.
    pub fn any() -> Self {
        Self {
            xmin: TxId::INVALID,
            xmax: TxId(u64::MAX),
            xip: Vec::new(),
            current_txid: TxId::INVALID,
            any: true,
        }
    }

    /// Sets the transaction that reads under this snapshot.
    pub fn with_current(mut self, txid: TxId) -> Self {
        self.current_txid = txid;
        self
    }

    /// Returns true for the see-everything snapshot.
    #[inline]
    pub fn is_any(&self) -> bool {
        self.any
    }

    /// Returns the in-progress transaction list.
    pub fn in_progress(&self) -> &[TxId] {
        &self.xip
    }

    /// Returns true if `txid` was running when the snapshot was taken.
    pub fn is_in_progress(&self, txid: TxId) -> bool {
        self.xip.binary_search(&txid).is_ok()
    }

    /// Returns true if `txid` had finished before the snapshot was taken.
    ///
    /// Whether it committed or aborted is the caller's concern.
    pub fn saw_finished(&self, txid: TxId) -> bool {
        if txid >= self.xmax {
            return false;
        }
        if txid < self.xmin {
            return true;
        }
        !self.is_in_progress(txid)
    }
}
