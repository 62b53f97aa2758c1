//! Per-node execution counters.

/// Counters a node accumulates across its lifetime. They survive `end` so a
/// caller can read them after execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Instrumentation {
    /// Number of init and rescan calls.
    pub loops: u64,
    /// Rows returned from `next`.
    pub rows_out: u64,
    /// Row versions fetched from storage.
    pub tuples_fetched: u64,
    /// Fetched row versions skipped as invisible.
    pub rows_invisible: u64,
    /// Visible rows removed by a filter.
    pub rows_filtered: u64,
    /// Distinct blocks read by the scan handle.
    pub blocks_read: u64,
    /// Calls into an index access method.
    pub index_calls: u64,
    /// Exact blocks in the last bitmap produced.
    pub exact_blocks: u64,
    /// Lossy blocks in the last bitmap produced.
    pub lossy_blocks: u64,
    /// Hash-table batch count.
    pub batches: u64,
    /// Rows written to spill files.
    pub spilled_tuples: u64,
    /// Bytes written to spill files.
    pub spill_bytes: u64,
    /// Peak resident hash-table memory, in bytes.
    pub peak_memory: u64,
}
