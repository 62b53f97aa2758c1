//! Hash node.
//!
//! Drains its child into a `HashTable` keyed by the hash of the key
//! expressions. The node emits no rows of its own: `next` builds the table
//! and reports end-of-data, and a probing consumer uses `build`, `lookup`,
//! `hash_probe_row` and `load_batch`.

mod table;

pub use table::{HashLookup, HashTable, HashTableConfig, KeyHasher};

use super::node::ExecNode;
use super::protocol::{NodeBase, NodeKind};
use crate::context::ExecContext;
use crate::expr::Expr;
use alloc::boxed::Box;
use alloc::vec::Vec;
use strata_core::{Error, Result, Row, RowShape, TupleSlot, Value};

fn not_built() -> Error {
    Error::invalid_state(NodeKind::Hash.name(), "probe", "not built")
}

/// Hash node.
pub struct HashNode<'a> {
    pub(crate) base: NodeBase,
    pub(crate) child: Box<ExecNode<'a>>,
    keys: Vec<Expr>,
    estimated_rows: usize,
    shape: RowShape,
    hasher: KeyHasher,
    table: Option<HashTable>,
    /// Set when a build fails; cleared by `rescan`.
    aborted: bool,
    slot: TupleSlot,
}

impl<'a> HashNode<'a> {
    pub(crate) fn new(child: Box<ExecNode<'a>>, keys: Vec<Expr>, keep_nulls: bool, estimated_rows: usize) -> Self {
        let shape = child.shape().clone();
        Self {
            base: NodeBase::new(NodeKind::Hash),
            child,
            keys,
            estimated_rows,
            shape,
            hasher: KeyHasher::new(keep_nulls),
            table: None,
            aborted: false,
            slot: TupleSlot::new(),
        }
    }

    pub fn shape(&self) -> &RowShape {
        &self.shape
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn slot(&self) -> &TupleSlot {
        &self.slot
    }

    /// Returns the table once built.
    pub fn table(&self) -> Option<&HashTable> {
        self.table.as_ref()
    }

    pub fn is_built(&self) -> bool {
        self.table.is_some()
    }

    fn evaluate_keys(&self, keys: &[Expr], row: &Row) -> Result<Vec<Value>> {
        keys.iter().map(|key| key.eval(row, &self.base.params)).collect()
    }

    /// Drains the child into the table. Does nothing if already built.
    ///
    /// A failed build leaves the child partly consumed, so every later build
    /// fails with `InvalidState` until the node is rescanned.
    pub fn build(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.base.lifecycle.ensure_running("build")?;
        if self.aborted {
            return Err(Error::invalid_state(NodeKind::Hash.name(), "build", "aborted"));
        }
        if self.table.is_some() {
            return Ok(());
        }

        let config = HashTableConfig::for_estimate(
            ctx.config.work_mem,
            ctx.config.max_batches,
            self.estimated_rows,
            self.shape.estimated_width(),
        );
        let mut table = HashTable::new(config, ctx.spill.create()?);
        if let Err(err) = self.drain_child(ctx, &mut table) {
            self.aborted = true;
            tracing::debug!(error = %err, rows = table.total_tuples(), "hash build aborted");
            return Err(err);
        }

        let instr = &mut self.base.instr;
        instr.batches = table.nbatch() as u64;
        instr.spilled_tuples = table.spilled_tuples();
        instr.spill_bytes = table.spill_bytes();
        instr.peak_memory = instr.peak_memory.max(table.space_peak() as u64);
        tracing::debug!(
            rows = table.total_tuples(),
            skipped = instr.rows_filtered,
            nbatch = table.nbatch(),
            spilled = table.spilled_tuples(),
            peak = table.space_peak(),
            "built hash table"
        );
        self.table = Some(table);
        Ok(())
    }

    fn drain_child(&mut self, ctx: &ExecContext<'_>, table: &mut HashTable) -> Result<()> {
        while let Some(slot) = self.child.next(ctx)? {
            ctx.check_interrupt()?;
            let row = slot.to_row().ok_or_else(|| {
                Error::invalid_state(NodeKind::Hash.name(), "build", "missing a child row")
            })?;
            self.base.instr.tuples_fetched += 1;

            let values = self.evaluate_keys(&self.keys, &row)?;
            let Some(hash) = self.hasher.hash_values(&values) else {
                self.base.instr.rows_filtered += 1;
                continue;
            };
            table.insert(hash, row)?;
        }
        Ok(())
    }

    /// Returns the build rows with `hash` in the resident batch.
    pub fn lookup(&self, hash: u32) -> Result<HashLookup<'_>> {
        self.base.lifecycle.ensure_running("probe")?;
        Ok(self.table.as_ref().ok_or_else(not_built)?.lookup(hash))
    }

    /// Makes `batch` the resident batch.
    pub fn load_batch(&mut self, batch: usize) -> Result<()> {
        self.base.lifecycle.ensure_running("load a batch into")?;
        let table = self.table.as_mut().ok_or_else(not_built)?;
        table.load_batch(batch)?;
        self.base.instr.peak_memory = self.base.instr.peak_memory.max(table.space_peak() as u64);
        self.base.instr.spill_bytes = table.spill_bytes();
        Ok(())
    }

    /// Hashes a probe row's key values the same way build rows are hashed.
    ///
    /// Returns None when a NULL key means the row cannot match.
    pub fn hash_probe_row(&self, row: &Row, probe_keys: &[Expr]) -> Result<Option<u32>> {
        if probe_keys.len() != self.keys.len() {
            return Err(Error::invalid_plan(alloc::format!(
                "probe has {} hash keys, build side has {}",
                probe_keys.len(),
                self.keys.len()
            )));
        }
        let values = self.evaluate_keys(probe_keys, row)?;
        Ok(self.hasher.hash_values(&values))
    }

    pub(crate) fn fetch(&mut self, ctx: &ExecContext<'_>) -> Result<bool> {
        self.build(ctx)?;
        Ok(false)
    }

    /// New parameters force a rebuild. Otherwise the built table is kept and
    /// batch 0 is made resident again.
    pub(crate) fn rescan(&mut self, ctx: &ExecContext<'_>, params: Option<&[Value]>) -> Result<()> {
        if params.is_some() || self.table.is_none() {
            self.table = None;
            self.aborted = false;
            return self.child.rescan(ctx, params);
        }
        if let Some(table) = self.table.as_mut() {
            table.load_batch(0)?;
        }
        Ok(())
    }

    pub(crate) fn release(&mut self) {
        self.table = None;
        self.aborted = false;
        self.slot.clear();
        self.child.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::node::ExecNode;
    use crate::executor::protocol::ExecFlags;
    use crate::plan::Plan;
    use alloc::vec;
    use strata_core::{ColumnDesc, DataType, Snapshot, TxId};
    use strata_storage::{AllVisible, MemoryHeap};

    fn heap(keys: &[Option<&str>]) -> MemoryHeap {
        let shape = RowShape::new(vec![
            ColumnDesc::new("k", DataType::String),
            ColumnDesc::new("n", DataType::Int64),
        ]);
        let mut heap = MemoryHeap::new("t", shape);
        for (i, key) in keys.iter().enumerate() {
            heap.insert(Row::new(vec![Value::from(*key), Value::Int64(i as i64)]), TxId(1));
        }
        heap
    }

    fn numbers(lookup: HashLookup<'_>) -> Vec<i64> {
        match lookup {
            HashLookup::Matches(rows) => rows.into_iter().filter_map(|r| r.get(1)?.as_i64()).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_build_groups_keys_in_build_order() {
        let rel = heap(&[Some("a"), Some("b"), Some("a")]);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let mut node = ExecNode::build(&Plan::hash(Plan::seq_scan(&rel), vec![Expr::column(0)])).unwrap();
        node.init(&ctx, ExecFlags::default()).unwrap();
        assert!(node.next(&ctx).unwrap().is_none());

        let hash = node.as_hash().unwrap();
        let table = hash.table().unwrap();
        assert_eq!(table.resident_buckets(), 2);

        let probe = Row::new(vec![Value::from("a")]);
        let h = hash.hash_probe_row(&probe, &[Expr::column(0)]).unwrap().unwrap();
        assert_eq!(numbers(hash.lookup(h).unwrap()), vec![0, 2]);
        node.end();
    }

    #[test]
    fn test_null_keys_are_skipped() {
        let rel = heap(&[Some("a"), None, Some("b")]);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let mut node = ExecNode::build(&Plan::hash(Plan::seq_scan(&rel), vec![Expr::column(0)])).unwrap();
        node.init(&ctx, ExecFlags::default()).unwrap();
        node.as_hash_mut().unwrap().build(&ctx).unwrap();

        assert_eq!(node.instrumentation().rows_filtered, 1);
        assert_eq!(node.as_hash().unwrap().table().unwrap().total_tuples(), 2);
        let null_probe = Row::new(vec![Value::Null]);
        let hash = node.as_hash().unwrap();
        assert_eq!(hash.hash_probe_row(&null_probe, &[Expr::column(0)]).unwrap(), None);
    }

    #[test]
    fn test_probe_key_count_must_match() {
        let rel = heap(&[Some("a")]);
        let node = ExecNode::build(&Plan::hash(Plan::seq_scan(&rel), vec![Expr::column(0)])).unwrap();
        let err = node
            .as_hash()
            .unwrap()
            .hash_probe_row(&Row::empty(), &[Expr::column(0), Expr::column(1)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPlan { .. }));
    }

    #[test]
    fn test_lookup_before_build_is_invalid_state() {
        let rel = heap(&[]);
        let node = ExecNode::build(&Plan::hash(Plan::seq_scan(&rel), vec![Expr::column(0)])).unwrap();
        let err = node.as_hash().unwrap().lookup(0).unwrap_err();
        assert_eq!(err, Error::invalid_state("Hash", "probe", "unstarted"));
    }

    #[test]
    fn test_rescan_keeps_table_without_params() {
        let rel = heap(&[Some("a"), Some("b")]);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let mut node = ExecNode::build(&Plan::hash(Plan::seq_scan(&rel), vec![Expr::column(0)])).unwrap();
        node.init(&ctx, ExecFlags::default()).unwrap();
        node.as_hash_mut().unwrap().build(&ctx).unwrap();

        node.rescan(&ctx, None).unwrap();
        assert!(node.as_hash().unwrap().is_built());
        node.rescan(&ctx, Some(&[Value::Int64(1)])).unwrap();
        assert!(!node.as_hash().unwrap().is_built());
        node.as_hash_mut().unwrap().build(&ctx).unwrap();
        assert_eq!(node.as_hash().unwrap().table().unwrap().total_tuples(), 2);
    }

    #[test]
    fn test_failed_build_is_not_retried_on_remaining_rows() {
        let shape = RowShape::new(vec![ColumnDesc::new("k", DataType::Int64)]);
        let mut rel = MemoryHeap::new("t", shape);
        for k in [5i64, 0, 7, 9] {
            rel.insert(Row::new(vec![Value::Int64(k)]), TxId(1));
        }
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let key = Expr::binary(crate::expr::BinaryOp::Div, Expr::literal(100i64), Expr::column(0));
        let mut node = ExecNode::build(&Plan::hash(Plan::seq_scan(&rel), vec![key])).unwrap();
        node.init(&ctx, ExecFlags::default()).unwrap();

        let err = node.next(&ctx).unwrap_err();
        assert!(matches!(err, Error::Expression { .. }));
        assert_eq!(
            node.next(&ctx).unwrap_err(),
            Error::invalid_state("Hash", "build", "aborted")
        );
        assert!(!node.as_hash().unwrap().is_built());
        assert!(node.as_hash().unwrap().lookup(0).is_err());

        // The child restarts from its first row, so the same row fails again.
        node.rescan(&ctx, None).unwrap();
        let err = node.as_hash_mut().unwrap().build(&ctx).unwrap_err();
        assert!(matches!(err, Error::Expression { .. }));
        assert_eq!(node.instrumentation().tuples_fetched, 4);
    }
}
