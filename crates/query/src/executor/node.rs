//! Executor node tree.
//!
//! `ExecNode` is the closed set of node kinds. It owns the protocol shared by
//! every kind (state checks, capability checks, parameter handling and
//! counters) and dispatches the kind-specific work to the node structs.

use super::bitmap_scan::{BitmapAndNode, BitmapIndexScanNode, BitmapOrNode};
use super::hash::HashNode;
use super::instrument::Instrumentation;
use super::protocol::{Capabilities, ExecFlags, NodeBase, NodeKind, NodeState};
use super::seq_scan::SeqScanNode;
use super::subquery_scan::SubqueryScanNode;
use crate::context::ExecContext;
use crate::plan::{IndexQual, Plan};
use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use strata_core::{Error, Result, RowShape, TupleSlot, Value};
use strata_index::TidBitmap;

/// A node of an executable tree.
pub enum ExecNode<'a> {
    SeqScan(SeqScanNode<'a>),
    BitmapIndexScan(BitmapIndexScanNode<'a>),
    BitmapAnd(BitmapAndNode<'a>),
    BitmapOr(BitmapOrNode<'a>),
    SubqueryScan(SubqueryScanNode<'a>),
    Hash(HashNode<'a>),
}

impl<'a> ExecNode<'a> {
    /// Builds an unstarted node tree from a plan, validating its structure.
    pub fn build(plan: &Plan<'a>) -> Result<Self> {
        let node = match plan {
            Plan::SeqScan {
                relation,
                direction,
                qual,
            } => ExecNode::SeqScan(SeqScanNode::new(*relation, *direction, qual.clone())),
            Plan::BitmapIndexScan { index, qual } => {
                if qual.column() != index.key_column() {
                    return Err(Error::invalid_plan(format!(
                        "qualifier references column {} but index {} covers column {}",
                        qual.column(),
                        index.name(),
                        index.key_column()
                    )));
                }
                check_index_args(qual)?;
                ExecNode::BitmapIndexScan(BitmapIndexScanNode::new(*index, qual.clone()))
            }
            Plan::BitmapAnd(inputs) => {
                ExecNode::BitmapAnd(BitmapAndNode::new(build_bitmap_inputs("BitmapAnd", inputs)?))
            }
            Plan::BitmapOr(inputs) => {
                ExecNode::BitmapOr(BitmapOrNode::new(build_bitmap_inputs("BitmapOr", inputs)?))
            }
            Plan::SubqueryScan {
                input,
                projection,
                shape,
            } => {
                let child = Box::new(Self::build(input)?);
                let produced = match projection {
                    Some(exprs) => exprs.len(),
                    None => child.shape().len(),
                };
                if produced != shape.len() {
                    return Err(Error::invalid_plan(format!(
                        "subquery scan declares {} columns but produces {}",
                        shape.len(),
                        produced
                    )));
                }
                ExecNode::SubqueryScan(SubqueryScanNode::new(child, projection.clone(), shape.clone()))
            }
            Plan::Hash {
                input,
                keys,
                keep_nulls,
                estimated_rows,
            } => {
                if keys.is_empty() {
                    return Err(Error::invalid_plan("hash node requires at least one key"));
                }
                let child = Box::new(Self::build(input)?);
                ExecNode::Hash(HashNode::new(child, keys.clone(), *keep_nulls, *estimated_rows))
            }
        };
        Ok(node)
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            ExecNode::SeqScan(_) => NodeKind::SeqScan,
            ExecNode::BitmapIndexScan(_) => NodeKind::BitmapIndexScan,
            ExecNode::BitmapAnd(_) => NodeKind::BitmapAnd,
            ExecNode::BitmapOr(_) => NodeKind::BitmapOr,
            ExecNode::SubqueryScan(_) => NodeKind::SubqueryScan,
            ExecNode::Hash(_) => NodeKind::Hash,
        }
    }

    fn base(&self) -> &NodeBase {
        match self {
            ExecNode::SeqScan(n) => &n.base,
            ExecNode::BitmapIndexScan(n) => &n.base,
            ExecNode::BitmapAnd(n) => &n.base,
            ExecNode::BitmapOr(n) => &n.base,
            ExecNode::SubqueryScan(n) => &n.base,
            ExecNode::Hash(n) => &n.base,
        }
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        match self {
            ExecNode::SeqScan(n) => &mut n.base,
            ExecNode::BitmapIndexScan(n) => &mut n.base,
            ExecNode::BitmapAnd(n) => &mut n.base,
            ExecNode::BitmapOr(n) => &mut n.base,
            ExecNode::SubqueryScan(n) => &mut n.base,
            ExecNode::Hash(n) => &mut n.base,
        }
    }

    /// Returns the optional operations this node supports.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            ExecNode::SeqScan(n) => n.capabilities(),
            ExecNode::SubqueryScan(n) => n.child.capabilities(),
            ExecNode::BitmapIndexScan(_)
            | ExecNode::BitmapAnd(_)
            | ExecNode::BitmapOr(_)
            | ExecNode::Hash(_) => Capabilities::NONE,
        }
    }

    /// Returns the declared output shape.
    pub fn shape(&self) -> &RowShape {
        match self {
            ExecNode::SeqScan(n) => n.shape(),
            ExecNode::BitmapIndexScan(n) => n.shape(),
            ExecNode::BitmapAnd(n) => n.shape(),
            ExecNode::BitmapOr(n) => n.shape(),
            ExecNode::SubqueryScan(n) => n.shape(),
            ExecNode::Hash(n) => n.shape(),
        }
    }

    pub fn state(&self) -> NodeState {
        self.base().lifecycle.state()
    }

    /// Returns the node's output slot. Its contents are only meaningful
    /// right after `next` returned them.
    pub fn slot(&self) -> &TupleSlot {
        match self {
            ExecNode::SeqScan(n) => n.slot(),
            ExecNode::BitmapIndexScan(n) => n.slot(),
            ExecNode::BitmapAnd(n) => n.slot(),
            ExecNode::BitmapOr(n) => n.slot(),
            ExecNode::SubqueryScan(n) => n.slot(),
            ExecNode::Hash(n) => n.slot(),
        }
    }

    pub fn instrumentation(&self) -> &Instrumentation {
        &self.base().instr
    }

    /// Returns the current parameter values.
    pub fn params(&self) -> &[Value] {
        &self.base().params
    }

    /// Returns the direct children, in plan order.
    pub fn children(&self) -> Vec<&ExecNode<'a>> {
        match self {
            ExecNode::SeqScan(_) | ExecNode::BitmapIndexScan(_) => Vec::new(),
            ExecNode::BitmapAnd(n) => n.children.iter().collect(),
            ExecNode::BitmapOr(n) => n.children.iter().collect(),
            ExecNode::SubqueryScan(n) => alloc::vec![&*n.child],
            ExecNode::Hash(n) => alloc::vec![&*n.child],
        }
    }

    pub fn as_hash(&self) -> Option<&HashNode<'a>> {
        match self {
            ExecNode::Hash(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_hash_mut(&mut self) -> Option<&mut HashNode<'a>> {
        match self {
            ExecNode::Hash(n) => Some(n),
            _ => None,
        }
    }

    /// Prepares the node and its subtree for fetching.
    ///
    /// Fails with `CapabilityNotSupported` if `flags` request an operation
    /// the node cannot perform.
    pub fn init(&mut self, ctx: &ExecContext<'_>, flags: ExecFlags) -> Result<()> {
        let kind = self.kind();
        self.base().lifecycle.ensure_unstarted()?;
        flags.check(kind, self.capabilities())?;

        self.base_mut().params = ctx.params.clone();

        let child_flags = ExecFlags {
            rewind: flags.rewind,
            ..ExecFlags::default()
        };
        match self {
            ExecNode::SeqScan(n) => n.init(ctx)?,
            ExecNode::BitmapIndexScan(_) => {}
            ExecNode::BitmapAnd(n) => {
                for child in &mut n.children {
                    child.init(ctx, child_flags)?;
                }
            }
            ExecNode::BitmapOr(n) => {
                for child in &mut n.children {
                    child.init(ctx, child_flags)?;
                }
            }
            ExecNode::SubqueryScan(n) => n.child.init(ctx, flags)?,
            ExecNode::Hash(n) => n.child.init(ctx, child_flags)?,
        }

        // A node whose setup failed stays unstarted.
        let base = self.base_mut();
        base.lifecycle.start()?;
        base.instr.loops += 1;
        tracing::debug!(node = %kind, ?flags, "initialized node");
        Ok(())
    }

    /// Returns the next row, or None once the node is exhausted.
    ///
    /// After the first None, further calls return None without touching
    /// the subtree until `rescan`.
    pub fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<&TupleSlot>> {
        let lifecycle = &self.base().lifecycle;
        lifecycle.ensure_running("fetch from")?;
        if lifecycle.is_exhausted() {
            return Ok(None);
        }

        let found = match self {
            ExecNode::SeqScan(n) => n.fetch(ctx)?,
            ExecNode::BitmapIndexScan(n) => {
                n.build_bitmap(ctx)?;
                false
            }
            ExecNode::BitmapAnd(n) => {
                n.build_bitmap(ctx)?;
                false
            }
            ExecNode::BitmapOr(n) => {
                n.build_bitmap(ctx)?;
                false
            }
            ExecNode::SubqueryScan(n) => n.fetch(ctx)?,
            ExecNode::Hash(n) => n.fetch(ctx)?,
        };

        let base = self.base_mut();
        if !found {
            base.lifecycle.exhaust();
            return Ok(None);
        }
        base.instr.rows_out += 1;
        Ok(Some(self.slot()))
    }

    /// Builds (or returns the cached) bitmap of a bitmap-producing node.
    pub fn build_bitmap(&mut self, ctx: &ExecContext<'_>) -> Result<&TidBitmap> {
        let kind = self.kind();
        self.base().lifecycle.ensure_running("build a bitmap from")?;
        match self {
            ExecNode::BitmapIndexScan(n) => n.build_bitmap(ctx),
            ExecNode::BitmapAnd(n) => n.build_bitmap(ctx),
            ExecNode::BitmapOr(n) => n.build_bitmap(ctx),
            _ => Err(Error::capability_not_supported(kind.name(), "bitmap output")),
        }
    }

    /// Restarts the node from the beginning.
    ///
    /// New `params` replace the node's parameter values and are passed down
    /// so the subtree re-evaluates against them.
    pub fn rescan(&mut self, ctx: &ExecContext<'_>, params: Option<&[Value]>) -> Result<()> {
        let base = self.base_mut();
        base.lifecycle.restart("rescan")?;
        if let Some(params) = params {
            base.params = params.to_vec();
        }

        match self {
            ExecNode::SeqScan(n) => n.rescan()?,
            ExecNode::BitmapIndexScan(n) => n.rescan(),
            ExecNode::BitmapAnd(n) => n.rescan(ctx, params)?,
            ExecNode::BitmapOr(n) => n.rescan(ctx, params)?,
            ExecNode::SubqueryScan(n) => n.rescan(ctx, params)?,
            ExecNode::Hash(n) => n.rescan(ctx, params)?,
        }
        self.base_mut().instr.loops += 1;
        Ok(())
    }

    fn ensure_mark_restore(&self, operation: &'static str) -> Result<()> {
        if !self.capabilities().mark_restore {
            return Err(Error::capability_not_supported(self.kind().name(), "mark/restore"));
        }
        self.base().lifecycle.ensure_running(operation)
    }

    /// Remembers the position of the row last returned by `next`.
    pub fn mark_pos(&mut self) -> Result<()> {
        self.ensure_mark_restore("mark a position on")?;
        let kind = self.kind();
        match self {
            ExecNode::SeqScan(n) => n.mark_pos(),
            ExecNode::SubqueryScan(n) => n.mark_pos(),
            _ => Err(Error::capability_not_supported(kind.name(), "mark/restore")),
        }
    }

    /// Returns to the marked position; the next row is the one after it.
    pub fn restore_pos(&mut self) -> Result<()> {
        self.ensure_mark_restore("restore a position on")?;
        let kind = self.kind();
        match self {
            ExecNode::SeqScan(n) => n.restore_pos()?,
            ExecNode::SubqueryScan(n) => n.restore_pos()?,
            _ => return Err(Error::capability_not_supported(kind.name(), "mark/restore")),
        }
        self.base_mut().lifecycle.restart("restore a position on")
    }

    /// Releases the node's resources and ends its subtree. Idempotent.
    pub fn end(&mut self) {
        if !self.base_mut().lifecycle.finish() {
            return;
        }
        match self {
            ExecNode::SeqScan(n) => n.release(),
            ExecNode::BitmapIndexScan(n) => n.release(),
            ExecNode::BitmapAnd(n) => n.release(),
            ExecNode::BitmapOr(n) => n.release(),
            ExecNode::SubqueryScan(n) => n.release(),
            ExecNode::Hash(n) => n.release(),
        }
        let instr = self.instrumentation();
        tracing::debug!(
            node = %self.kind(),
            loops = instr.loops,
            rows = instr.rows_out,
            fetched = instr.tuples_fetched,
            "ended node"
        );
    }
}

fn build_bitmap_inputs<'a>(name: &str, inputs: &[Plan<'a>]) -> Result<Vec<ExecNode<'a>>> {
    if inputs.is_empty() {
        return Err(Error::invalid_plan(format!("{} requires at least one input", name)));
    }
    inputs
        .iter()
        .map(|input| {
            if !input.produces_bitmap() {
                return Err(Error::invalid_plan(format!(
                    "{} input must produce a bitmap",
                    name
                )));
            }
            ExecNode::build(input)
        })
        .collect()
}

fn check_index_args(qual: &IndexQual) -> Result<()> {
    if qual.args().iter().all(|arg| arg.is_row_independent()) {
        Ok(())
    } else {
        Err(Error::invalid_plan(
            "index qualifier arguments may not reference columns",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use alloc::vec;
    use strata_core::{ColumnDesc, DataType, Row, Snapshot, TxId};
    use strata_index::{OrderedIndex, ScanOp};
    use strata_storage::{AllVisible, HeapRelation, MemoryHeap};

    fn relation(n: i64, positioning: bool) -> MemoryHeap {
        let shape = RowShape::new(vec![
            ColumnDesc::new("id", DataType::Int64),
            ColumnDesc::new("name", DataType::String),
        ]);
        let mut heap = MemoryHeap::new("users", shape).with_positioning(positioning);
        for i in 0..n {
            heap.insert(Row::new(vec![Value::Int64(i), Value::from("x")]), TxId(1));
        }
        heap
    }

    fn ids(node: &mut ExecNode<'_>, ctx: &ExecContext<'_>) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(slot) = node.next(ctx).unwrap() {
            out.push(slot.row().unwrap().get(0).unwrap().as_i64().unwrap());
        }
        out
    }

    #[test]
    fn test_next_before_init_is_invalid_state() {
        let rel = relation(3, false);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let mut node = ExecNode::build(&Plan::seq_scan(&rel)).unwrap();
        let err = node.next(&ctx).unwrap_err();
        assert_eq!(err, Error::invalid_state("SeqScan", "fetch from", "unstarted"));

        node.init(&ctx, ExecFlags::default()).unwrap();
        assert_eq!(
            node.init(&ctx, ExecFlags::default()).unwrap_err(),
            Error::invalid_state("SeqScan", "init", "active")
        );
    }

    #[test]
    fn test_exhausted_node_stays_exhausted() {
        let rel = relation(2, false);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let mut node = ExecNode::build(&Plan::seq_scan(&rel)).unwrap();
        node.init(&ctx, ExecFlags::default()).unwrap();
        assert_eq!(ids(&mut node, &ctx), vec![0, 1]);
        assert_eq!(node.state(), NodeState::Exhausted);
        let fetched = node.instrumentation().tuples_fetched;
        assert!(node.next(&ctx).unwrap().is_none());
        assert_eq!(node.instrumentation().tuples_fetched, fetched);
        assert_eq!(node.instrumentation().rows_out, 2);
    }

    #[test]
    fn test_rescan_repeats_rows() {
        let rel = relation(4, false);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let plan = Plan::SeqScan {
            relation: &rel,
            direction: strata_storage::ScanDirection::Backward,
            qual: Some(Expr::gt(Expr::column(0), Expr::literal(0i64))),
        };
        let mut node = ExecNode::build(&plan).unwrap();
        node.init(&ctx, ExecFlags::default().with_backward()).unwrap();
        let first = ids(&mut node, &ctx);
        assert_eq!(first, vec![3, 2, 1]);
        node.rescan(&ctx, None).unwrap();
        assert_eq!(ids(&mut node, &ctx), first);
        assert_eq!(node.instrumentation().loops, 2);
    }

    #[test]
    fn test_mark_restore_requires_capability() {
        let rel = relation(3, false);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let mut node = ExecNode::build(&Plan::seq_scan(&rel)).unwrap();
        assert_eq!(
            node.init(&ctx, ExecFlags::default().with_mark()).unwrap_err(),
            Error::capability_not_supported("SeqScan", "mark/restore")
        );

        let mut node = ExecNode::build(&Plan::seq_scan(&rel)).unwrap();
        node.init(&ctx, ExecFlags::default()).unwrap();
        assert_eq!(
            node.mark_pos().unwrap_err(),
            Error::capability_not_supported("SeqScan", "mark/restore")
        );
    }

    #[test]
    fn test_mark_restore_through_subquery_scan() {
        let rel = relation(5, true);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let plan = Plan::subquery_scan(Plan::seq_scan(&rel), None, rel.shape().clone());
        let mut node = ExecNode::build(&plan).unwrap();
        assert!(node.capabilities().mark_restore);
        node.init(&ctx, ExecFlags::default().with_mark()).unwrap();

        node.next(&ctx).unwrap();
        node.next(&ctx).unwrap();
        node.mark_pos().unwrap();
        assert_eq!(ids(&mut node, &ctx), vec![2, 3, 4]);
        node.restore_pos().unwrap();
        assert_eq!(node.state(), NodeState::Active);
        assert_eq!(ids(&mut node, &ctx), vec![2, 3, 4]);
    }

    #[test]
    fn test_subquery_projection() {
        let rel = relation(3, false);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let shape = RowShape::new(vec![ColumnDesc::new("doubled", DataType::Int64)]);
        let projection = vec![Expr::binary(
            crate::expr::BinaryOp::Mul,
            Expr::column(0),
            Expr::literal(2i64),
        )];
        let mut node =
            ExecNode::build(&Plan::subquery_scan(Plan::seq_scan(&rel), Some(projection), shape)).unwrap();
        node.init(&ctx, ExecFlags::default()).unwrap();
        assert_eq!(ids(&mut node, &ctx), vec![0, 2, 4]);
    }

    #[test]
    fn test_invalid_plans_are_rejected() {
        let rel = relation(1, false);
        let index = OrderedIndex::new("users_id", 0);
        let qual = IndexQual::Compare {
            column: 1,
            op: ScanOp::Eq,
            arg: Expr::literal(1i64),
        };
        assert!(matches!(
            ExecNode::build(&Plan::bitmap_index_scan(&index, qual)),
            Err(Error::InvalidPlan { .. })
        ));

        let correlated = IndexQual::Compare {
            column: 0,
            op: ScanOp::Eq,
            arg: Expr::column(1),
        };
        assert!(ExecNode::build(&Plan::bitmap_index_scan(&index, correlated)).is_err());
        assert!(ExecNode::build(&Plan::BitmapAnd(vec![])).is_err());
        assert!(ExecNode::build(&Plan::BitmapOr(vec![Plan::seq_scan(&rel)])).is_err());
        assert!(ExecNode::build(&Plan::hash(Plan::seq_scan(&rel), vec![])).is_err());
        assert!(ExecNode::build(&Plan::subquery_scan(Plan::seq_scan(&rel), None, RowShape::empty())).is_err());
    }

    #[test]
    fn test_bitmap_output_only_from_bitmap_nodes() {
        let rel = relation(1, false);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let mut node = ExecNode::build(&Plan::seq_scan(&rel)).unwrap();
        node.init(&ctx, ExecFlags::default()).unwrap();
        assert_eq!(
            node.build_bitmap(&ctx).unwrap_err(),
            Error::capability_not_supported("SeqScan", "bitmap output")
        );
    }

    #[test]
    fn test_end_is_idempotent_and_recursive() {
        let rel = relation(2, false);
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let plan = Plan::hash(Plan::seq_scan(&rel), vec![Expr::column(0)]);
        let mut node = ExecNode::build(&plan).unwrap();
        node.init(&ctx, ExecFlags::default()).unwrap();
        node.end();
        node.end();
        assert_eq!(node.state(), NodeState::Ended);
        assert!(node.children().iter().all(|c| c.state() == NodeState::Ended));
        assert!(node.next(&ctx).is_err());
    }

    struct Offline {
        shape: RowShape,
    }

    impl HeapRelation for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        fn shape(&self) -> &RowShape {
            &self.shape
        }

        fn begin_scan<'r>(
            &'r self,
            _snapshot: &Snapshot,
            _direction: strata_storage::ScanDirection,
        ) -> Result<alloc::boxed::Box<dyn strata_storage::HeapScan + 'r>> {
            Err(Error::storage("relation is offline"))
        }
    }

    #[test]
    fn test_failed_init_leaves_node_unstarted() {
        let rel = Offline {
            shape: RowShape::new(vec![ColumnDesc::new("id", DataType::Int64)]),
        };
        let snapshot = Snapshot::any();
        let ctx = ExecContext::new(&snapshot, &AllVisible);
        let mut node = ExecNode::build(&Plan::seq_scan(&rel)).unwrap();
        assert_eq!(
            node.init(&ctx, ExecFlags::default()).unwrap_err(),
            Error::storage("relation is offline")
        );
        assert_eq!(node.state(), NodeState::Unstarted);
        assert_eq!(node.instrumentation().loops, 0);
        assert_eq!(
            node.next(&ctx).unwrap_err(),
            Error::invalid_state("SeqScan", "fetch from", "unstarted")
        );
        node.end();
        assert_eq!(node.state(), NodeState::Ended);
    }
}
