//! Sequential scan.
//!
//! Reads every row version of a relation in physical order through a
//! `HeapScan`, skipping versions the snapshot cannot see and rows rejected by
//! the optional filter. Rows are handed out borrowed from storage.

use super::protocol::{Capabilities, NodeBase, NodeKind};
use crate::context::ExecContext;
use crate::expr::Expr;
use alloc::boxed::Box;
use strata_core::{Error, Result, RowShape, TupleSlot};
use strata_storage::{HeapRelation, HeapScan, ScanDirection, ScanPosition};

/// Sequential scan node.
pub struct SeqScanNode<'a> {
    pub(crate) base: NodeBase,
    relation: &'a dyn HeapRelation,
    direction: ScanDirection,
    qual: Option<Expr>,
    shape: RowShape,
    scan: Option<Box<dyn HeapScan + 'a>>,
    slot: TupleSlot,
    mark: Option<ScanPosition>,
}

fn not_open() -> Error {
    Error::invalid_state(NodeKind::SeqScan.name(), "fetch from", "not open")
}

impl<'a> SeqScanNode<'a> {
    pub(crate) fn new(relation: &'a dyn HeapRelation, direction: ScanDirection, qual: Option<Expr>) -> Self {
        Self {
            base: NodeBase::new(NodeKind::SeqScan),
            relation,
            direction,
            qual,
            shape: relation.shape().clone(),
            scan: None,
            slot: TupleSlot::new(),
            mark: None,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            backward: true,
            mark_restore: self.relation.supports_positioning(),
        }
    }

    pub fn shape(&self) -> &RowShape {
        &self.shape
    }

    pub fn direction(&self) -> ScanDirection {
        self.direction
    }

    pub(crate) fn slot(&self) -> &TupleSlot {
        &self.slot
    }

    pub(crate) fn init(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.scan = Some(self.relation.begin_scan(ctx.snapshot, self.direction)?);
        tracing::debug!(
            relation = self.relation.name(),
            direction = ?self.direction,
            filtered = self.qual.is_some(),
            "opened sequential scan"
        );
        Ok(())
    }

    pub(crate) fn fetch(&mut self, ctx: &ExecContext<'_>) -> Result<bool> {
        let scan = self.scan.as_deref_mut().ok_or_else(not_open)?;
        let instr = &mut self.base.instr;
        loop {
            let next = scan.fetch_next(self.direction)?;
            instr.blocks_read = scan.blocks_read();
            let Some(tuple) = next else {
                self.slot.clear();
                return Ok(false);
            };
            instr.tuples_fetched += 1;

            if !ctx.visibility.is_visible(&tuple, ctx.snapshot) {
                instr.rows_invisible += 1;
                continue;
            }
            if let Some(qual) = &self.qual {
                if !qual.eval_predicate(&tuple.row, &self.base.params)? {
                    instr.rows_filtered += 1;
                    continue;
                }
            }

            self.slot.store_borrowed(tuple.tid, tuple.row);
            return Ok(true);
        }
    }

    pub(crate) fn rescan(&mut self) -> Result<()> {
        self.slot.clear();
        self.mark = None;
        self.scan.as_deref_mut().ok_or_else(not_open)?.rescan()
    }

    pub(crate) fn mark_pos(&mut self) -> Result<()> {
        let scan = self.scan.as_deref_mut().ok_or_else(not_open)?;
        self.mark = Some(scan.mark()?);
        Ok(())
    }

    pub(crate) fn restore_pos(&mut self) -> Result<()> {
        let Some(mark) = self.mark else {
            return Err(Error::invalid_state(
                NodeKind::SeqScan.name(),
                "restore a position on",
                "unmarked",
            ));
        };
        self.slot.clear();
        self.scan.as_deref_mut().ok_or_else(not_open)?.restore(mark)
    }

    pub(crate) fn release(&mut self) {
        self.slot.clear();
        self.scan = None;
        self.mark = None;
    }
}
