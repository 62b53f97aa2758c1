//! Subquery scan.
//!
//! Re-exposes a child's rows under a declared output shape, optionally
//! evaluating a projection list against each child row. One row in, one row
//! out, in child order.

use super::node::ExecNode;
use super::protocol::{NodeBase, NodeKind};
use crate::context::ExecContext;
use crate::expr::Expr;
use alloc::boxed::Box;
use alloc::vec::Vec;
use strata_core::{Error, Result, Row, RowShape, TupleSlot, Value};

/// Subquery scan node.
pub struct SubqueryScanNode<'a> {
    pub(crate) base: NodeBase,
    pub(crate) child: Box<ExecNode<'a>>,
    projection: Option<Vec<Expr>>,
    shape: RowShape,
    slot: TupleSlot,
}

impl<'a> SubqueryScanNode<'a> {
    pub(crate) fn new(child: Box<ExecNode<'a>>, projection: Option<Vec<Expr>>, shape: RowShape) -> Self {
        Self {
            base: NodeBase::new(NodeKind::SubqueryScan),
            child,
            projection,
            shape,
            slot: TupleSlot::new(),
        }
    }

    pub fn shape(&self) -> &RowShape {
        &self.shape
    }

    /// Returns the projected slot, or the child's slot when rows pass through.
    pub(crate) fn slot(&self) -> &TupleSlot {
        match &self.projection {
            Some(_) => &self.slot,
            None => self.child.slot(),
        }
    }

    pub(crate) fn fetch(&mut self, ctx: &ExecContext<'_>) -> Result<bool> {
        let Some(child_slot) = self.child.next(ctx)? else {
            self.slot.clear();
            return Ok(false);
        };
        if let Some(projection) = &self.projection {
            let row = child_slot.row().ok_or_else(|| {
                Error::invalid_state(NodeKind::SubqueryScan.name(), "project", "missing a child row")
            })?;
            let values = projection
                .iter()
                .map(|expr| expr.eval(row, &self.base.params))
                .collect::<Result<Vec<_>>>()?;
            self.slot.store_owned(child_slot.tid(), Row::new(values));
        }
        Ok(true)
    }

    pub(crate) fn rescan(&mut self, ctx: &ExecContext<'_>, params: Option<&[Value]>) -> Result<()> {
        self.slot.clear();
        self.child.rescan(ctx, params)
    }

    pub(crate) fn mark_pos(&mut self) -> Result<()> {
        self.child.mark_pos()
    }

    pub(crate) fn restore_pos(&mut self) -> Result<()> {
        self.slot.clear();
        self.child.restore_pos()
    }

    pub(crate) fn release(&mut self) {
        self.slot.clear();
        self.child.end();
    }
}
