//! Bitmap-producing nodes.
//!
//! A bitmap index scan asks an index for the TIDs matching one qualifier and
//! collects them in a private `TidBitmap`. `BitmapAnd` and `BitmapOr` combine
//! the bitmaps of their children. None of these nodes emit rows: `next`
//! builds the bitmap and reports end-of-data, and a consumer takes the
//! result through `build_bitmap`.

use super::node::ExecNode;
use super::protocol::{NodeBase, NodeKind};
use super::instrument::Instrumentation;
use crate::context::ExecContext;
use crate::plan::IndexQual;
use alloc::vec::Vec;
use strata_core::{Result, Row, RowShape, TupleSlot, Value};
use strata_index::{BitmapIndex, ScanKey, TidBitmap};

fn record_bitmap(instr: &mut Instrumentation, bitmap: &TidBitmap) {
    instr.lossy_blocks = bitmap.lossy_blocks() as u64;
    instr.exact_blocks = (bitmap.num_blocks() - bitmap.lossy_blocks()) as u64;
}

/// Bitmap index scan node.
pub struct BitmapIndexScanNode<'a> {
    pub(crate) base: NodeBase,
    index: &'a dyn BitmapIndex,
    qual: IndexQual,
    bitmap: Option<TidBitmap>,
    /// Always empty; bitmap nodes emit no rows.
    slot: TupleSlot,
    shape: RowShape,
}

impl<'a> BitmapIndexScanNode<'a> {
    pub(crate) fn new(index: &'a dyn BitmapIndex, qual: IndexQual) -> Self {
        Self {
            base: NodeBase::new(NodeKind::BitmapIndexScan),
            index,
            qual,
            bitmap: None,
            slot: TupleSlot::new(),
            shape: RowShape::empty(),
        }
    }

    /// Evaluates the qualifier's arguments into distinct non-NULL keys.
    fn runtime_keys(&self) -> Result<Vec<Value>> {
        let empty = Row::empty();
        let mut keys = Vec::with_capacity(self.qual.args().len());
        for arg in self.qual.args() {
            let value = arg.eval(&empty, &self.base.params)?;
            if !value.is_null() {
                keys.push(value);
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    pub fn shape(&self) -> &RowShape {
        &self.shape
    }

    pub(crate) fn slot(&self) -> &TupleSlot {
        &self.slot
    }

    pub(crate) fn build_bitmap(&mut self, ctx: &ExecContext<'_>) -> Result<&TidBitmap> {
        let bitmap = match self.bitmap.take() {
            Some(bitmap) => bitmap,
            None => {
                let mut bitmap = TidBitmap::with_limits(ctx.config.bitmap_limits);
                for key in self.runtime_keys()? {
                    let scan_key = ScanKey::new(self.qual.column(), self.qual.op(), key);
                    let found = self.index.build_from_qualifier(&scan_key)?;
                    self.base.instr.index_calls += 1;
                    bitmap.union_with(&found);
                }
                record_bitmap(&mut self.base.instr, &bitmap);
                tracing::debug!(
                    index = self.index.name(),
                    blocks = bitmap.num_blocks(),
                    lossy = bitmap.lossy_blocks(),
                    "built index bitmap"
                );
                bitmap
            }
        };
        Ok(self.bitmap.insert(bitmap))
    }

    pub(crate) fn rescan(&mut self) {
        self.bitmap = None;
    }

    pub(crate) fn release(&mut self) {
        self.bitmap = None;
    }
}

/// Intersection of bitmap-producing children.
pub struct BitmapAndNode<'a> {
    pub(crate) base: NodeBase,
    pub(crate) children: Vec<ExecNode<'a>>,
    bitmap: Option<TidBitmap>,
    /// Always empty; bitmap nodes emit no rows.
    slot: TupleSlot,
    shape: RowShape,
}

impl<'a> BitmapAndNode<'a> {
    pub(crate) fn new(children: Vec<ExecNode<'a>>) -> Self {
        Self {
            base: NodeBase::new(NodeKind::BitmapAnd),
            children,
            bitmap: None,
            slot: TupleSlot::new(),
            shape: RowShape::empty(),
        }
    }

    pub fn shape(&self) -> &RowShape {
        &self.shape
    }

    pub(crate) fn slot(&self) -> &TupleSlot {
        &self.slot
    }

    pub(crate) fn build_bitmap(&mut self, ctx: &ExecContext<'_>) -> Result<&TidBitmap> {
        let bitmap = match self.bitmap.take() {
            Some(bitmap) => bitmap,
            None => {
                let mut acc: Option<TidBitmap> = None;
                for child in &mut self.children {
                    let next = child.build_bitmap(ctx)?;
                    let combined = match acc {
                        None => next.clone(),
                        Some(prev) => prev.intersect(next),
                    };
                    // Nothing can survive further intersections.
                    if !combined.has_candidates() {
                        acc = Some(TidBitmap::with_limits(ctx.config.bitmap_limits));
                        break;
                    }
                    acc = Some(combined);
                }
                let bitmap = acc.unwrap_or_else(|| TidBitmap::with_limits(ctx.config.bitmap_limits));
                record_bitmap(&mut self.base.instr, &bitmap);
                bitmap
            }
        };
        Ok(self.bitmap.insert(bitmap))
    }

    pub(crate) fn rescan(&mut self, ctx: &ExecContext<'_>, params: Option<&[Value]>) -> Result<()> {
        self.bitmap = None;
        for child in &mut self.children {
            child.rescan(ctx, params)?;
        }
        Ok(())
    }

    pub(crate) fn release(&mut self) {
        self.bitmap = None;
        for child in &mut self.children {
            child.end();
        }
    }
}

/// Union of bitmap-producing children.
pub struct BitmapOrNode<'a> {
    pub(crate) base: NodeBase,
    pub(crate) children: Vec<ExecNode<'a>>,
    bitmap: Option<TidBitmap>,
    /// Always empty; bitmap nodes emit no rows.
    slot: TupleSlot,
    shape: RowShape,
}

impl<'a> BitmapOrNode<'a> {
    pub(crate) fn new(children: Vec<ExecNode<'a>>) -> Self {
        Self {
            base: NodeBase::new(NodeKind::BitmapOr),
            children,
            bitmap: None,
            slot: TupleSlot::new(),
            shape: RowShape::empty(),
        }
    }

    pub fn shape(&self) -> &RowShape {
        &self.shape
    }

    pub(crate) fn slot(&self) -> &TupleSlot {
        &self.slot
    }

    pub(crate) fn build_bitmap(&mut self, ctx: &ExecContext<'_>) -> Result<&TidBitmap> {
        let bitmap = match self.bitmap.take() {
            Some(bitmap) => bitmap,
            None => {
                let mut bitmap = TidBitmap::with_limits(ctx.config.bitmap_limits);
                for child in &mut self.children {
                    bitmap.union_with(child.build_bitmap(ctx)?);
                }
                record_bitmap(&mut self.base.instr, &bitmap);
                bitmap
            }
        };
        Ok(self.bitmap.insert(bitmap))
    }

    pub(crate) fn rescan(&mut self, ctx: &ExecContext<'_>, params: Option<&[Value]>) -> Result<()> {
        self.bitmap = None;
        for child in &mut self.children {
            child.rescan(ctx, params)?;
        }
        Ok(())
    }

    pub(crate) fn release(&mut self) {
        self.bitmap = None;
        for child in &mut self.children {
            child.end();
        }
    }
}
