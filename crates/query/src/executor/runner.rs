//! Executor driver.
//!
//! Runs a plan to completion: builds the node tree, initializes it, pulls
//! every row and ends the tree whatever the outcome.

use super::instrument::Instrumentation;
use super::node::ExecNode;
use super::protocol::{ExecFlags, NodeKind};
use crate::context::ExecContext;
use crate::plan::Plan;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};
use strata_core::{Error, Result, Row};

/// Counters of one node, reported after execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeStats {
    pub kind: NodeKind,
    /// Distance from the root; the root is 0.
    pub depth: usize,
    pub instrumentation: Instrumentation,
}

/// Rows and per-node statistics of one execution.
#[derive(Clone, Debug, Default)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    /// Depth-first, parents before children.
    pub stats: Vec<NodeStats>,
}

/// Ends the tree when dropped.
struct EndGuard<'n, 'a> {
    node: &'n mut ExecNode<'a>,
}

impl<'a> Deref for EndGuard<'_, 'a> {
    type Target = ExecNode<'a>;

    fn deref(&self) -> &Self::Target {
        self.node
    }
}

impl DerefMut for EndGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.node
    }
}

impl Drop for EndGuard<'_, '_> {
    fn drop(&mut self) {
        self.node.end();
    }
}

/// Executes `plan` and collects its rows.
///
/// Rows are materialized as they are returned. The tree is ended on success,
/// on error and on cancellation.
#[tracing::instrument(level = "debug", skip_all)]
pub fn execute<'a>(plan: &Plan<'a>, ctx: &ExecContext<'_>, flags: ExecFlags) -> Result<QueryOutput> {
    let mut root = ExecNode::build(plan)?;
    let rows = {
        let mut guard = EndGuard { node: &mut root };
        run(&mut guard, ctx, flags).inspect_err(|err| {
            tracing::debug!(error = %err, node = %guard.kind(), "execution failed");
        })?
    };

    let mut stats = Vec::new();
    collect_stats(&root, 0, &mut stats);
    tracing::debug!(rows = rows.len(), nodes = stats.len(), "execution finished");
    Ok(QueryOutput { rows, stats })
}

fn run(node: &mut ExecNode<'_>, ctx: &ExecContext<'_>, flags: ExecFlags) -> Result<Vec<Row>> {
    node.init(ctx, flags)?;
    let kind = node.kind();
    let mut rows = Vec::new();
    loop {
        ctx.check_interrupt()?;
        let Some(slot) = node.next(ctx)? else {
            break;
        };
        let row = slot.to_row().ok_or_else(|| {
            Error::invalid_state(kind.name(), "collect from", "missing a row")
        })?;
        rows.push(row);
    }
    Ok(rows)
}

fn collect_stats(node: &ExecNode<'_>, depth: usize, out: &mut Vec<NodeStats>) {
    out.push(NodeStats {
        kind: node.kind(),
        depth,
        instrumentation: *node.instrumentation(),
    });
    for child in node.children() {
        collect_stats(child, depth + 1, out);
    }
}
