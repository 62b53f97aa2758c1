//! The node-execution protocol.
//!
//! Every node moves through the same states:
//!
//! ```text
//! Unstarted --init--> Active --next returns None--> Exhausted
//!                       ^                              |
//!                       +------------rescan------------+
//! any state --end--> Ended
//! ```
//!
//! `Lifecycle` enforces the legal transitions and produces the
//! `InvalidState` errors for illegal ones.

use super::instrument::Instrumentation;
use alloc::vec::Vec;
use core::fmt;
use strata_core::{Error, Result, Value};

/// Execution state of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeState {
    #[default]
    Unstarted,
    Active,
    Exhausted,
    Ended,
}

impl NodeState {
    pub fn name(&self) -> &'static str {
        match self {
            NodeState::Unstarted => "unstarted",
            NodeState::Active => "active",
            NodeState::Exhausted => "exhausted",
            NodeState::Ended => "ended",
        }
    }
}

/// The closed set of node kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    SeqScan,
    BitmapIndexScan,
    BitmapAnd,
    BitmapOr,
    SubqueryScan,
    Hash,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::SeqScan => "SeqScan",
            NodeKind::BitmapIndexScan => "BitmapIndexScan",
            NodeKind::BitmapAnd => "BitmapAnd",
            NodeKind::BitmapOr => "BitmapOr",
            NodeKind::SubqueryScan => "SubqueryScan",
            NodeKind::Hash => "Hash",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional operations a node supports, fixed when the node is built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Rows can be fetched in reverse.
    pub backward: bool,
    /// `mark_pos` / `restore_pos` are available.
    pub mark_restore: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        backward: false,
        mark_restore: false,
    };
}

/// What the caller intends to do with a node, passed to `init`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecFlags {
    /// Caller may scan backward.
    pub backward: bool,
    /// Caller may mark and restore positions.
    pub mark: bool,
    /// Caller may rescan without new parameters.
    pub rewind: bool,
}

impl ExecFlags {
    pub fn with_backward(mut self) -> Self {
        self.backward = true;
        self
    }

    pub fn with_mark(mut self) -> Self {
        self.mark = true;
        self
    }

    pub fn with_rewind(mut self) -> Self {
        self.rewind = true;
        self
    }

    /// Checks the requested operations against what a node supports.
    pub fn check(&self, kind: NodeKind, caps: Capabilities) -> Result<()> {
        if self.backward && !caps.backward {
            return Err(Error::capability_not_supported(kind.name(), "backward scan"));
        }
        if self.mark && !caps.mark_restore {
            return Err(Error::capability_not_supported(kind.name(), "mark/restore"));
        }
        Ok(())
    }
}

/// State machine shared by all nodes.
#[derive(Clone, Copy, Debug)]
pub struct Lifecycle {
    kind: NodeKind,
    state: NodeState,
}

impl Lifecycle {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            state: NodeState::Unstarted,
        }
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        self.state
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.state == NodeState::Exhausted
    }

    #[inline]
    pub fn is_ended(&self) -> bool {
        self.state == NodeState::Ended
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::invalid_state(self.kind.name(), operation, self.state.name())
    }

    /// Checks that `init` has not been called yet.
    pub fn ensure_unstarted(&self) -> Result<()> {
        if self.state != NodeState::Unstarted {
            return Err(self.invalid("init"));
        }
        Ok(())
    }

    /// Unstarted -> Active.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_unstarted()?;
        self.state = NodeState::Active;
        Ok(())
    }

    /// Checks that the node is Active or Exhausted.
    pub fn ensure_running(&self, operation: &'static str) -> Result<()> {
        match self.state {
            NodeState::Active | NodeState::Exhausted => Ok(()),
            NodeState::Unstarted | NodeState::Ended => Err(self.invalid(operation)),
        }
    }

    /// Active -> Exhausted.
    pub fn exhaust(&mut self) {
        if self.state == NodeState::Active {
            self.state = NodeState::Exhausted;
        }
    }

    /// Active or Exhausted -> Active.
    pub fn restart(&mut self, operation: &'static str) -> Result<()> {
        self.ensure_running(operation)?;
        self.state = NodeState::Active;
        Ok(())
    }

    /// Any state -> Ended. Returns false if the node had already ended.
    pub fn finish(&mut self) -> bool {
        let was_ended = self.is_ended();
        self.state = NodeState::Ended;
        !was_ended
    }
}

/// State every node carries: its lifecycle, counters and current parameters.
#[derive(Clone, Debug)]
pub struct NodeBase {
    pub lifecycle: Lifecycle,
    pub instr: Instrumentation,
    /// Correlated parameter values, replaced by `rescan`.
    pub params: Vec<Value>,
}

impl NodeBase {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            lifecycle: Lifecycle::new(kind),
            instr: Instrumentation::default(),
            params: Vec::new(),
        }
    }
}
