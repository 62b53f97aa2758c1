//! Execution context and configuration.
//!
//! `ExecContext` carries everything a node tree borrows from its caller for
//! the duration of one execution: the snapshot, the visibility oracle, the
//! spill provider, tuning knobs and an optional interrupt flag.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use strata_core::{Error, Result, Snapshot, Value};
use strata_index::BitmapLimits;
use strata_storage::{MemorySpillProvider, SpillProvider, VisibilityOracle};

static DEFAULT_SPILL: MemorySpillProvider = MemorySpillProvider::new();

/// Tuning knobs for one execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecConfig {
    /// Working-memory budget of each hash table, in bytes.
    pub work_mem: usize,
    /// Limits applied to bitmaps built by bitmap nodes.
    pub bitmap_limits: BitmapLimits,
    /// Upper bound on hash-table batches.
    pub max_batches: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            work_mem: 4 * 1024 * 1024,
            bitmap_limits: BitmapLimits::default(),
            max_batches: 1 << 16,
        }
    }
}

impl ExecConfig {
    pub fn with_work_mem(mut self, work_mem: usize) -> Self {
        self.work_mem = work_mem;
        self
    }

    pub fn with_bitmap_limits(mut self, limits: BitmapLimits) -> Self {
        self.bitmap_limits = limits;
        self
    }

    /// Sets the batch cap, rounded up to a power of two.
    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.max_batches = max_batches.max(1).next_power_of_two();
        self
    }
}

/// Borrowed environment of one execution.
pub struct ExecContext<'a> {
    pub snapshot: &'a Snapshot,
    pub visibility: &'a dyn VisibilityOracle,
    pub spill: &'a dyn SpillProvider,
    pub config: ExecConfig,
    /// Initial correlated parameter values.
    pub params: Vec<Value>,
    interrupt: Option<&'a AtomicBool>,
}

impl<'a> ExecContext<'a> {
    /// Creates a context with default configuration and in-memory spilling.
    pub fn new(snapshot: &'a Snapshot, visibility: &'a dyn VisibilityOracle) -> Self {
        Self {
            snapshot,
            visibility,
            spill: &DEFAULT_SPILL,
            config: ExecConfig::default(),
            params: Vec::new(),
            interrupt: None,
        }
    }

    pub fn with_config(mut self, config: ExecConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_spill(mut self, spill: &'a dyn SpillProvider) -> Self {
        self.spill = spill;
        self
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    /// Installs a flag that cancels execution once set.
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Returns `Canceled` if the interrupt flag is set.
    #[inline]
    pub fn check_interrupt(&self) -> Result<()> {
        match self.interrupt {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Canceled),
            _ => Ok(()),
        }
    }
}
