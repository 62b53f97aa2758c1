//! In-memory ordered index.
//!
//! Maps key values to the TIDs holding them, kept in a `BTreeMap` so range
//! qualifiers resolve with a single ordered walk. NULL keys are not indexed.

use crate::bitmap::{BitmapLimits, TidBitmap};
use crate::traits::{BitmapIndex, ScanKey};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::{Error, Result, Tid, Value};

/// Precision of the bitmaps an index produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Granularity {
    /// One exact entry per matching TID.
    #[default]
    Tuple,
    /// One lossy page per block holding a match, like a block-range index.
    Page,
}

/// Ordered index over one column.
#[derive(Clone, Debug)]
pub struct OrderedIndex {
    name: String,
    column: usize,
    granularity: Granularity,
    limits: BitmapLimits,
    entries: BTreeMap<Value, Vec<Tid>>,
    len: usize,
}

impl OrderedIndex {
    /// Creates an empty tuple-granular index on `column`.
    pub fn new(name: impl Into<String>, column: usize) -> Self {
        Self {
            name: name.into(),
            column,
            granularity: Granularity::Tuple,
            limits: BitmapLimits::default(),
            entries: BTreeMap::new(),
            len: 0,
        }
    }

    /// Sets the granularity of produced bitmaps.
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Sets the limits of produced bitmaps.
    pub fn with_limits(mut self, limits: BitmapLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the bitmap granularity.
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Adds an entry. NULL keys are ignored.
    pub fn insert(&mut self, key: Value, tid: Tid) {
        if key.is_null() {
            return;
        }
        self.entries.entry(key).or_default().push(tid);
        self.len += 1;
    }

    /// Removes an entry, returning true if it was present.
    pub fn remove(&mut self, key: &Value, tid: Tid) -> bool {
        let Some(tids) = self.entries.get_mut(key) else {
            return false;
        };
        let Some(pos) = tids.iter().position(|t| *t == tid) else {
            return false;
        };
        tids.swap_remove(pos);
        if tids.is_empty() {
            self.entries.remove(key);
        }
        self.len -= 1;
        true
    }

    /// Returns the number of indexed entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl BitmapIndex for OrderedIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_column(&self) -> usize {
        self.column
    }

    fn build_from_qualifier(&self, key: &ScanKey) -> Result<TidBitmap> {
        if key.column != self.column {
            return Err(Error::storage(format!(
                "index {} is on column {}, qualifier references column {}",
                self.name, self.column, key.column
            )));
        }

        let mut bitmap = TidBitmap::with_limits(self.limits);
        if key.argument.is_null() {
            return Ok(bitmap);
        }

        let arg_type = key.argument.data_type();
        let matching = self
            .entries
            .range(key.bounds())
            .filter(|(k, _)| k.data_type() == arg_type)
            .flat_map(|(_, tids)| tids.iter().copied());

        match self.granularity {
            Granularity::Tuple => bitmap.add_tids(matching),
            Granularity::Page => {
                for tid in matching {
                    bitmap.add_page(tid.block());
                }
            }
        }

        tracing::trace!(
            index = %self.name,
            op = key.op.symbol(),
            blocks = bitmap.num_blocks(),
            entries = bitmap.total_entries(),
            "built bitmap from qualifier"
        );
        Ok(bitmap)
    }
}
