//! Spill storage for batched hash tables.
//!
//! A `SpillStore` is a set of append-only batch files. A hash table that
//! outgrows its memory budget writes the rows of non-resident batches here and
//! reads a whole batch back when it becomes current.

use crate::codec::{encode_tuple, TupleDecoder};
use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use strata_core::{Error, Result, Row};

/// A row written to a batch file together with its hash value.
#[derive(Clone, Debug, PartialEq)]
pub struct SpilledTuple {
    pub hash: u32,
    pub row: Row,
}

/// Append-only batch files.
pub trait SpillStore {
    /// Appends a tuple to `batch`'s file.
    fn append(&mut self, batch: usize, tuple: &SpilledTuple) -> Result<()>;

    /// Reads back and clears `batch`'s file, in append order.
    fn take_batch(&mut self, batch: usize) -> Result<Vec<SpilledTuple>>;

    /// Returns the number of tuples currently in `batch`'s file.
    fn batch_len(&self, batch: usize) -> usize;

    /// Returns the total number of bytes ever written.
    fn bytes_written(&self) -> u64;
}

/// Creates spill stores on demand.
pub trait SpillProvider {
    fn create(&self) -> Result<Box<dyn SpillStore>>;
}

#[derive(Clone, Debug, Default)]
struct BatchFile {
    data: Vec<u8>,
    tuples: usize,
}

/// In-memory spill store holding each batch file as an encoded byte buffer.
#[derive(Clone, Debug, Default)]
pub struct MemorySpill {
    files: Vec<BatchFile>,
    bytes_written: u64,
    capacity: Option<u64>,
}

impl MemorySpill {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the bytes held across all files; appends beyond it fail.
    pub fn with_capacity_limit(bytes: u64) -> Self {
        Self {
            capacity: Some(bytes),
            ..Self::default()
        }
    }

    /// Returns the bytes currently held across all files.
    pub fn bytes_held(&self) -> u64 {
        self.files.iter().map(|f| f.data.len() as u64).sum()
    }
}

impl SpillStore for MemorySpill {
    fn append(&mut self, batch: usize, tuple: &SpilledTuple) -> Result<()> {
        let mut encoded = Vec::new();
        let written = encode_tuple(tuple.hash, &tuple.row, &mut encoded)? as u64;
        if let Some(cap) = self.capacity {
            if self.bytes_held() + written > cap {
                return Err(Error::storage(format!(
                    "spill space exhausted: {} of {} bytes in use",
                    self.bytes_held(),
                    cap
                )));
            }
        }
        if self.files.len() <= batch {
            self.files.resize_with(batch + 1, BatchFile::default);
        }
        let file = &mut self.files[batch];
        file.data.extend_from_slice(&encoded);
        file.tuples += 1;
        self.bytes_written += written;
        tracing::trace!(batch, hash = tuple.hash, bytes = written, "spilled tuple");
        Ok(())
    }

    fn take_batch(&mut self, batch: usize) -> Result<Vec<SpilledTuple>> {
        let Some(file) = self.files.get_mut(batch) else {
            return Ok(Vec::new());
        };
        let file = core::mem::take(file);
        let mut out = Vec::with_capacity(file.tuples);
        let mut decoder = TupleDecoder::new(&file.data);
        while !decoder.is_done() {
            let (hash, row) = decoder.next_tuple()?;
            out.push(SpilledTuple { hash, row });
        }
        Ok(out)
    }

    fn batch_len(&self, batch: usize) -> usize {
        self.files.get(batch).map_or(0, |f| f.tuples)
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Provides `MemorySpill` stores.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemorySpillProvider {
    capacity: Option<u64>,
}

impl MemorySpillProvider {
    pub const fn new() -> Self {
        Self { capacity: None }
    }

    /// Caps every created store at `bytes`.
    pub const fn with_capacity_limit(bytes: u64) -> Self {
        Self {
            capacity: Some(bytes),
        }
    }
}

impl SpillProvider for MemorySpillProvider {
    fn create(&self) -> Result<Box<dyn SpillStore>> {
        Ok(match self.capacity {
            Some(cap) => Box::new(MemorySpill::with_capacity_limit(cap)),
            None => Box::new(MemorySpill::new()),
        })
    }
}
