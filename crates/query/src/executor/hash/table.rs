//! Batched hash table.
//!
//! Build rows are keyed by a 32-bit hash value. While the table fits in its
//! memory budget every row is resident. When an insert would exceed the
//! budget the table doubles its batch count: each row belongs to batch
//! `rotate_right(hash, log2_nbuckets) & (nbatch - 1)`, only the current batch
//! stays resident, and every other batch lives in its own spill file.
//!
//! After a doubling, rows of the resident batch and of every existing spill
//! file are re-partitioned at once, so a file never holds rows of another
//! batch. Every build row is in exactly one place at all times.
//!
//! The batch count is fixed once a batch other than the first is loaded; a
//! loaded batch larger than the budget stays resident over budget.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::hash::BuildHasher;
use hashbrown::HashMap;
use strata_core::{Error, Result, Row, Value};
use strata_storage::{SpillStore, SpilledTuple};

const DEFAULT_BUCKETS: usize = 1024;
const MAX_BUCKETS: usize = 1 << 20;
const MAX_BATCHES: usize = 1 << 31;

const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Hashes key values into the 32-bit hash the table is keyed by.
///
/// Per-key hashes are combined as `h = rotate_left(h, 1) ^ hash(key)`. A NULL
/// key makes the row unhashable unless `keep_nulls` is set, in which case it
/// contributes zero.
#[derive(Clone)]
pub struct KeyHasher {
    state: ahash::RandomState,
    keep_nulls: bool,
}

impl KeyHasher {
    pub fn new(keep_nulls: bool) -> Self {
        Self {
            state: ahash::RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
            keep_nulls,
        }
    }

    /// Hashes one non-NULL value.
    pub fn hash_value(&self, value: &Value) -> u32 {
        let h = BuildHasher::hash_one(&self.state, value);
        (h ^ (h >> 32)) as u32
    }

    /// Returns the combined hash of `values`, or None if a NULL key excludes
    /// the row.
    pub fn hash_values(&self, values: &[Value]) -> Option<u32> {
        let mut hash = 0u32;
        for value in values {
            hash = hash.rotate_left(1);
            if value.is_null() {
                if !self.keep_nulls {
                    return None;
                }
            } else {
                hash ^= self.hash_value(value);
            }
        }
        Some(hash)
    }
}

/// Sizing of a hash table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashTableConfig {
    /// Memory budget for resident rows, in bytes.
    pub work_mem: usize,
    /// Upper bound on `nbatch`; a power of two.
    pub max_batches: usize,
    /// Initial batch count; a power of two.
    pub nbatch: usize,
    /// Bucket count; a power of two, fixed for the table's lifetime.
    pub nbuckets: usize,
}

impl HashTableConfig {
    /// A single-batch table.
    pub fn new(work_mem: usize, max_batches: usize) -> Self {
        Self {
            work_mem,
            max_batches: max_batches.clamp(1, MAX_BATCHES).next_power_of_two(),
            nbatch: 1,
            nbuckets: DEFAULT_BUCKETS,
        }
    }

    /// Sizes a table for `rows` rows of about `width` bytes each, starting
    /// with enough batches for the estimate to fit the budget.
    pub fn for_estimate(work_mem: usize, max_batches: usize, rows: usize, width: usize) -> Self {
        let mut config = Self::new(work_mem, max_batches);
        config.nbuckets = rows.clamp(DEFAULT_BUCKETS, MAX_BUCKETS).next_power_of_two();
        let total = rows.saturating_mul(width.saturating_add(tuple_overhead()));
        if total > work_mem {
            let wanted = total.div_ceil(work_mem.max(1));
            config.nbatch = wanted.min(config.max_batches).next_power_of_two();
        }
        config
    }
}

/// Result of probing the table with a hash value.
#[derive(Debug, PartialEq)]
pub enum HashLookup<'t> {
    /// Build rows with this hash, in build order.
    Matches(Vec<&'t Row>),
    /// No build row has this hash.
    NoMatch,
    /// Rows with this hash belong to a batch that is not resident.
    BatchNotLoaded { batch: usize },
}

struct StoredTuple {
    hash: u32,
    row: Row,
}

fn tuple_overhead() -> usize {
    core::mem::size_of::<StoredTuple>() + core::mem::size_of::<usize>()
}

fn tuple_size(row: &Row) -> usize {
    row.estimated_size() + tuple_overhead()
}

/// Hash table with spill-backed batches.
pub struct HashTable {
    work_mem: usize,
    max_batches: usize,
    log2_nbuckets: u32,
    nbatch: usize,
    cur_batch: usize,
    growth_enabled: bool,
    /// Set by the first `load_batch` that switches batches.
    partitioning_fixed: bool,
    over_budget_logged: bool,
    /// Resident rows, in insertion order.
    tuples: Vec<StoredTuple>,
    /// Hash -> positions in `tuples`, in insertion order.
    buckets: HashMap<u32, Vec<usize>>,
    space_used: usize,
    space_peak: usize,
    spill: Box<dyn SpillStore>,
    spilled_tuples: u64,
    total_tuples: usize,
}

impl HashTable {
    pub fn new(config: HashTableConfig, spill: Box<dyn SpillStore>) -> Self {
        let nbuckets = config.nbuckets.max(1).next_power_of_two();
        Self {
            work_mem: config.work_mem,
            max_batches: config.max_batches.max(1).next_power_of_two(),
            log2_nbuckets: nbuckets.trailing_zeros(),
            nbatch: config.nbatch.max(1).next_power_of_two(),
            cur_batch: 0,
            growth_enabled: true,
            partitioning_fixed: false,
            over_budget_logged: false,
            tuples: Vec::new(),
            buckets: HashMap::new(),
            space_used: 0,
            space_peak: 0,
            spill,
            spilled_tuples: 0,
            total_tuples: 0,
        }
    }

    /// Returns the batch a hash value belongs to.
    #[inline]
    pub fn batch_of(&self, hash: u32) -> usize {
        if self.nbatch == 1 {
            return 0;
        }
        (hash.rotate_right(self.log2_nbuckets) as usize) & (self.nbatch - 1)
    }

    pub fn nbatch(&self) -> usize {
        self.nbatch
    }

    pub fn current_batch(&self) -> usize {
        self.cur_batch
    }

    /// Returns the number of rows accepted by `insert`.
    pub fn total_tuples(&self) -> usize {
        self.total_tuples
    }

    /// Returns the number of resident rows.
    pub fn resident_tuples(&self) -> usize {
        self.tuples.len()
    }

    /// Returns the number of distinct resident hash values.
    pub fn resident_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of rows in a batch's spill file.
    pub fn spilled_in_batch(&self, batch: usize) -> usize {
        self.spill.batch_len(batch)
    }

    pub fn space_used(&self) -> usize {
        self.space_used
    }

    pub fn space_peak(&self) -> usize {
        self.space_peak
    }

    pub fn spilled_tuples(&self) -> u64 {
        self.spilled_tuples
    }

    pub fn spill_bytes(&self) -> u64 {
        self.spill.bytes_written()
    }

    /// Returns false once batch growth has been given up.
    pub fn growth_enabled(&self) -> bool {
        self.growth_enabled
    }

    /// Adds a build row.
    pub fn insert(&mut self, hash: u32, row: Row) -> Result<()> {
        self.total_tuples += 1;
        self.route(hash, row)
    }

    /// Places a row in its batch: resident if current, else its spill file.
    fn route(&mut self, hash: u32, row: Row) -> Result<()> {
        loop {
            let batch = self.batch_of(hash);
            if batch != self.cur_batch {
                return self.spill_tuple(batch, hash, row);
            }
            let size = tuple_size(&row);
            match self.reserve(size) {
                Ok(()) => {
                    self.store(hash, row, size);
                    return Ok(());
                }
                Err(Error::MemoryBudgetExceeded { .. }) if self.can_grow() => {
                    self.increase_batches()?;
                }
                Err(Error::MemoryBudgetExceeded {
                    requested,
                    used,
                    budget,
                }) => {
                    if !self.over_budget_logged {
                        self.over_budget_logged = true;
                        tracing::warn!(
                            requested,
                            used,
                            budget,
                            nbatch = self.nbatch,
                            "hash table exceeds its memory budget"
                        );
                    }
                    self.store(hash, row, size);
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn reserve(&self, size: usize) -> Result<()> {
        if self.space_used + size > self.work_mem {
            return Err(Error::memory_budget_exceeded(size, self.space_used, self.work_mem));
        }
        Ok(())
    }

    fn can_grow(&self) -> bool {
        self.growth_enabled && !self.partitioning_fixed && self.nbatch < self.max_batches
    }

    fn store(&mut self, hash: u32, row: Row, size: usize) {
        let idx = self.tuples.len();
        self.tuples.push(StoredTuple { hash, row });
        self.buckets.entry(hash).or_default().push(idx);
        self.space_used += size;
        self.space_peak = self.space_peak.max(self.space_used);
    }

    fn spill_tuple(&mut self, batch: usize, hash: u32, row: Row) -> Result<()> {
        self.spill.append(batch, &SpilledTuple { hash, row })?;
        self.spilled_tuples += 1;
        tracing::trace!(batch, hash, "spilled hash tuple");
        Ok(())
    }

    /// Takes the resident rows out, leaving the table empty in memory.
    fn take_resident(&mut self) -> Vec<StoredTuple> {
        self.buckets.clear();
        self.space_used = 0;
        core::mem::take(&mut self.tuples)
    }

    /// Doubles `nbatch` and re-partitions resident rows and spill files.
    fn increase_batches(&mut self) -> Result<()> {
        let old_nbatch = self.nbatch;
        self.nbatch = old_nbatch * 2;

        let resident = self.take_resident();
        let before = resident.len();
        let mut freed = 0usize;
        for tuple in resident {
            let batch = self.batch_of(tuple.hash);
            if batch == self.cur_batch {
                let size = tuple_size(&tuple.row);
                self.store(tuple.hash, tuple.row, size);
            } else {
                freed += 1;
                self.spill_tuple(batch, tuple.hash, tuple.row)?;
            }
        }

        // Rows of batch b move to b or b + old_nbatch.
        for batch in 0..old_nbatch {
            if batch == self.cur_batch || self.spill.batch_len(batch) == 0 {
                continue;
            }
            for tuple in self.spill.take_batch(batch)? {
                let target = self.batch_of(tuple.hash);
                self.spill_tuple(target, tuple.hash, tuple.row)?;
            }
        }

        tracing::debug!(
            old_nbatch,
            nbatch = self.nbatch,
            freed,
            resident = before - freed,
            "increased hash batches"
        );
        if freed == 0 || freed == before {
            self.growth_enabled = false;
            tracing::warn!(
                nbatch = self.nbatch,
                resident = before,
                freed,
                "disabling hash table growth: batch split was ineffective"
            );
        }
        Ok(())
    }

    /// Probes the resident batch.
    pub fn lookup(&self, hash: u32) -> HashLookup<'_> {
        let batch = self.batch_of(hash);
        if batch != self.cur_batch {
            if self.spill.batch_len(batch) == 0 {
                return HashLookup::NoMatch;
            }
            return HashLookup::BatchNotLoaded { batch };
        }
        match self.buckets.get(&hash) {
            Some(positions) => {
                HashLookup::Matches(positions.iter().map(|&i| &self.tuples[i].row).collect())
            }
            None => HashLookup::NoMatch,
        }
    }

    /// Makes `batch` resident, writing the current batch to its spill file.
    pub fn load_batch(&mut self, batch: usize) -> Result<()> {
        if batch >= self.nbatch {
            return Err(Error::invalid_state(
                "Hash",
                "load a batch into",
                "partitioned into fewer batches",
            ));
        }
        if batch == self.cur_batch {
            return Ok(());
        }

        self.partitioning_fixed = true;
        let outgoing = self.cur_batch;
        for tuple in self.take_resident() {
            self.spill_tuple(outgoing, tuple.hash, tuple.row)?;
        }
        self.cur_batch = batch;
        for tuple in self.spill.take_batch(batch)? {
            self.route(tuple.hash, tuple.row)?;
        }
        tracing::debug!(from = outgoing, to = batch, resident = self.tuples.len(), "loaded hash batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use strata_storage::MemorySpill;

    fn table(work_mem: usize) -> HashTable {
        HashTable::new(HashTableConfig::new(work_mem, 64), Box::new(MemorySpill::new()))
    }

    fn int_row(v: i64) -> Row {
        Row::new(vec![Value::Int64(v), Value::String("padding-padding".into())])
    }

    fn first_value(row: &Row) -> i64 {
        row.get(0).and_then(Value::as_i64).unwrap()
    }

    /// Collects every row, batch by batch, as (hash, value) pairs.
    fn drain_all(table: &mut HashTable, hashes: &[u32]) -> Vec<i64> {
        let mut seen = Vec::new();
        for batch in 0..table.nbatch() {
            table.load_batch(batch).unwrap();
            for &h in hashes {
                if table.batch_of(h) != batch {
                    continue;
                }
                if let HashLookup::Matches(rows) = table.lookup(h) {
                    seen.extend(rows.into_iter().map(first_value));
                }
            }
        }
        seen
    }

    #[test]
    fn test_key_hasher_nulls() {
        let hasher = KeyHasher::new(false);
        assert!(hasher.hash_values(&[Value::Int64(1), Value::Null]).is_none());

        let keep = KeyHasher::new(true);
        let h = keep.hash_values(&[Value::Int64(1), Value::Null]).unwrap();
        assert_eq!(h, keep.hash_value(&Value::Int64(1)).rotate_left(1));
        assert_eq!(keep.hash_values(&[Value::Null]), Some(0));
    }

    #[test]
    fn test_key_hasher_is_deterministic() {
        let a = KeyHasher::new(false);
        let b = KeyHasher::new(false);
        let key = [Value::String("k".into()), Value::Int32(4)];
        assert_eq!(a.hash_values(&key), b.hash_values(&key));
        assert_ne!(
            a.hash_values(&[Value::Int64(1), Value::Int64(2)]),
            a.hash_values(&[Value::Int64(2), Value::Int64(1)])
        );
    }

    #[test]
    fn test_lookup_returns_build_order() {
        let mut t = table(usize::MAX);
        t.insert(7, int_row(1)).unwrap();
        t.insert(9, int_row(2)).unwrap();
        t.insert(7, int_row(3)).unwrap();
        assert_eq!(t.resident_buckets(), 2);

        match t.lookup(7) {
            HashLookup::Matches(rows) => {
                assert_eq!(rows.into_iter().map(first_value).collect::<Vec<_>>(), vec![1, 3])
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(t.lookup(8), HashLookup::NoMatch);
    }

    #[test]
    fn test_empty_table_has_no_matches() {
        let t = table(1024);
        assert_eq!(t.lookup(0), HashLookup::NoMatch);
        assert_eq!(t.lookup(u32::MAX), HashLookup::NoMatch);
    }

    #[test]
    fn test_budget_overflow_spills_without_loss() {
        let budget = tuple_size(&int_row(0)) * 8;
        let mut t = table(budget);
        let hashes: Vec<u32> = (0..100u32).map(|i| i.wrapping_mul(0x9e37_79b9)).collect();
        for (i, &h) in hashes.iter().enumerate() {
            t.insert(h, int_row(i as i64)).unwrap();
        }
        assert!(t.nbatch() > 1);
        assert!(t.spilled_tuples() > 0);
        assert_eq!(t.total_tuples(), 100);

        let mut distinct = hashes.clone();
        distinct.sort_unstable();
        distinct.dedup();
        let mut seen = drain_all(&mut t, &distinct);
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_batch_files_hold_only_their_rows() {
        let budget = tuple_size(&int_row(0)) * 4;
        let mut t = table(budget);
        let hashes: Vec<u32> = (0..64u32).map(|i| i.wrapping_mul(0x85eb_ca6b)).collect();
        for (i, &h) in hashes.iter().enumerate() {
            t.insert(h, int_row(i as i64)).unwrap();
        }
        let expected: usize = (1..t.nbatch())
            .map(|b| hashes.iter().filter(|&&h| t.batch_of(h) == b).count())
            .sum();
        let spilled: usize = (1..t.nbatch()).map(|b| t.spilled_in_batch(b)).sum();
        assert_eq!(spilled, expected);
        assert_eq!(t.resident_tuples() + spilled, 64);
    }

    #[test]
    fn test_probe_other_batch_reports_not_loaded() {
        let mut t = HashTable::new(
            HashTableConfig {
                nbatch: 2,
                ..HashTableConfig::new(usize::MAX, 64)
            },
            Box::new(MemorySpill::new()),
        );
        // With 1024 buckets, bit 10 picks the batch.
        let in_batch_one = 1u32 << 10;
        assert_eq!(t.batch_of(in_batch_one), 1);
        t.insert(in_batch_one, int_row(5)).unwrap();
        assert_eq!(t.lookup(in_batch_one), HashLookup::BatchNotLoaded { batch: 1 });

        t.load_batch(1).unwrap();
        assert_eq!(t.current_batch(), 1);
        assert!(matches!(t.lookup(in_batch_one), HashLookup::Matches(ref rows) if rows.len() == 1));
        assert!(t.load_batch(2).is_err());
    }

    #[test]
    fn test_identical_hashes_disable_growth() {
        let budget = tuple_size(&int_row(0)) * 2;
        let mut t = table(budget);
        for i in 0..10 {
            t.insert(42, int_row(i)).unwrap();
        }
        assert!(!t.growth_enabled());
        assert_eq!(t.total_tuples(), 10);
        let mut seen = drain_all(&mut t, &[42]);
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_estimate_sets_initial_batches() {
        let config = HashTableConfig::for_estimate(1024, 64, 1000, 100);
        assert!(config.nbatch > 1);
        assert!(config.nbatch.is_power_of_two());
        assert_eq!(HashTableConfig::for_estimate(1 << 30, 64, 1000, 100).nbatch, 1);
        assert_eq!(HashTableConfig::for_estimate(1, 8, 1 << 20, 100).nbatch, 8);
    }

    #[test]
    fn test_estimate_saturates_on_huge_inputs() {
        let config = HashTableConfig::for_estimate(1 << 20, 64, usize::MAX, 100);
        assert_eq!(config.nbuckets, MAX_BUCKETS);
        assert_eq!(config.nbatch, 64);

        let config = HashTableConfig::for_estimate(1, 64, 1 << 40, 1 << 30);
        assert_eq!(config.nbatch, 64);

        let config = HashTableConfig::new(1024, usize::MAX);
        assert_eq!(config.max_batches, MAX_BATCHES);
    }
}
