//! Property-based tests for the batched hash table.
//!
//! Whatever the budget and hash distribution, every build row must be found
//! exactly once when the batches are loaded in turn.

use proptest::prelude::*;
use strata_core::{Row, Value};
use strata_query::executor::{HashLookup, HashTable, HashTableConfig, KeyHasher};
use strata_storage::MemorySpill;

/// Hashes drawn from a small pool so collisions and repeats are common.
fn hashes_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(
        prop_oneof![
            (0u32..16).prop_map(|i| i << 10),
            any::<u32>(),
        ],
        0..300,
    )
}

fn row(id: usize) -> Row {
    Row::new(vec![Value::Int64(id as i64), Value::String("payload".into())])
}

fn drain(table: &mut HashTable, hashes: &[u32]) -> Vec<i64> {
    let mut distinct = hashes.to_vec();
    distinct.sort_unstable();
    distinct.dedup();

    let mut seen = Vec::new();
    for batch in 0..table.nbatch() {
        table.load_batch(batch).unwrap();
        for &h in &distinct {
            if table.batch_of(h) != batch {
                continue;
            }
            match table.lookup(h) {
                HashLookup::Matches(rows) => {
                    seen.extend(rows.iter().map(|r| r.get(0).and_then(Value::as_i64).unwrap()))
                }
                HashLookup::NoMatch => {}
                HashLookup::BatchNotLoaded { batch } => panic!("batch {} should be resident", batch),
            }
        }
    }
    seen
}

proptest! {
    #[test]
    fn every_row_is_found_once(hashes in hashes_strategy(), budget_rows in 1usize..40, max_batches in 1usize..64) {
        let budget = budget_rows * 128;
        let mut table = HashTable::new(
            HashTableConfig::new(budget, max_batches),
            Box::new(MemorySpill::new()),
        );
        for (id, &h) in hashes.iter().enumerate() {
            table.insert(h, row(id)).unwrap();
        }
        prop_assert_eq!(table.total_tuples(), hashes.len());
        prop_assert!(table.nbatch().is_power_of_two());
        prop_assert!(table.nbatch() <= max_batches.next_power_of_two());

        let mut seen = drain(&mut table, &hashes);
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..hashes.len() as i64).collect::<Vec<_>>());
    }

    #[test]
    fn rows_with_equal_hash_keep_build_order(count in 1usize..50) {
        let mut table = HashTable::new(HashTableConfig::new(usize::MAX, 1), Box::new(MemorySpill::new()));
        for id in 0..count {
            table.insert(77, row(id)).unwrap();
        }
        match table.lookup(77) {
            HashLookup::Matches(rows) => {
                let ids: Vec<i64> = rows.iter().map(|r| r.get(0).and_then(Value::as_i64).unwrap()).collect();
                prop_assert_eq!(ids, (0..count as i64).collect::<Vec<_>>());
            }
            other => prop_assert!(false, "unexpected lookup {:?}", other),
        }
    }

    #[test]
    fn key_hash_is_deterministic(a in any::<i64>(), b in any::<i64>()) {
        let hasher = KeyHasher::new(false);
        let one = hasher.hash_values(&[Value::Int64(a), Value::Int64(b)]);
        let two = hasher.hash_values(&[Value::Int64(a), Value::Int64(b)]);
        prop_assert_eq!(one, two);
        prop_assert!(hasher.hash_values(&[Value::Int64(a), Value::Null]).is_none());
    }
}
