//! Property-based tests for core types using proptest.

use proptest::prelude::*;
use strata_core::{Tid, Value};

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        any::<i64>().prop_map(Value::Int64),
        any::<f64>().prop_map(Value::Float64),
        "[a-z]{0,8}".prop_map(Value::String),
    ]
}

proptest! {
    #[test]
    fn tid_encoding_preserves_order(a in (any::<u32>(), 1u16..), b in (any::<u32>(), 1u16..)) {
        let (a, b) = (Tid::new(a.0, a.1), Tid::new(b.0, b.1));
        prop_assert_eq!(a.cmp(&b), a.to_bytes().cmp(&b.to_bytes()));
    }

    #[test]
    fn tid_decoding_rejects_short_input(bytes in prop::collection::vec(any::<u8>(), 0..6)) {
        prop_assert!(Tid::from_bytes(&bytes).is_err());
    }

    #[test]
    fn value_order_is_total(a in value_strategy(), b in value_strategy(), c in value_strategy()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        if a <= b && b <= c {
            prop_assert!(a <= c);
        }
    }

    #[test]
    fn null_sorts_first(v in value_strategy()) {
        prop_assert!(Value::Null <= v);
    }
}
