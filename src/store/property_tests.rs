//! Property-based tests for store invariants.
//!
//! # Tested Invariants
//!
//! - `set` then `get` returns the value that was set
//! - `delete` then `get` is absent, and deleting twice equals deleting once
//! - The version equals the number of observable map changes

use super::*;
use proptest::prelude::*;
use serde_json::Value;
use std::collections::HashSet;

// ============================================================================
// Test Strategies - Input Generation
// ============================================================================

/// Strategy for generating store keys.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

/// Strategy for generating arbitrary JSON values (finite numbers only).
fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (-1.0e9f64..1.0e9).prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

#[derive(Debug, Clone)]
enum Op {
    Set(String, Value),
    Delete(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (key_strategy(), json_strategy()).prop_map(|(k, v)| Op::Set(k, v)),
        key_strategy().prop_map(Op::Delete),
    ]
}

proptest! {
    #[test]
    fn prop_set_then_get_returns_value(key in key_strategy(), value in json_strategy()) {
        let store = Store::new();
        store.set(&key, &value).unwrap();
        prop_assert_eq!(store.get(&key).unwrap(), Some(value));
    }

    #[test]
    fn prop_delete_is_idempotent(key in key_strategy(), value in json_strategy()) {
        let store = Store::builder().versioning(true).build().unwrap();
        store.set(&key, value).unwrap();

        prop_assert!(store.delete(&key).unwrap());
        let after_first = store.version();
        prop_assert!(!store.delete(&key).unwrap());

        prop_assert_eq!(store.get(&key).unwrap(), None);
        prop_assert_eq!(store.version(), after_first);
    }

    #[test]
    fn prop_version_counts_observable_changes(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let store = Store::builder().versioning(true).build().unwrap();
        let mut present = HashSet::new();
        let mut expected = 0i64;

        for op in ops {
            match op {
                Op::Set(key, value) => {
                    store.set(&key, value).unwrap();
                    present.insert(key);
                    expected += 1;
                },
                Op::Delete(key) => {
                    store.delete(&key).unwrap();
                    if present.remove(&key) {
                        expected += 1;
                    }
                },
            }
        }

        prop_assert_eq!(store.version(), expected);
        prop_assert_eq!(store.len(), present.len());
    }
}
