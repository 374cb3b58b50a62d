//! Property round-trips for every format.
//!
//! Binary formats that do not preserve integer signedness (msgpack, cbor)
//! and JSON (no byte kind, no signedness) compare against a normalized
//! expectation; taglen and symbin round-trip exactly.

use manifold_core::{from_slice, to_vec, Handle, Value};
use manifold_format::{Cbor, Json, Msgpack, Symbin, Taglen};
use proptest::prelude::*;

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<u64>().prop_map(Value::Uint),
        (-1.0e9f64..1.0e9f64).prop_map(Value::Float),
        "[a-z]{0,8}".prop_map(Value::Str),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Seq),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..4).prop_map(|kvs| {
                Value::Map(
                    kvs.into_iter()
                        .map(|(k, v)| (Value::Str(k), v))
                        .collect(),
                )
            }),
        ]
    })
}

/// Non-negative integers surface as `Int` when they fit.
fn normalize_signedness(v: &Value) -> Value {
    match v {
        Value::Uint(u) if *u <= i64::MAX as u64 => Value::Int(*u as i64),
        Value::Seq(items) => Value::Seq(items.iter().map(normalize_signedness).collect()),
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, val)| (normalize_signedness(k), normalize_signedness(val)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// JSON additionally has no byte kind: byte strings decode as numbers.
fn normalize_json(v: &Value) -> Value {
    match v {
        Value::Bytes(b) => Value::Seq(b.iter().map(|&x| Value::Int(x as i64)).collect()),
        Value::Seq(items) => Value::Seq(items.iter().map(normalize_json).collect()),
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, val)| (normalize_json(k), normalize_json(val)))
                .collect(),
        ),
        other => normalize_signedness(other),
    }
}

proptest! {
    #[test]
    fn prop_taglen_roundtrip_exact(v in value_strategy()) {
        let h = Handle::new();
        let bytes = to_vec(&Taglen, &h, &v).unwrap();
        prop_assert_eq!(from_slice(&Taglen, &h, &bytes).unwrap(), v);
    }

    #[test]
    fn prop_symbin_roundtrip_exact(v in value_strategy()) {
        let h = Handle::new();
        let bytes = to_vec(&Symbin, &h, &v).unwrap();
        prop_assert_eq!(from_slice(&Symbin, &h, &bytes).unwrap(), v);
    }

    #[test]
    fn prop_msgpack_roundtrip(v in value_strategy()) {
        let h = Handle::new();
        let bytes = to_vec(&Msgpack, &h, &v).unwrap();
        prop_assert_eq!(from_slice(&Msgpack, &h, &bytes).unwrap(), normalize_signedness(&v));
    }

    #[test]
    fn prop_cbor_roundtrip(v in value_strategy()) {
        let h = Handle::new();
        let bytes = to_vec(&Cbor, &h, &v).unwrap();
        prop_assert_eq!(from_slice(&Cbor, &h, &bytes).unwrap(), normalize_signedness(&v));
    }

    #[test]
    fn prop_json_roundtrip(v in value_strategy()) {
        let h = Handle::new();
        let bytes = to_vec(&Json, &h, &v).unwrap();
        prop_assert_eq!(from_slice(&Json, &h, &bytes).unwrap(), normalize_json(&v));
    }

    #[test]
    fn prop_canonical_output_is_order_independent(
        mut kvs in prop::collection::hash_map("[a-z]{1,6}", any::<i64>(), 2..6)
    ) {
        let h = Handle::new().with_canonical(true);
        let forward: Vec<(Value, Value)> = kvs
            .drain()
            .map(|(k, v)| (Value::Str(k), Value::Int(v)))
            .collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        for format in manifold_format::ALL {
            let a = to_vec(format, &h, &Value::Map(forward.clone())).unwrap();
            let b = to_vec(format, &h, &Value::Map(reversed.clone())).unwrap();
            prop_assert_eq!(&a, &b, "format {}", format.name());
        }
    }
}
