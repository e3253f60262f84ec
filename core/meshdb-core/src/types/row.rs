//! Row representation and the row codec.
//!
//! A row is an unordered mapping from column name to a dynamically typed
//! scalar. `BTreeMap` keeps iteration deterministic, which the union
//! dedup and the row codec both rely on.

use crate::error::MeshResult;
use crate::types::Value;
use std::collections::BTreeMap;

/// Column name → value. Row ordering in a result is significant only
/// after Sort.
pub type Row = BTreeMap<String, Value>;

/// Build a row from `(name, value)` pairs.
pub fn row_from_pairs<I, S>(pairs: I) -> Row
where
    I: IntoIterator<Item = (S, Value)>,
    S: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Serialise a row as JSON bytes (the storage format for the KV backend
/// and the backup exporter).
pub fn encode_row(row: &Row) -> MeshResult<Vec<u8>> {
    let mut obj = serde_json::Map::with_capacity(row.len());
    for (k, v) in row {
        obj.insert(k.clone(), v.to_json());
    }
    Ok(serde_json::to_vec(&serde_json::Value::Object(obj))?)
}

/// Decode a row from JSON bytes.
pub fn decode_row(bytes: &[u8]) -> MeshResult<Row> {
    let json: serde_json::Value = serde_json::from_slice(bytes)?;
    let obj = json.as_object().ok_or_else(|| {
        crate::error::MeshError::Serialization("row must decode to a JSON object".to_string())
    })?;
    let mut row = Row::new();
    for (k, v) in obj {
        row.insert(k.clone(), Value::from_json(v)?);
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trip() {
        let row = row_from_pairs([
            ("id", Value::Int64(7)),
            ("name", Value::Str("Alice".to_string())),
            ("score", Value::Float64(0.5)),
            ("active", Value::Bool(true)),
            ("note", Value::Null),
            ("blob", Value::Bytes(vec![1, 2, 3])),
            ("seen_at", Value::Timestamp(1_700_000_000_000)),
            ("embedding", Value::Vector(vec![0.1, 0.2])),
        ]);
        let encoded = encode_row(&row).unwrap();
        assert_eq!(decode_row(&encoded).unwrap(), row);
    }

    #[test]
    fn decode_rejects_non_object() {
        assert!(decode_row(b"[1,2,3]").is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_value() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<i64>().prop_map(Value::Int64),
                // finite floats only; NaN breaks equality, not the codec,
                // and -0.0 normalises so keys agree with ==
                (-1e15f64..1e15f64)
                    .prop_map(|f| Value::Float64(if f == 0.0 { 0.0 } else { f })),
                any::<bool>().prop_map(Value::Bool),
                "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::Str),
                proptest::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
                any::<i64>().prop_map(Value::Timestamp),
                proptest::collection::vec(-1e6f32..1e6f32, 0..8).prop_map(Value::Vector),
            ]
        }

        proptest! {
            #[test]
            fn codec_round_trips_any_row(
                cells in proptest::collection::btree_map("[a-z_]{1,12}", arb_value(), 0..12)
            ) {
                let row: Row = cells;
                let encoded = encode_row(&row).unwrap();
                prop_assert_eq!(decode_row(&encoded).unwrap(), row);
            }

            #[test]
            fn hash_key_agrees_with_equality(a in arb_value(), b in arb_value()) {
                use crate::types::hash_key;
                // equal keys iff equal canonical values
                prop_assert_eq!(hash_key(&a) == hash_key(&b), a == b);
            }
        }
    }
}
