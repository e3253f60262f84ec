//! Dynamically typed scalar values.
//!
//! Every cell in a row is a `Value`. Numeric widths normalise to
//! `Int64`/`Float64` on ingest so equality and hashing behave the same
//! regardless of the width a source handed us.

use crate::error::{MeshError, MeshResult};
use serde::de::{Deserializer, Error as DeError};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A dynamically typed scalar stored in a row cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    /// Milliseconds since the Unix epoch
    Timestamp(i64),
    /// Dense vector of 32-bit floats (vector columns)
    Vector(Vec<f32>),
}

impl Value {
    /// Short type name used in error messages and schema checks.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Vector(_) => "vector",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used by aggregates and arithmetic. Bools are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Float64(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// SQL-style total order: nulls compare less than non-nulls, numbers
    /// compare numerically across `Int64`/`Float64`, everything else
    /// compares within its own type. Mismatched types fall back to a
    /// stable rank so sorting never panics.
    pub fn compare(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Int64(a), Int64(b)) => a.cmp(b),
            (Int64(a), Float64(b)) => cmp_f64(*a as f64, *b),
            (Float64(a), Int64(b)) => cmp_f64(*a, *b as f64),
            (Float64(a), Float64(b)) => cmp_f64(*a, *b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Vector(a), Vector(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match cmp_f64(f64::from(*x), f64::from(*y)) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Loose equality used by filters: numeric equality holds across
    /// `Int64`/`Float64`; other types must match exactly.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int64(_) | Value::Float64(_), Value::Int64(_) | Value::Float64(_)) => {
                self.compare(other) == Ordering::Equal
            }
            _ => self == other,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int64(_) | Value::Float64(_) => 2,
            Value::Timestamp(_) => 3,
            Value::Str(_) => 4,
            Value::Bytes(_) => 5,
            Value::Vector(_) => 6,
        }
    }

    /// Encode to a JSON value. Plain scalars map to native JSON; bytes,
    /// timestamps and vectors use single-key wrapper objects so decode
    /// can reconstruct the original tag.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int64(i) => json!(i),
            Value::Float64(f) => json!(f),
            Value::Bool(b) => json!(b),
            Value::Str(s) => json!(s),
            Value::Bytes(b) => json!({ "$bytes": hex_encode(b) }),
            Value::Timestamp(ts) => json!({ "$ts": ts }),
            Value::Vector(v) => json!({ "$vec": v }),
        }
    }

    /// Decode from a JSON value. JSON numbers become `Int64` when the
    /// source text was integral, `Float64` otherwise.
    pub fn from_json(json: &serde_json::Value) -> MeshResult<Value> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int64(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float64(f))
                } else {
                    Err(MeshError::Serialization(format!(
                        "number out of range: {n}"
                    )))
                }
            }
            serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
            serde_json::Value::Object(map) if map.len() == 1 => {
                if let Some(b) = map.get("$bytes") {
                    let s = b.as_str().ok_or_else(|| {
                        MeshError::Serialization("$bytes must be a hex string".to_string())
                    })?;
                    Ok(Value::Bytes(hex_decode(s)?))
                } else if let Some(ts) = map.get("$ts") {
                    let i = ts.as_i64().ok_or_else(|| {
                        MeshError::Serialization("$ts must be an integer".to_string())
                    })?;
                    Ok(Value::Timestamp(i))
                } else if let Some(v) = map.get("$vec") {
                    let arr = v.as_array().ok_or_else(|| {
                        MeshError::Serialization("$vec must be an array".to_string())
                    })?;
                    let mut out = Vec::with_capacity(arr.len());
                    for item in arr {
                        let f = item.as_f64().ok_or_else(|| {
                            MeshError::Serialization("$vec element must be a number".to_string())
                        })?;
                        out.push(f as f32);
                    }
                    Ok(Value::Vector(out))
                } else {
                    Err(MeshError::Serialization(format!(
                        "unrecognised value wrapper: {json}"
                    )))
                }
            }
            other => Err(MeshError::Serialization(format!(
                "cannot decode value from {other}"
            ))),
        }
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "0x{}", hex_encode(b)),
            Value::Timestamp(ts) => write!(f, "{ts}"),
            Value::Vector(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&json).map_err(D::Error::custom)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Type-aware hash key: `<tag>:<canonical-string>`.
///
/// The string "1", the integer 1 and the float 1.0 all produce distinct
/// keys; all integer widths share the `i` tag so numeric equality holds
/// across width. Null has its own non-empty key.
pub fn hash_key(value: &Value) -> String {
    match value {
        Value::Null => "n:".to_string(),
        Value::Int64(i) => format!("i:{i}"),
        Value::Float64(f) => format!("f:{f:?}"),
        Value::Bool(b) => format!("b:{b}"),
        Value::Str(s) => format!("s:{s}"),
        Value::Bytes(b) => format!("x:{}", hex_encode(b)),
        Value::Timestamp(ts) => format!("t:{ts}"),
        Value::Vector(v) => {
            let joined: Vec<String> = v.iter().map(|f| format!("{f:?}")).collect();
            format!("v:{}", joined.join(","))
        }
    }
}

/// Multi-column hash key: per-column keys joined with `|`. Column order
/// is significant.
pub fn multi_hash_key(values: &[&Value]) -> String {
    let parts: smallvec::SmallVec<[String; 4]> = values.iter().map(|v| hash_key(v)).collect();
    parts.join("|")
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub(crate) fn hex_decode(s: &str) -> MeshResult<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(MeshError::Serialization(
            "hex string has odd length".to_string(),
        ));
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    for i in (0..s.len()).step_by(2) {
        let byte = u8::from_str_radix(&s[i..i + 2], 16)
            .map_err(|e| MeshError::Serialization(format!("bad hex: {e}")))?;
        out.push(byte);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_key_distinguishes_types() {
        // int 1, string "1", float 1.0, true and nil must all differ
        let keys = [
            hash_key(&Value::Int64(1)),
            hash_key(&Value::Str("1".to_string())),
            hash_key(&Value::Float64(1.0)),
            hash_key(&Value::Bool(true)),
            hash_key(&Value::Null),
        ];
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                assert_ne!(keys[i], keys[j], "{} vs {}", keys[i], keys[j]);
            }
        }
    }

    #[test]
    fn hash_key_int_widths_agree() {
        // i32 and i64 normalise to Int64, so 42 hashes identically
        assert_eq!(
            hash_key(&Value::from(42i32)),
            hash_key(&Value::from(42i64))
        );
    }

    #[test]
    fn hash_key_null_is_non_empty() {
        assert!(!hash_key(&Value::Null).is_empty());
    }

    #[test]
    fn multi_key_order_is_significant() {
        let a = Value::Int64(1);
        let b = Value::Str("x".to_string());
        assert_ne!(multi_hash_key(&[&a, &b]), multi_hash_key(&[&b, &a]));
    }

    #[test]
    fn compare_nulls_first() {
        assert_eq!(Value::Null.compare(&Value::Int64(0)), Ordering::Less);
        assert_eq!(Value::Int64(0).compare(&Value::Null), Ordering::Greater);
        assert_eq!(Value::Null.compare(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn compare_cross_width_numeric() {
        assert_eq!(Value::Int64(2).compare(&Value::Float64(2.0)), Ordering::Equal);
        assert_eq!(Value::Int64(2).compare(&Value::Float64(2.5)), Ordering::Less);
    }

    #[test]
    fn loose_equality_numeric_only() {
        assert!(Value::Int64(1).loosely_equals(&Value::Float64(1.0)));
        assert!(!Value::Int64(1).loosely_equals(&Value::Str("1".to_string())));
    }

    #[test]
    fn json_round_trip_scalars() {
        let values = vec![
            Value::Null,
            Value::Int64(-7),
            Value::Float64(3.25),
            Value::Bool(true),
            Value::Str("héllo".to_string()),
        ];
        for v in values {
            let json = v.to_json();
            assert_eq!(Value::from_json(&json).unwrap(), v);
        }
    }

    #[test]
    fn json_round_trip_wrapped() {
        let values = vec![
            Value::Bytes(vec![0, 1, 254, 255]),
            Value::Timestamp(1_700_000_000_000),
            Value::Vector(vec![1.0, -0.5, 2.25]),
        ];
        for v in values {
            let json = v.to_json();
            assert_eq!(Value::from_json(&json).unwrap(), v);
        }
    }

    #[test]
    fn hex_round_trip() {
        let data = vec![0u8, 15, 16, 255];
        assert_eq!(hex_decode(&hex_encode(&data)).unwrap(), data);
    }
}
