//! The dynamically-typed attribute value tree.
//!
//! Maps use a `BTreeMap` rather than `HashMap` so iteration is already
//! key-sorted — the diff-details formatting in the comparers needs
//! key-sorted output and shouldn't have to re-sort at format time.

use std::collections::BTreeMap;

use serde_json::Value as Json;

/// A primitive, sequence, or mapping produced by evaluating HCL or by
/// reading a cloud API response. Round-trips through JSON semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_empty_ish(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Seq(v) => v.is_empty(),
            Value::Map(m) => m.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(v) => Some(v),
            _ => None,
        }
    }

    /// Best-effort conversion to `f64`, accepting numeric strings too —
    /// used by the generic comparer's numeric-tolerance rule.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Best-effort conversion to `i64`, accepting integer-valued floats
    /// and numeric strings — used by block-device field canonicalization.
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Float64(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn map_from(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Value::Map(entries.into_iter().collect())
    }

    /// Numeric-collapse rule: a float that compares equal to its own
    /// truncation is emitted as `Int64`.
    pub fn from_f64(f: f64) -> Self {
        if f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64 {
            Value::Int64(f as i64)
        } else {
            Value::Float64(f)
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int64(i) => Json::Number((*i).into()),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Seq(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(m) => {
                Json::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }

    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    Value::from_f64(f)
                } else {
                    Value::Null
                }
            }
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Seq(items.iter().map(Value::from_json).collect()),
            Json::Object(m) => {
                Value::Map(m.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
            }
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let json = Json::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_preserves_structure() {
        let v = Value::map_from([
            ("name".to_string(), Value::string("web")),
            ("count".to_string(), Value::Int64(3)),
            (
                "tags".to_string(),
                Value::map_from([("Env".to_string(), Value::string("prod"))]),
            ),
            (
                "ports".to_string(),
                Value::Seq(vec![Value::Int64(80), Value::Int64(443)]),
            ),
        ]);

        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn integer_valued_float_collapses_to_int64() {
        assert_eq!(Value::from_f64(8.0), Value::Int64(8));
        assert_eq!(Value::from_f64(8.5), Value::Float64(8.5));
    }

    #[test]
    fn empty_variants_are_empty_ish() {
        assert!(Value::Null.is_empty_ish());
        assert!(Value::String(String::new()).is_empty_ish());
        assert!(Value::Seq(vec![]).is_empty_ish());
        assert!(Value::Map(BTreeMap::new()).is_empty_ish());
        assert!(!Value::Int64(0).is_empty_ish());
    }
}
