//! The default, kind-agnostic comparison rules:
//! existence, type coercion, numeric tolerance, recursive maps, and
//! slice comparison (ordered for sequences of scalars, unordered-by-key
//! for sequences of maps).

use std::collections::BTreeMap;

use crate::error::DriftError;
use crate::model::{AttributeDiff, ComparisonResult};
use crate::value::Value;

use super::Comparer;

const NUMERIC_TOLERANCE: f64 = 1e-9;

pub struct GenericComparer;

impl Comparer for GenericComparer {
    fn compare(
        &self,
        desired: &BTreeMap<String, Value>,
        actual: &BTreeMap<String, Value>,
    ) -> Result<Vec<AttributeDiff>, DriftError> {
        Ok(diff_maps("", desired, actual))
    }
}

/// Compare every key present in `desired` against `actual`, producing one
/// `AttributeDiff` per attribute that differs. Keys absent from `desired`
/// are not compared — drift detection only checks what IaC declares.
pub fn diff_maps(prefix: &str, desired: &BTreeMap<String, Value>, actual: &BTreeMap<String, Value>) -> Vec<AttributeDiff> {
    let mut diffs = Vec::new();
    for (key, expected) in desired {
        let full_key = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
        let actual_value = actual.get(key).cloned().unwrap_or(Value::Null);
        if let Some(details) = diff_value(expected, &actual_value) {
            diffs.push(AttributeDiff {
                attribute_name: full_key,
                expected_value: expected.clone(),
                actual_value,
                details: Some(details),
            });
        }
    }
    diffs
}

/// Returns `None` when the two values are equivalent under the rules
/// below, or `Some(details)` describing the mismatch.
pub fn diff_value(expected: &Value, actual: &Value) -> Option<String> {
    // Existence / empty-equivalence: an absent attribute and an
    // empty-ish one (empty string, empty seq, empty map) are equal.
    if expected.is_empty_ish() && actual.is_empty_ish() {
        return None;
    }

    match (expected, actual) {
        (Value::Map(e), Value::Map(a)) => {
            let nested = diff_maps("", e, a);
            if nested.is_empty() {
                None
            } else {
                Some(
                    nested
                        .iter()
                        .map(|d| format!("{}: expected {:?}, actual {:?}", d.attribute_name, d.expected_value, d.actual_value))
                        .collect::<Vec<_>>()
                        .join(", "),
                )
            }
        }
        (Value::Seq(e), Value::Seq(a)) => diff_seq(e, a),
        _ => {
            if let (Some(e), Some(a)) = (expected.as_numeric(), actual.as_numeric()) {
                if (e - a).abs() <= NUMERIC_TOLERANCE {
                    return None;
                }
                return Some(format!("expected {e}, actual {a}"));
            }
            if expected == actual {
                None
            } else {
                Some(format!("expected {expected:?}, actual {actual:?}"))
            }
        }
    }
}

/// Sequences of scalars compare ordered; sequences of maps compare
/// unordered, matched by recursively diffing every pair and accepting
/// the assignment with fewest differences (cheap enough at the small
/// cardinalities these resources have — tags, security groups, block
/// devices).
fn diff_seq(expected: &[Value], actual: &[Value]) -> Option<String> {
    if expected.len() != actual.len() {
        return Some(format!("expected {} items, actual {}", expected.len(), actual.len()));
    }
    if expected.is_empty() {
        return None;
    }

    let all_maps = expected.iter().all(|v| matches!(v, Value::Map(_))) && actual.iter().all(|v| matches!(v, Value::Map(_)));

    if !all_maps {
        for (e, a) in expected.iter().zip(actual.iter()) {
            if diff_value(e, a).is_some() {
                return Some(format!("expected {expected:?}, actual {actual:?}"));
            }
        }
        return None;
    }

    let mut remaining: Vec<&Value> = actual.iter().collect();
    for e in expected {
        let position = remaining.iter().position(|a| diff_value(e, a).is_none());
        match position {
            Some(i) => {
                remaining.remove(i);
            }
            None => return Some(format!("expected {expected:?}, actual {actual:?}")),
        }
    }
    None
}

/// Summarize a generic comparison into a `ComparisonResult`, used by
/// kinds without overrides and by the engine for unmatched resources.
pub fn classify(
    kind: crate::model::ResourceKind,
    source_identifier: Option<String>,
    provider_id: Option<String>,
    diffs: Vec<AttributeDiff>,
) -> ComparisonResult {
    let status = if diffs.is_empty() {
        crate::model::ComparisonStatus::NoDrift
    } else {
        crate::model::ComparisonStatus::Drifted
    };
    ComparisonResult { kind, source_identifier, provider_id, status, diffs }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_maps_produce_no_diff() {
        let mut m = BTreeMap::new();
        m.insert("a".to_string(), Value::Int64(1));
        assert!(diff_maps("", &m, &m).is_empty());
    }

    #[test]
    fn numeric_within_tolerance_matches() {
        assert!(diff_value(&Value::Float64(1.0), &Value::Float64(1.0 + 1e-12)).is_none());
    }

    #[test]
    fn numeric_outside_tolerance_diffs() {
        assert!(diff_value(&Value::Float64(1.0), &Value::Float64(1.1)).is_some());
    }

    #[test]
    fn empty_string_and_absent_are_equivalent() {
        assert!(diff_value(&Value::String(String::new()), &Value::Null).is_none());
    }

    #[test]
    fn unordered_map_sequences_match_regardless_of_order() {
        let mk = |k: &str| {
            let mut m = BTreeMap::new();
            m.insert("id".to_string(), Value::string(k));
            Value::Map(m)
        };
        let expected = vec![mk("a"), mk("b")];
        let actual = vec![mk("b"), mk("a")];
        assert!(diff_seq(&expected, &actual).is_none());
    }

    #[test]
    fn comparer_of_identical_resource_is_empty() {
        let mut m = BTreeMap::new();
        m.insert("instance_type".to_string(), Value::string("t3.micro"));
        let diffs = GenericComparer.compare(&m, &m).unwrap();
        assert!(diffs.is_empty());
    }
}
