//! Compute-instance comparer: generic rules plus overrides for tags
//! (`aws:`-prefixed reserved tags excluded), security groups (set
//! equality), and block devices (normalized before comparison).

use std::collections::{BTreeMap, BTreeSet};

use crate::error::DriftError;
use crate::model::AttributeDiff;
use crate::value::Value;

use super::block_device;
use super::generic::{diff_maps, diff_value};
use super::Comparer;

const OVERRIDE_KEYS: &[&str] = &["tags", "security_groups", "root_block_device", "ebs_block_devices"];

pub struct ComputeInstanceComparer;

impl Comparer for ComputeInstanceComparer {
    fn compare(
        &self,
        desired: &BTreeMap<String, Value>,
        actual: &BTreeMap<String, Value>,
    ) -> Result<Vec<AttributeDiff>, DriftError> {
        let generic_desired: BTreeMap<String, Value> = desired
            .iter()
            .filter(|(k, _)| !OVERRIDE_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut diffs = diff_maps("", &generic_desired, actual);

        if let Some(d) = diff_tags(desired, actual) {
            diffs.push(d);
        }
        if let Some(d) = diff_security_groups(desired, actual) {
            diffs.push(d);
        }
        if let Some(d) = diff_root_block_device(desired, actual) {
            diffs.push(d);
        }
        if let Some(d) = diff_ebs_block_devices(desired, actual) {
            diffs.push(d);
        }

        Ok(diffs)
    }
}

/// AWS-managed tags (the `aws:` prefix) are never declared in IaC and
/// never drift in a user-actionable sense — excluded from both sides
/// before comparing.
fn diff_tags(desired: &BTreeMap<String, Value>, actual: &BTreeMap<String, Value>) -> Option<AttributeDiff> {
    let strip_reserved = |tags: &BTreeMap<String, Value>| -> BTreeMap<String, Value> {
        tags.iter().filter(|(k, _)| !k.starts_with("aws:")).map(|(k, v)| (k.clone(), v.clone())).collect()
    };

    let expected = desired.get("tags").and_then(|v| v.as_map()).map(strip_reserved).unwrap_or_default();
    let got = actual.get("tags").and_then(|v| v.as_map()).map(strip_reserved).unwrap_or_default();

    let details = diff_value(&Value::Map(expected.clone()), &Value::Map(got.clone()))?;
    Some(AttributeDiff {
        attribute_name: "tags".to_string(),
        expected_value: Value::Map(expected),
        actual_value: Value::Map(got),
        details: Some(details),
    })
}

fn diff_security_groups(desired: &BTreeMap<String, Value>, actual: &BTreeMap<String, Value>) -> Option<AttributeDiff> {
    let to_set = |v: Option<&Value>| -> BTreeSet<String> {
        v.and_then(|v| v.as_seq())
            .map(|seq| seq.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    };

    let expected = to_set(desired.get("security_groups"));
    let got = to_set(actual.get("security_groups"));
    if expected == got {
        return None;
    }

    Some(AttributeDiff {
        attribute_name: "security_groups".to_string(),
        expected_value: Value::Seq(expected.iter().cloned().map(Value::string).collect()),
        actual_value: Value::Seq(got.iter().cloned().map(Value::string).collect()),
        details: Some(format!("expected {:?}, actual {:?}", expected, got)),
    })
}

fn diff_root_block_device(desired: &BTreeMap<String, Value>, actual: &BTreeMap<String, Value>) -> Option<AttributeDiff> {
    let expected = desired.get("root_block_device")?.as_seq()?.first()?;
    let got = actual.get("root_block_device").and_then(|v| v.as_seq()).and_then(|s| s.first());

    let expected_norm = Value::Map(block_device::normalize(expected, true));
    let got_norm = got.map(|g| Value::Map(block_device::normalize(g, true))).unwrap_or(Value::Null);

    let details = diff_value(&expected_norm, &got_norm)?;
    Some(AttributeDiff {
        attribute_name: "root_block_device".to_string(),
        expected_value: expected_norm,
        actual_value: got_norm,
        details: Some(details),
    })
}

fn diff_ebs_block_devices(desired: &BTreeMap<String, Value>, actual: &BTreeMap<String, Value>) -> Option<AttributeDiff> {
    let expected_raw = desired.get("ebs_block_devices")?.as_seq()?;
    let got_raw = actual.get("ebs_block_devices").and_then(|v| v.as_seq()).unwrap_or(&[]);

    let expected = Value::Seq(block_device::normalize_seq(expected_raw, None));
    let got = Value::Seq(block_device::normalize_seq(got_raw, None));

    let details = diff_value(&expected, &got)?;
    Some(AttributeDiff {
        attribute_name: "ebs_block_devices".to_string(),
        expected_value: expected,
        actual_value: got,
        details: Some(format!(
            "{}",
            details
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aws_managed_tags_are_ignored() {
        let mut desired = BTreeMap::new();
        let mut tags = BTreeMap::new();
        tags.insert("Name".to_string(), Value::string("web"));
        desired.insert("tags".to_string(), Value::Map(tags));

        let mut actual = BTreeMap::new();
        let mut tags = BTreeMap::new();
        tags.insert("Name".to_string(), Value::string("web"));
        tags.insert("aws:cloudformation:stack-name".to_string(), Value::string("stack"));
        actual.insert("tags".to_string(), Value::Map(tags));

        assert!(diff_tags(&desired, &actual).is_none());
    }

    #[test]
    fn security_group_set_equality_ignores_order() {
        let mut desired = BTreeMap::new();
        desired.insert("security_groups".to_string(), Value::Seq(vec![Value::string("sg-1"), Value::string("sg-2")]));
        let mut actual = BTreeMap::new();
        actual.insert("security_groups".to_string(), Value::Seq(vec![Value::string("sg-2"), Value::string("sg-1")]));
        assert!(diff_security_groups(&desired, &actual).is_none());
    }

    #[test]
    fn security_group_mismatch_is_detected() {
        let mut desired = BTreeMap::new();
        desired.insert("security_groups".to_string(), Value::Seq(vec![Value::string("sg-1")]));
        let mut actual = BTreeMap::new();
        actual.insert("security_groups".to_string(), Value::Seq(vec![Value::string("sg-2")]));
        assert!(diff_security_groups(&desired, &actual).is_some());
    }

    #[test]
    fn identical_resource_has_no_diffs() {
        let mut attrs = BTreeMap::new();
        attrs.insert("instance_type".to_string(), Value::string("t3.micro"));
        let mut tags = BTreeMap::new();
        tags.insert("Name".to_string(), Value::string("web"));
        attrs.insert("tags".to_string(), Value::Map(tags));
        attrs.insert("security_groups".to_string(), Value::Seq(vec![Value::string("sg-1")]));

        let diffs = ComputeInstanceComparer.compare(&attrs, &attrs).unwrap();
        assert!(diffs.is_empty());
    }
}
