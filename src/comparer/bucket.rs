//! Object-storage-bucket comparer: generic rules cover every declared
//! field (`versioning_enabled`, `website_enabled`,
//! `logging_target_bucket`, `cors_rules`, `lifecycle_rules`,
//! `server_side_encryption`); tags get the same `aws:`-prefix exclusion
//! as the compute-instance comparer.

use std::collections::BTreeMap;

use crate::error::DriftError;
use crate::model::AttributeDiff;
use crate::value::Value;

use super::generic::{diff_maps, diff_value};
use super::Comparer;

pub struct ObjectStorageBucketComparer;

impl Comparer for ObjectStorageBucketComparer {
    fn compare(
        &self,
        desired: &BTreeMap<String, Value>,
        actual: &BTreeMap<String, Value>,
    ) -> Result<Vec<AttributeDiff>, DriftError> {
        let generic_desired: BTreeMap<String, Value> =
            desired.iter().filter(|(k, _)| k.as_str() != "tags").map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut diffs = diff_maps("", &generic_desired, actual);

        if let Some(d) = diff_tags(desired, actual) {
            diffs.push(d);
        }

        Ok(diffs)
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioning_mismatch_is_detected() {
        let mut desired = BTreeMap::new();
        desired.insert("versioning_enabled".to_string(), Value::Bool(true));
        let mut actual = BTreeMap::new();
        actual.insert("versioning_enabled".to_string(), Value::Bool(false));

        let diffs = ObjectStorageBucketComparer.compare(&desired, &actual).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].attribute_name, "versioning_enabled");
    }

    #[test]
    fn identical_bucket_has_no_diffs() {
        let mut attrs = BTreeMap::new();
        attrs.insert("versioning_enabled".to_string(), Value::Bool(true));
        attrs.insert("website_enabled".to_string(), Value::Bool(false));
        let diffs = ObjectStorageBucketComparer.compare(&attrs, &attrs).unwrap();
        assert!(diffs.is_empty());
    }
}
