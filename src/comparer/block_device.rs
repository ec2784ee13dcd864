//! Block-device normalization shared by the root and EBS block-device
//! overrides in the compute-instance comparer.

use std::collections::BTreeMap;

use crate::value::Value;

/// Fields compared on a block device. Anything else (e.g. a snapshot ID
/// set only by the platform side) is ignored — it's not something IaC
/// declares, so it can never drift in a meaningful sense.
const COMPARABLE_FIELDS: &[&str] = &[
    "device_name",
    "delete_on_termination",
    "volume_type",
    "volume_size",
    "encrypted",
    "kms_key_id",
    "iops",
    "throughput",
];

/// Reduce a raw block-device map to the comparable field subset, filling
/// in `delete_on_termination`'s implicit default (`true` for the root
/// device, `false` otherwise) when the field is absent.
pub fn normalize(device: &Value, is_root: bool) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let Some(map) = device.as_map() else { return out };

    for field in COMPARABLE_FIELDS {
        if let Some(value) = map.get(*field) {
            out.insert(field.to_string(), canonicalize(field, value));
        }
    }

    out.entry("delete_on_termination".to_string())
        .or_insert(Value::Bool(is_root));

    out
}

/// Canonicalize integer-ish fields so `Value::Int64(8)` and
/// `Value::Float64(8.0)` compare equal under the generic diff rules.
fn canonicalize(field: &str, value: &Value) -> Value {
    match field {
        "volume_size" | "iops" | "throughput" => value
            .as_int64()
            .map(Value::Int64)
            .unwrap_or_else(|| value.clone()),
        _ => value.clone(),
    }
}

/// Key a list of block devices by `device_name` for the unordered
/// comparison the generic sequence rule already applies; here we just
/// normalize every entry first.
pub fn normalize_seq(devices: &[Value], root_device_name: Option<&str>) -> Vec<Value> {
    devices
        .iter()
        .map(|d| {
            let is_root = root_device_name.is_some()
                && d.as_map().and_then(|m| m.get("device_name")).and_then(|v| v.as_str()) == root_device_name;
            Value::Map(normalize(d, is_root))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_device_defaults_delete_on_termination_true() {
        let mut m = BTreeMap::new();
        m.insert("device_name".to_string(), Value::string("/dev/sda1"));
        let normalized = normalize(&Value::Map(m), true);
        assert_eq!(normalized.get("delete_on_termination"), Some(&Value::Bool(true)));
    }

    #[test]
    fn non_root_device_defaults_delete_on_termination_false() {
        let mut m = BTreeMap::new();
        m.insert("device_name".to_string(), Value::string("/dev/sdb"));
        let normalized = normalize(&Value::Map(m), false);
        assert_eq!(normalized.get("delete_on_termination"), Some(&Value::Bool(false)));
    }

    #[test]
    fn integer_and_float_volume_size_canonicalize_equal() {
        let mut a = BTreeMap::new();
        a.insert("volume_size".to_string(), Value::Int64(8));
        let mut b = BTreeMap::new();
        b.insert("volume_size".to_string(), Value::Float64(8.0));
        assert_eq!(normalize(&Value::Map(a), false).get("volume_size"), normalize(&Value::Map(b), false).get("volume_size"));
    }
}
