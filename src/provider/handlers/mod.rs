//! Resource-kind-specific handlers: the polymorphic `{kind(), list_resources(),
//! get_resource()}` capability set each platform handler implements.

pub mod bucket;
pub mod compute;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::error::DriftError;
use crate::model::{PlatformResource, ResourceKind};

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn list_resources(
        &self,
        cancel: CancellationToken,
        filters: &BTreeMap<String, String>,
        out: Sender<Arc<PlatformResource>>,
    ) -> Result<(), DriftError>;

    async fn get_resource(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<Arc<PlatformResource>, DriftError>;
}

/// One native filter, mirroring the EC2 `{name, values[]}` shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFilter {
    pub name: String,
    pub values: Vec<String>,
}

/// Translate the generic filter map into EC2-native filters, appending the
/// default non-terminated state filter unless the caller already supplied
/// `instance-state-name`.
pub fn build_ec2_filters(filters: &BTreeMap<String, String>) -> Vec<NativeFilter> {
    let mut out = Vec::new();
    let mut has_state_filter = false;

    for (key, value) in filters {
        if let Some(tag_key) = key.strip_prefix("tag:") {
            out.push(NativeFilter { name: format!("tag:{tag_key}"), values: vec![value.clone()] });
            continue;
        }
        match key.as_str() {
            "compute.image_id" => out.push(NativeFilter { name: "image-id".to_string(), values: split_csv(value) }),
            "compute.instance_type" => out.push(NativeFilter { name: "instance-type".to_string(), values: split_csv(value) }),
            "compute.subnet_id" => out.push(NativeFilter { name: "subnet-id".to_string(), values: split_csv(value) }),
            "id" => out.push(NativeFilter { name: "instance-id".to_string(), values: split_csv(value) }),
            "compute.availability_zone" => out.push(NativeFilter { name: "availability-zone".to_string(), values: split_csv(value) }),
            "compute.iam_instance_profile" => out.push(NativeFilter { name: "iam-instance-profile.arn".to_string(), values: vec![value.clone()] }),
            "compute.security_groups" => {
                for sg in split_csv(value) {
                    out.push(NativeFilter { name: "instance.group-id".to_string(), values: vec![sg] });
                }
            }
            "instance-state-name" => {
                has_state_filter = true;
                out.push(NativeFilter { name: "instance-state-name".to_string(), values: split_csv(value) });
            }
            _ => {}
        }
    }

    if !has_state_filter {
        out.push(NativeFilter {
            name: "instance-state-name".to_string(),
            values: vec!["pending", "running", "shutting-down", "stopping", "stopped"]
                .into_iter()
                .map(String::from)
                .collect(),
        });
    }

    out
}

fn split_csv(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_default_state_filter() {
        let filters = build_ec2_filters(&BTreeMap::new());
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].name, "instance-state-name");
        assert_eq!(filters[0].values, vec!["pending", "running", "shutting-down", "stopping", "stopped"]);
    }

    #[test]
    fn security_group_fan_out() {
        let mut map = BTreeMap::new();
        map.insert("compute.security_groups".to_string(), "sg-1,sg-2".to_string());
        let filters = build_ec2_filters(&map);

        let sg_filters: Vec<&NativeFilter> = filters.iter().filter(|f| f.name == "instance.group-id").collect();
        assert_eq!(sg_filters.len(), 2);
        assert_eq!(sg_filters[0].values, vec!["sg-1"]);
        assert_eq!(sg_filters[1].values, vec!["sg-2"]);
        assert!(filters.iter().any(|f| f.name == "instance-state-name"));
    }

    #[test]
    fn user_override_of_state_suppresses_default() {
        let mut map = BTreeMap::new();
        map.insert("instance-state-name".to_string(), "running,stopped".to_string());
        let filters = build_ec2_filters(&map);

        let state_filters: Vec<&NativeFilter> = filters.iter().filter(|f| f.name == "instance-state-name").collect();
        assert_eq!(state_filters.len(), 1);
        assert_eq!(state_filters[0].values, vec!["running", "stopped"]);
    }

    #[test]
    fn idempotent_under_dict_reordering() {
        let mut a = BTreeMap::new();
        a.insert("compute.image_id".to_string(), "ami-1".to_string());
        a.insert("compute.subnet_id".to_string(), "subnet-1".to_string());

        let mut b = BTreeMap::new();
        b.insert("compute.subnet_id".to_string(), "subnet-1".to_string());
        b.insert("compute.image_id".to_string(), "ami-1".to_string());

        let mut fa = build_ec2_filters(&a);
        let mut fb = build_ec2_filters(&b);
        fa.sort_by(|x, y| x.name.cmp(&y.name));
        fb.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(fa, fb);
    }
}
