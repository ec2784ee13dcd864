//! Attribute comparers: one per resource kind, each producing the
//! `AttributeDiff` list for a matched (desired, actual) pair.

pub mod block_device;
pub mod bucket;
pub mod compute;
pub mod generic;

use std::collections::BTreeMap;

use crate::error::DriftError;
use crate::model::{AttributeDiff, ResourceKind};
use crate::value::Value;

/// Compares a desired attribute map against an actual one and returns the
/// differences. Implementations never see unmatched resources — the
/// engine only calls this for pairs the matcher already paired.
pub trait Comparer: Send + Sync {
    fn compare(
        &self,
        desired: &BTreeMap<String, Value>,
        actual: &BTreeMap<String, Value>,
    ) -> Result<Vec<AttributeDiff>, DriftError>;
}

/// Build the `kind -> Comparer` registry, mirrored from the resource-type
/// registry in `hcl::mod`.
pub fn registry() -> BTreeMap<ResourceKind, Box<dyn Comparer>> {
    let mut map: BTreeMap<ResourceKind, Box<dyn Comparer>> = BTreeMap::new();
    map.insert(ResourceKind::ComputeInstance, Box::new(compute::ComputeInstanceComparer));
    map.insert(ResourceKind::StorageBucket, Box::new(bucket::ObjectStorageBucketComparer));
    map
}

pub fn comparer_for(kind: ResourceKind) -> Box<dyn Comparer> {
    registry().remove(&kind).unwrap_or_else(|| Box::new(generic::GenericComparer))
}
