//! EC2 instance handler.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_ec2::types::Filter;
use futures::StreamExt;
use tokio::sync::{mpsc::Sender, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{DriftError, ErrorCode};
use crate::model::{Hydrator, PlatformResource, ResourceKind, ResourceMetadata};
use crate::provider::errors::classify_ec2;
use crate::provider::handlers::{build_ec2_filters, ResourceHandler};
use crate::provider::rate_limiter::throttle;
use crate::value::Value;

const HYDRATION_CONCURRENCY: usize = 10;

pub struct ComputeInstanceHandler {
    client: aws_sdk_ec2::Client,
    sts: aws_sdk_sts::Client,
    account_id: RwLock<Option<String>>,
}

impl ComputeInstanceHandler {
    pub fn new(client: aws_sdk_ec2::Client, sts: aws_sdk_sts::Client) -> Self {
        Self { client, sts, account_id: RwLock::new(None) }
    }

    /// Acquire the account ID once per handler lifetime under a
    /// read/write lock (double-checked-locking). Failure is non-fatal
    /// for listing.
    async fn account_id(&self, cancel: &CancellationToken) -> Option<String> {
        {
            let guard = self.account_id.read().await;
            if let Some(id) = guard.as_ref() {
                return Some(id.clone());
            }
        }

        let mut guard = self.account_id.write().await;
        if let Some(id) = guard.as_ref() {
            return Some(id.clone());
        }

        if throttle(cancel).await.is_err() {
            return None;
        }
        match self.sts.get_caller_identity().send().await {
            Ok(resp) => {
                let id = resp.account().map(String::from);
                *guard = id.clone();
                id
            }
            Err(e) => {
                tracing::warn!("failed to resolve account id, proceeding without it: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl ResourceHandler for ComputeInstanceHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ComputeInstance
    }

    async fn list_resources(
        &self,
        cancel: CancellationToken,
        filters: &BTreeMap<String, String>,
        out: Sender<Arc<PlatformResource>>,
    ) -> Result<(), DriftError> {
        let native_filters: Vec<Filter> = build_ec2_filters(filters)
            .into_iter()
            .map(|f| Filter::builder().name(f.name).set_values(Some(f.values)).build())
            .collect();

        let account_id = self.account_id(&cancel).await;
        let region = self.client.config().region().map(|r| r.to_string());

        let mut request = self.client.describe_instances();
        for f in native_filters {
            request = request.filters(f);
        }

        let mut pages = request.into_paginator().send();
        let semaphore = Arc::new(Semaphore::new(HYDRATION_CONCURRENCY));
        let failed = Arc::new(AtomicBool::new(false));

        while let Some(page) = pages.next().await {
            if cancel.is_cancelled() {
                return Err(DriftError::new(ErrorCode::Timeout, "listing cancelled"));
            }
            throttle(&cancel).await?;

            let page = page.map_err(|e| classify_ec2("ec2", "DescribeInstances", e))?;

            for reservation in page.reservations() {
                for instance in reservation.instances() {
                    let permit = semaphore.clone().acquire_owned().await.map_err(|_| {
                        DriftError::new(ErrorCode::Internal, "hydration semaphore closed")
                    })?;

                    let metadata = build_metadata(instance, account_id.clone(), region.clone());
                    let hydrator = Box::new(ComputeHydrator {
                        client: self.client.clone(),
                        instance_id: instance.instance_id().unwrap_or_default().to_string(),
                        base_attributes: base_attributes(instance),
                        volume_ids: attached_volume_ids(instance),
                    });
                    let resource = Arc::new(PlatformResource::new(metadata, hydrator));

                    let sender = out.clone();
                    let cancel = cancel.clone();
                    let failed = failed.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if cancel.is_cancelled() {
                            return;
                        }
                        if sender.send(resource).await.is_err() {
                            failed.store(true, Ordering::Relaxed);
                        }
                    });
                }
            }
        }

        Ok(())
    }

    async fn get_resource(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<Arc<PlatformResource>, DriftError> {
        throttle(cancel).await?;
        let resp = self
            .client
            .describe_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| classify_ec2("ec2", "DescribeInstances", e))?;

        let instance = resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .next()
            .ok_or_else(|| DriftError::new(ErrorCode::ResourceNotFound, format!("instance {id} not found")))?;

        let account_id = self.account_id(cancel).await;
        let region = self.client.config().region().map(|r| r.to_string());
        let metadata = build_metadata(instance, account_id, region);
        let hydrator = Box::new(ComputeHydrator {
            client: self.client.clone(),
            instance_id: id.to_string(),
            base_attributes: base_attributes(instance),
            volume_ids: attached_volume_ids(instance),
        });
        Ok(Arc::new(PlatformResource::new(metadata, hydrator)))
    }
}

fn build_metadata(
    instance: &aws_sdk_ec2::types::Instance,
    account_id: Option<String>,
    region: Option<String>,
) -> ResourceMetadata {
    let mut metadata = ResourceMetadata::new(ResourceKind::ComputeInstance, "aws_instance");
    metadata.provider_assigned_id = instance.instance_id().map(String::from);
    metadata.account_id = account_id;
    metadata.region = region;
    metadata
}

fn base_attributes(instance: &aws_sdk_ec2::types::Instance) -> BTreeMap<String, Value> {
    let mut attrs = BTreeMap::new();
    if let Some(id) = instance.instance_id() {
        attrs.insert("id".to_string(), Value::string(id));
    }
    if let Some(t) = instance.instance_type() {
        attrs.insert("instance_type".to_string(), Value::string(t.as_str()));
    }
    if let Some(ami) = instance.image_id() {
        attrs.insert("ami".to_string(), Value::string(ami));
    }
    if let Some(subnet) = instance.subnet_id() {
        attrs.insert("subnet_id".to_string(), Value::string(subnet));
    }
    if let Some(az) = instance.placement().and_then(|p| p.availability_zone()) {
        attrs.insert("availability_zone".to_string(), Value::string(az));
    }
    if let Some(state) = instance.state().and_then(|s| s.name()) {
        attrs.insert("instance_state".to_string(), Value::string(state.as_str()));
    }

    let tags: BTreeMap<String, Value> = instance
        .tags()
        .iter()
        .filter_map(|t| Some((t.key()?.to_string(), Value::string(t.value().unwrap_or_default()))))
        .collect();
    attrs.insert("tags".to_string(), Value::Map(tags));

    let sgs: Vec<Value> = instance
        .security_groups()
        .iter()
        .filter_map(|g| g.group_id().map(Value::string))
        .collect();
    attrs.insert("security_groups".to_string(), Value::Seq(sgs));

    if let Some(root) = root_block_device(instance) {
        attrs.insert("root_block_device".to_string(), Value::Seq(vec![root]));
    }

    attrs
}

fn root_block_device(instance: &aws_sdk_ec2::types::Instance) -> Option<Value> {
    let root_name = instance.root_device_name()?;
    let mapping = instance
        .block_device_mappings()
        .iter()
        .find(|m| m.device_name() == Some(root_name))?;
    let ebs = mapping.ebs()?;
    let mut map = BTreeMap::new();
    map.insert("device_name".to_string(), Value::string(root_name));
    if let Some(dot) = ebs.delete_on_termination() {
        map.insert("delete_on_termination".to_string(), Value::Bool(dot));
    }
    Some(Value::Map(map))
}

fn attached_volume_ids(instance: &aws_sdk_ec2::types::Instance) -> Vec<(String, String)> {
    instance
        .block_device_mappings()
        .iter()
        .filter_map(|m| {
            let name = m.device_name()?.to_string();
            let volume_id = m.ebs()?.volume_id()?.to_string();
            Some((name, volume_id))
        })
        .collect()
}

/// Supplementary fetches performed on first `Attributes(ctx)` call: the
/// user-data attribute and per-volume EBS details.
struct ComputeHydrator {
    client: aws_sdk_ec2::Client,
    instance_id: String,
    base_attributes: BTreeMap<String, Value>,
    volume_ids: Vec<(String, String)>,
}

#[async_trait]
impl Hydrator for ComputeHydrator {
    async fn hydrate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Value>, (BTreeMap<String, Value>, DriftError)> {
        let mut attributes = self.base_attributes.clone();

        if let Err(e) = throttle(cancel).await {
            return Err((attributes, e));
        }

        match self
            .client
            .describe_instance_attribute()
            .instance_id(&self.instance_id)
            .attribute(aws_sdk_ec2::types::InstanceAttributeName::UserData)
            .send()
            .await
        {
            Ok(resp) => {
                if let Some(user_data) = resp.user_data().and_then(|v| v.value()) {
                    attributes.insert("user_data".to_string(), Value::string(user_data));
                }
            }
            Err(e) => {
                let classified = classify_ec2("ec2", "DescribeInstanceAttribute", e);
                if classified.code != ErrorCode::ResourceNotFound {
                    return Err((attributes, classified));
                }
            }
        }

        let root_device_name = root_device_name(&attributes);

        let mut ebs_devices = Vec::with_capacity(self.volume_ids.len());
        for (device_name, volume_id) in &self.volume_ids {
            if let Err(e) = throttle(cancel).await {
                return Err((attributes, e));
            }
            match self.client.describe_volumes().volume_ids(volume_id).send().await {
                Ok(resp) => {
                    if let Some(volume) = resp.volumes().first() {
                        let value = volume_to_value(device_name, volume);
                        if root_device_name.as_deref() == Some(device_name.as_str()) {
                            merge_root_block_device(&mut attributes, &value);
                        }
                        ebs_devices.push(value);
                    }
                }
                Err(e) => {
                    let classified = classify_ec2("ec2", "DescribeVolumes", e);
                    if classified.code != ErrorCode::ResourceNotFound {
                        return Err((attributes, classified));
                    }
                }
            }
        }
        if !ebs_devices.is_empty() {
            attributes.insert("ebs_block_devices".to_string(), Value::Seq(ebs_devices));
        }

        Ok(attributes)
    }
}

fn root_device_name(attributes: &BTreeMap<String, Value>) -> Option<String> {
    attributes
        .get("root_block_device")
        .and_then(|v| v.as_seq())
        .and_then(|s| s.first())
        .and_then(|v| v.as_map())
        .and_then(|m| m.get("device_name"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Back-fill the root device's own entry with the full volume details
/// (`volume_type`, `volume_size`, `encrypted`, `kms_key_id`, `iops`,
/// `throughput`) fetched from `describe_volumes` — `root_block_device`
/// starts out with only `device_name`/`delete_on_termination` from the
/// instance's block-device mapping.
fn merge_root_block_device(attributes: &mut BTreeMap<String, Value>, volume_value: &Value) {
    let Some(mut root) = attributes
        .get("root_block_device")
        .and_then(|v| v.as_seq())
        .and_then(|s| s.first())
        .and_then(|v| v.as_map())
        .cloned()
    else {
        return;
    };
    if let Some(volume_map) = volume_value.as_map() {
        for (k, v) in volume_map {
            root.insert(k.clone(), v.clone());
        }
    }
    attributes.insert("root_block_device".to_string(), Value::Seq(vec![Value::Map(root)]));
}

fn volume_to_value(device_name: &str, volume: &aws_sdk_ec2::types::Volume) -> Value {
    let mut map = BTreeMap::new();
    map.insert("device_name".to_string(), Value::string(device_name));
    if let Some(vt) = volume.volume_type() {
        map.insert("volume_type".to_string(), Value::string(vt.as_str()));
    }
    map.insert("encrypted".to_string(), Value::Bool(volume.encrypted().unwrap_or(false)));
    if let Some(kms) = volume.kms_key_id() {
        map.insert("kms_key_id".to_string(), Value::string(kms));
    }
    if let Some(throughput) = volume.throughput() {
        map.insert("throughput".to_string(), Value::Int64(throughput as i64));
    }
    if let Some(iops) = volume.iops() {
        map.insert("iops".to_string(), Value::Int64(iops as i64));
    }
    if let Some(size) = volume.size() {
        map.insert("volume_size".to_string(), Value::Int64(size as i64));
    }
    Value::Map(map)
}
