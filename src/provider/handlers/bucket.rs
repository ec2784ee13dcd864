//! S3 bucket handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc::Sender, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{DriftError, ErrorCode};
use crate::model::{Hydrator, PlatformResource, ResourceKind, ResourceMetadata};
use crate::provider::errors::classify_s3;
use crate::provider::handlers::ResourceHandler;
use crate::provider::rate_limiter::throttle;
use crate::value::Value;

const HYDRATION_CONCURRENCY: usize = 10;

pub struct ObjectStorageBucketHandler {
    client: aws_sdk_s3::Client,
    account_id: String,
}

impl ObjectStorageBucketHandler {
    pub fn new(client: aws_sdk_s3::Client, account_id: String) -> Self {
        Self { client, account_id }
    }

    async fn bucket_region(&self, bucket: &str, cancel: &CancellationToken) -> Option<String> {
        throttle(cancel).await.ok()?;
        match self.client.get_bucket_location().bucket(bucket).send().await {
            Ok(resp) => {
                let constraint = resp.location_constraint().map(|c| c.as_str().to_string());
                Some(match constraint {
                    None => "us-east-1".to_string(),
                    Some(s) if s.is_empty() => "us-east-1".to_string(),
                    Some(s) => s,
                })
            }
            Err(_) => {
                // GetBucketLocation AccessDenied quirk: fall back to
                // HeadBucket, which echoes the region in a response header.
                throttle(cancel).await.ok()?;
                self.client
                    .head_bucket()
                    .bucket(bucket)
                    .send()
                    .await
                    .ok()
                    .and_then(|resp| resp.bucket_region().map(String::from))
            }
        }
    }
}

#[async_trait]
impl ResourceHandler for ObjectStorageBucketHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::StorageBucket
    }

    async fn list_resources(
        &self,
        cancel: CancellationToken,
        _filters: &BTreeMap<String, String>,
        out: Sender<Arc<PlatformResource>>,
    ) -> Result<(), DriftError> {
        throttle(&cancel).await?;
        let resp = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify_s3("s3", "ListBuckets", e))?;

        let semaphore = Arc::new(Semaphore::new(HYDRATION_CONCURRENCY));

        for bucket in resp.buckets() {
            let Some(name) = bucket.name() else { continue };
            let permit = semaphore.clone().acquire_owned().await.map_err(|_| {
                DriftError::new(ErrorCode::Internal, "hydration semaphore closed")
            })?;

            let region = self.bucket_region(name, &cancel).await;

            let mut metadata = ResourceMetadata::new(ResourceKind::StorageBucket, "aws_s3_bucket");
            metadata.provider_assigned_id = Some(name.to_string());
            metadata.account_id = Some(self.account_id.clone());
            metadata.region = region;

            let mut base_attributes = BTreeMap::new();
            base_attributes.insert("bucket".to_string(), Value::string(name));

            let hydrator = Box::new(BucketHydrator {
                client: self.client.clone(),
                bucket: name.to_string(),
                base_attributes,
            });
            let resource = Arc::new(PlatformResource::new(metadata, hydrator));

            let sender = out.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if !cancel.is_cancelled() {
                    let _ = sender.send(resource).await;
                }
            });
        }

        Ok(())
    }

    async fn get_resource(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<Arc<PlatformResource>, DriftError> {
        throttle(cancel).await?;
        self.client
            .head_bucket()
            .bucket(id)
            .send()
            .await
            .map_err(|e| classify_s3("s3", "HeadBucket", e))?;

        let region = self.bucket_region(id, cancel).await;
        let mut metadata = ResourceMetadata::new(ResourceKind::StorageBucket, "aws_s3_bucket");
        metadata.provider_assigned_id = Some(id.to_string());
        metadata.account_id = Some(self.account_id.clone());
        metadata.region = region;

        let mut base_attributes = BTreeMap::new();
        base_attributes.insert("bucket".to_string(), Value::string(id));

        let hydrator = Box::new(BucketHydrator {
            client: self.client.clone(),
            bucket: id.to_string(),
            base_attributes,
        });
        Ok(Arc::new(PlatformResource::new(metadata, hydrator)))
    }
}

/// Fetches tagging, ACL, versioning, lifecycle, logging, website, CORS,
/// policy, and encryption in parallel on first hydration — each sub-fetch
/// still passes through the rate limiter individually.
struct BucketHydrator {
    client: aws_sdk_s3::Client,
    bucket: String,
    base_attributes: BTreeMap<String, Value>,
}

/// Record an `Ok(Some(_))`/`Ok(None)`/`Err` sub-fetch result into the
/// composite error, returning the value on success or absence.
fn record<T>(result: Result<Option<T>, DriftError>, composite_error: &mut Option<DriftError>) -> Option<T> {
    match result {
        Ok(v) => v,
        Err(e) => {
            composite_error.get_or_insert(e);
            None
        }
    }
}

fn not_found_as_none<T>(classified: DriftError) -> Result<Option<T>, DriftError> {
    if classified.code == ErrorCode::ResourceNotFound {
        Ok(None)
    } else {
        Err(classified)
    }
}

impl BucketHydrator {
    async fn fetch_tagging(&self, cancel: &CancellationToken) -> Result<Option<BTreeMap<String, Value>>, DriftError> {
        throttle(cancel).await?;
        match self.client.get_bucket_tagging().bucket(&self.bucket).send().await {
            Ok(resp) => Ok(Some(
                resp.tag_set().iter().map(|t| (t.key().to_string(), Value::string(t.value()))).collect(),
            )),
            Err(e) => not_found_as_none(classify_s3("s3", "GetBucketTagging", e)),
        }
    }

    async fn fetch_acl(&self, cancel: &CancellationToken) -> Result<Option<Vec<Value>>, DriftError> {
        throttle(cancel).await?;
        match self.client.get_bucket_acl().bucket(&self.bucket).send().await {
            Ok(resp) => Ok(Some(
                resp.grants()
                    .iter()
                    .filter_map(|g| {
                        let permission = g.permission()?.as_str().to_string();
                        let grantee = g
                            .grantee()
                            .and_then(|gr| gr.id().or_else(|| gr.uri()))
                            .unwrap_or_default()
                            .to_string();
                        let mut m = BTreeMap::new();
                        m.insert("grantee".to_string(), Value::string(grantee));
                        m.insert("permission".to_string(), Value::string(permission));
                        Some(Value::Map(m))
                    })
                    .collect(),
            )),
            Err(e) => not_found_as_none(classify_s3("s3", "GetBucketAcl", e)),
        }
    }

    async fn fetch_versioning(&self, cancel: &CancellationToken) -> Result<Option<bool>, DriftError> {
        throttle(cancel).await?;
        match self.client.get_bucket_versioning().bucket(&self.bucket).send().await {
            Ok(resp) => Ok(Some(matches!(resp.status(), Some(aws_sdk_s3::types::BucketVersioningStatus::Enabled)))),
            Err(e) => not_found_as_none(classify_s3("s3", "GetBucketVersioning", e)),
        }
    }

    async fn fetch_website(&self, cancel: &CancellationToken) -> Result<Option<bool>, DriftError> {
        throttle(cancel).await?;
        match self.client.get_bucket_website().bucket(&self.bucket).send().await {
            Ok(resp) => Ok(Some(resp.index_document().is_some())),
            Err(e) => not_found_as_none(classify_s3("s3", "GetBucketWebsite", e)),
        }
    }

    async fn fetch_logging(&self, cancel: &CancellationToken) -> Result<Option<String>, DriftError> {
        throttle(cancel).await?;
        match self.client.get_bucket_logging().bucket(&self.bucket).send().await {
            Ok(resp) => Ok(resp.logging_enabled().and_then(|l| l.target_bucket()).map(String::from)),
            Err(e) => not_found_as_none(classify_s3("s3", "GetBucketLogging", e)),
        }
    }

    async fn fetch_cors(&self, cancel: &CancellationToken) -> Result<Option<Vec<Value>>, DriftError> {
        throttle(cancel).await?;
        match self.client.get_bucket_cors().bucket(&self.bucket).send().await {
            Ok(resp) => Ok(Some(
                resp.cors_rules()
                    .iter()
                    .map(|r| {
                        let mut m = BTreeMap::new();
                        m.insert(
                            "allowed_methods".to_string(),
                            Value::Seq(r.allowed_methods().iter().map(Value::string).collect()),
                        );
                        m.insert(
                            "allowed_origins".to_string(),
                            Value::Seq(r.allowed_origins().iter().map(Value::string).collect()),
                        );
                        Value::Map(m)
                    })
                    .collect(),
            )),
            Err(e) => not_found_as_none(classify_s3("s3", "GetBucketCors", e)),
        }
    }

    async fn fetch_lifecycle(&self, cancel: &CancellationToken) -> Result<Option<Vec<Value>>, DriftError> {
        throttle(cancel).await?;
        match self.client.get_bucket_lifecycle_configuration().bucket(&self.bucket).send().await {
            Ok(resp) => Ok(Some(
                resp.rules()
                    .iter()
                    .map(|r| {
                        let mut m = BTreeMap::new();
                        if let Some(id) = r.id() {
                            m.insert("id".to_string(), Value::string(id));
                        }
                        m.insert(
                            "enabled".to_string(),
                            Value::Bool(matches!(r.status(), aws_sdk_s3::types::ExpirationStatus::Enabled)),
                        );
                        Value::Map(m)
                    })
                    .collect(),
            )),
            Err(e) => not_found_as_none(classify_s3("s3", "GetBucketLifecycleConfiguration", e)),
        }
    }

    async fn fetch_encryption(&self, cancel: &CancellationToken) -> Result<Option<String>, DriftError> {
        throttle(cancel).await?;
        match self.client.get_bucket_encryption().bucket(&self.bucket).send().await {
            Ok(resp) => Ok(resp
                .server_side_encryption_configuration()
                .and_then(|c| c.rules().first())
                .and_then(|r| r.apply_server_side_encryption_by_default())
                .map(|d| d.sse_algorithm().as_str().to_string())),
            Err(e) => not_found_as_none(classify_s3("s3", "GetBucketEncryption", e)),
        }
    }

    async fn fetch_policy(&self, cancel: &CancellationToken) -> Result<Option<String>, DriftError> {
        throttle(cancel).await?;
        match self.client.get_bucket_policy().bucket(&self.bucket).send().await {
            Ok(resp) => Ok(resp.policy().map(String::from)),
            Err(e) => not_found_as_none(classify_s3("s3", "GetBucketPolicy", e)),
        }
    }
}

#[async_trait]
impl Hydrator for BucketHydrator {
    async fn hydrate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Value>, (BTreeMap<String, Value>, DriftError)> {
        let mut attributes = self.base_attributes.clone();

        let (tagging, acl, versioning, website, logging, cors, lifecycle, encryption, policy) = tokio::join!(
            self.fetch_tagging(cancel),
            self.fetch_acl(cancel),
            self.fetch_versioning(cancel),
            self.fetch_website(cancel),
            self.fetch_logging(cancel),
            self.fetch_cors(cancel),
            self.fetch_lifecycle(cancel),
            self.fetch_encryption(cancel),
            self.fetch_policy(cancel),
        );

        let mut composite_error: Option<DriftError> = None;

        if let Some(tags) = record(tagging, &mut composite_error) {
            attributes.insert("tags".to_string(), Value::Map(tags));
        }
        if let Some(grants) = record(acl, &mut composite_error) {
            attributes.insert("acl_grants".to_string(), Value::Seq(grants));
        }
        if let Some(enabled) = record(versioning, &mut composite_error) {
            attributes.insert("versioning_enabled".to_string(), Value::Bool(enabled));
        }
        match record(website, &mut composite_error) {
            Some(enabled) => {
                attributes.insert("website_enabled".to_string(), Value::Bool(enabled));
            }
            None => {
                attributes.insert("website_enabled".to_string(), Value::Bool(false));
            }
        }
        if let Some(target) = record(logging, &mut composite_error) {
            attributes.insert("logging_target_bucket".to_string(), Value::string(target));
        }
        if let Some(rules) = record(cors, &mut composite_error) {
            attributes.insert("cors_rules".to_string(), Value::Seq(rules));
        }
        if let Some(rules) = record(lifecycle, &mut composite_error) {
            attributes.insert("lifecycle_rules".to_string(), Value::Seq(rules));
        }
        if let Some(algo) = record(encryption, &mut composite_error) {
            attributes.insert("server_side_encryption".to_string(), Value::string(algo));
        }
        if let Some(policy) = record(policy, &mut composite_error) {
            attributes.insert("bucket_policy".to_string(), Value::string(policy));
        }

        match composite_error {
            Some(e) => Err((attributes, e)),
            None => Ok(attributes),
        }
    }
}
