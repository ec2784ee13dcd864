//! End-to-end drift engine scenarios: tag drift, unmanaged detection, and
//! lazy hydration caching a failure after the first call.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use drift_detector::engine::DriftEngine;
use drift_detector::error::{DriftError, ErrorCode};
use drift_detector::model::{
    Hydrator, PlatformProvider, PlatformResource, ResourceKind, ResourceMetadata, StateProvider, StateResource,
};
use drift_detector::output::{ReportContext, Reporter};
use drift_detector::model::ComparisonStatus;
use drift_detector::value::Value;

struct StaticHydrator(BTreeMap<String, Value>);

#[async_trait]
impl Hydrator for StaticHydrator {
    async fn hydrate(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Value>, (BTreeMap<String, Value>, DriftError)> {
        Ok(self.0.clone())
    }
}

struct CountingFailingHydrator {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Hydrator for CountingFailingHydrator {
    async fn hydrate(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Value>, (BTreeMap<String, Value>, DriftError)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((BTreeMap::new(), DriftError::new(ErrorCode::PlatformApiError, "simulated failure")))
    }
}

struct FakeStateProvider(Vec<StateResource>);

#[async_trait]
impl StateProvider for FakeStateProvider {
    fn provider_type(&self) -> &'static str {
        "fake"
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<StateResource>, DriftError> {
        Ok(self.0.iter().filter(|r| r.metadata.kind == kind).cloned().collect())
    }

    async fn get(&self, _kind: ResourceKind, _id: &str) -> Result<StateResource, DriftError> {
        Err(DriftError::new(ErrorCode::ResourceNotFound, "not implemented in fake"))
    }
}

struct FakePlatformProvider(Vec<Arc<PlatformResource>>);

#[async_trait]
impl PlatformProvider for FakePlatformProvider {
    fn provider_type(&self) -> &'static str {
        "fake"
    }

    async fn list_resources(
        &self,
        _cancel: CancellationToken,
        kinds: &[ResourceKind],
        _filters: &BTreeMap<String, String>,
        out: tokio::sync::mpsc::Sender<Arc<PlatformResource>>,
    ) -> Result<(), DriftError> {
        for resource in &self.0 {
            if kinds.contains(&resource.metadata.kind) {
                out.send(resource.clone()).await.ok();
            }
        }
        Ok(())
    }

    async fn get_resource(
        &self,
        _cancel: &CancellationToken,
        _kind: ResourceKind,
        _id: &str,
    ) -> Result<Arc<PlatformResource>, DriftError> {
        Err(DriftError::new(ErrorCode::NotImplemented, "not implemented in fake"))
    }
}

struct CollectingReporter(std::sync::Mutex<Vec<drift_detector::model::ComparisonResult>>);

#[async_trait]
impl Reporter for CollectingReporter {
    async fn report(&self, _ctx: &ReportContext, results: &[drift_detector::model::ComparisonResult]) -> Result<(), DriftError> {
        self.0.lock().unwrap().extend_from_slice(results);
        Ok(())
    }
}

fn instance_metadata(id: &str) -> ResourceMetadata {
    let mut m = ResourceMetadata::new(ResourceKind::ComputeInstance, "aws_instance");
    m.provider_assigned_id = Some(id.to_string());
    m
}

#[tokio::test]
async fn tag_drift_is_detected() {
    let mut desired_attrs = BTreeMap::new();
    desired_attrs.insert("id".to_string(), Value::string("i-1"));
    let mut desired_tags = BTreeMap::new();
    desired_tags.insert("Environment".to_string(), Value::string("production"));
    desired_attrs.insert("tags".to_string(), Value::Map(desired_tags));

    let mut desired_metadata = instance_metadata("i-1");
    desired_metadata.source_identifier = Some("aws_instance.web".to_string());
    let desired = StateResource::new(desired_metadata, desired_attrs);

    let mut actual_tags = BTreeMap::new();
    actual_tags.insert("Environment".to_string(), Value::string("staging"));
    let mut actual_attrs = BTreeMap::new();
    actual_attrs.insert("tags".to_string(), Value::Map(actual_tags));
    let actual = Arc::new(PlatformResource::new(instance_metadata("i-1"), Box::new(StaticHydrator(actual_attrs))));

    let engine = DriftEngine::new(
        Arc::new(FakeStateProvider(vec![desired])),
        Arc::new(FakePlatformProvider(vec![actual])),
    );
    let reporter = CollectingReporter(std::sync::Mutex::new(Vec::new()));
    let ctx = ReportContext { workspace: "default".to_string(), provider_type: "fake".to_string() };

    engine.run(&[ResourceKind::ComputeInstance], &BTreeMap::new(), &reporter, &ctx).await.unwrap();

    let results = reporter.0.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ComparisonStatus::Drifted);
    assert!(results[0].diffs.iter().any(|d| d.attribute_name == "tags"));
}

#[tokio::test]
async fn unmanaged_actual_resource_is_reported() {
    let actual = Arc::new(PlatformResource::new(instance_metadata("i-orphan"), Box::new(StaticHydrator(BTreeMap::new()))));

    let engine = DriftEngine::new(
        Arc::new(FakeStateProvider(vec![])),
        Arc::new(FakePlatformProvider(vec![actual])),
    );
    let reporter = CollectingReporter(std::sync::Mutex::new(Vec::new()));
    let ctx = ReportContext { workspace: "default".to_string(), provider_type: "fake".to_string() };

    engine.run(&[ResourceKind::ComputeInstance], &BTreeMap::new(), &reporter, &ctx).await.unwrap();

    let results = reporter.0.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ComparisonStatus::Unmanaged);
    assert_eq!(results[0].provider_id.as_deref(), Some("i-orphan"));
}

#[tokio::test]
async fn missing_desired_resource_is_reported() {
    let mut desired_attrs = BTreeMap::new();
    desired_attrs.insert("id".to_string(), Value::string("i-gone"));
    let mut metadata = instance_metadata("i-gone");
    metadata.source_identifier = Some("aws_instance.gone".to_string());
    let desired = StateResource::new(metadata, desired_attrs);

    let engine = DriftEngine::new(
        Arc::new(FakeStateProvider(vec![desired])),
        Arc::new(FakePlatformProvider(vec![])),
    );
    let reporter = CollectingReporter(std::sync::Mutex::new(Vec::new()));
    let ctx = ReportContext { workspace: "default".to_string(), provider_type: "fake".to_string() };

    engine.run(&[ResourceKind::ComputeInstance], &BTreeMap::new(), &reporter, &ctx).await.unwrap();

    let results = reporter.0.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ComparisonStatus::Missing);
    assert_eq!(results[0].source_identifier.as_deref(), Some("aws_instance.gone"));
}

#[tokio::test]
async fn hydration_failure_is_cached_and_reported_once_per_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let resource = Arc::new(PlatformResource::new(
        instance_metadata("i-1"),
        Box::new(CountingFailingHydrator { calls: calls.clone() }),
    ));

    let cancel = CancellationToken::new();
    let (_, err1) = resource.attributes(&cancel).await;
    let (_, err2) = resource.attributes(&cancel).await;

    assert!(err1.is_some());
    assert!(err2.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1, "hydration must only run once, even after failure");
}
