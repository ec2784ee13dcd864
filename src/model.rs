//! The data model shared by both sides of the pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{DriftError, ErrorCode};
use crate::value::Value;

/// Closed enumeration of resource categories. Routes between IaC types,
/// platform handlers, and comparers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    ComputeInstance,
    StorageBucket,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::ComputeInstance => write!(f, "ComputeInstance"),
            ResourceKind::StorageBucket => write!(f, "StorageBucket"),
        }
    }
}

/// Identity envelope common to both the desired and actual side of a
/// resource.
#[derive(Debug, Clone)]
pub struct ResourceMetadata {
    pub kind: ResourceKind,
    pub provider_type: String,
    pub provider_assigned_id: Option<String>,
    pub source_identifier: Option<String>,
    pub region: Option<String>,
    pub account_id: Option<String>,
}

impl ResourceMetadata {
    pub fn new(kind: ResourceKind, provider_type: impl Into<String>) -> Self {
        Self {
            kind,
            provider_type: provider_type.into(),
            provider_assigned_id: None,
            source_identifier: None,
            region: None,
            account_id: None,
        }
    }
}

/// A resource declared in IaC, fully evaluated. Immutable after
/// construction — attributes never change once the HCL evaluator
/// produces the resource.
#[derive(Debug, Clone)]
pub struct StateResource {
    pub metadata: ResourceMetadata,
    pub attributes: BTreeMap<String, Value>,
}

impl StateResource {
    pub fn new(metadata: ResourceMetadata, attributes: BTreeMap<String, Value>) -> Self {
        Self { metadata, attributes }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Internal state machine backing `PlatformResource::attributes`.
#[derive(Debug, Clone)]
enum Hydration {
    Uninitialized,
    Ready(BTreeMap<String, Value>),
    Failed(BTreeMap<String, Value>, Arc<DriftError>),
}

/// A resource observed on the cloud platform. Metadata is fully populated
/// at construction time; the attribute map is hydrated lazily and cached
/// at-most-once.
pub struct PlatformResource {
    pub metadata: ResourceMetadata,
    hydrate: Box<dyn Hydrator>,
    state: tokio::sync::RwLock<Hydration>,
}

/// The supplementary-fetch closure a handler supplies when constructing a
/// `PlatformResource`. Kept as a trait object so handlers can close over
/// whatever SDK client and partial data they already fetched during
/// listing.
#[async_trait]
pub trait Hydrator: Send + Sync {
    /// Returns the fully-hydrated map on success. On failure, returns
    /// whatever fields were hydrated before the failing sub-fetch
    /// alongside the composite error — both are cached together so every
    /// subsequent call sees the same partial map and the same error.
    async fn hydrate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, Value>, (BTreeMap<String, Value>, DriftError)>;
}

impl PlatformResource {
    pub fn new(metadata: ResourceMetadata, hydrate: Box<dyn Hydrator>) -> Self {
        Self {
            metadata,
            hydrate,
            state: tokio::sync::RwLock::new(Hydration::Uninitialized),
        }
    }

    /// Compute (on first call) or return the cached attribute map and/or
    /// error. Subsequent calls are O(map copy) — no new network calls.
    pub async fn attributes(
        &self,
        cancel: &CancellationToken,
    ) -> (BTreeMap<String, Value>, Option<Arc<DriftError>>) {
        {
            let guard = self.state.read().await;
            match &*guard {
                Hydration::Ready(map) => return (map.clone(), None),
                Hydration::Failed(map, err) => return (map.clone(), Some(err.clone())),
                Hydration::Uninitialized => {}
            }
        }

        let mut guard = self.state.write().await;
        // Re-check under the write lock: another caller may have raced us.
        match &*guard {
            Hydration::Ready(map) => return (map.clone(), None),
            Hydration::Failed(map, err) => return (map.clone(), Some(err.clone())),
            Hydration::Uninitialized => {}
        }

        match self.hydrate.hydrate(cancel).await {
            Ok(map) => {
                *guard = Hydration::Ready(map.clone());
                (map, None)
            }
            Err((partial, err)) => {
                let err = Arc::new(err);
                *guard = Hydration::Failed(partial.clone(), err.clone());
                (partial, Some(err))
            }
        }
    }
}

/// A single attribute-level difference.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AttributeDiff {
    pub attribute_name: String,
    pub expected_value: Value,
    pub actual_value: Value,
    pub details: Option<String>,
}

/// The verdict for a matched-or-unmatched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ComparisonStatus {
    NoDrift,
    Drifted,
    Missing,
    Unmanaged,
    Error,
}

/// The outcome of comparing (or failing to pair) one resource.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComparisonResult {
    pub kind: ResourceKind,
    pub source_identifier: Option<String>,
    pub provider_id: Option<String>,
    pub status: ComparisonStatus,
    pub diffs: Vec<AttributeDiff>,
}

impl serde::Serialize for ResourceKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// `Matcher` output: desired/actual resources paired by identity, plus
/// whichever side had no counterpart.
pub struct MatchingResult {
    pub matched: Vec<(StateResource, Arc<PlatformResource>)>,
    pub unmatched_desired: Vec<StateResource>,
    pub unmatched_actual: Vec<Arc<PlatformResource>>,
}

/// Consumed protocol: the HCL evaluator implements this.
#[async_trait]
pub trait StateProvider: Send + Sync {
    fn provider_type(&self) -> &'static str;
    async fn list(&self, kind: ResourceKind) -> Result<Vec<StateResource>, DriftError>;
    async fn get(&self, kind: ResourceKind, id: &str) -> Result<StateResource, DriftError>;
}

/// Consumed protocol: a cloud-specific platform provider implements this.
#[async_trait]
pub trait PlatformProvider: Send + Sync {
    fn provider_type(&self) -> &'static str;

    async fn list_resources(
        &self,
        cancel: CancellationToken,
        kinds: &[ResourceKind],
        filters: &BTreeMap<String, String>,
        out: tokio::sync::mpsc::Sender<Arc<PlatformResource>>,
    ) -> Result<(), DriftError>;

    async fn get_resource(
        &self,
        cancel: &CancellationToken,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Arc<PlatformResource>, DriftError>;
}

pub(crate) fn not_implemented(msg: impl Into<String>) -> DriftError {
    DriftError::new(ErrorCode::NotImplemented, msg)
}
