//! Drift engine: per requested kind, load desired + actual state in
//! parallel, pair them, compare, and report.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::comparer::comparer_for;
use crate::comparer::generic::classify;
use crate::error::{DriftError, ErrorCode};
use crate::matcher::match_resources;
use crate::model::{ComparisonResult, ComparisonStatus, PlatformProvider, ResourceKind, StateProvider};
use crate::output::{ReportContext, Reporter};

pub struct DriftEngine {
    pub state_provider: Arc<dyn StateProvider>,
    pub platform_provider: Arc<dyn PlatformProvider>,
}

impl DriftEngine {
    pub fn new(state_provider: Arc<dyn StateProvider>, platform_provider: Arc<dyn PlatformProvider>) -> Self {
        Self { state_provider, platform_provider }
    }

    /// Run the full pipeline for `kinds` and hand every result to
    /// `reporter`. Fails fast on a listing or state-load error; per-pair
    /// comparison errors become `ComparisonStatus::Error` results instead
    /// of aborting the run.
    pub async fn run(
        &self,
        kinds: &[ResourceKind],
        filters: &BTreeMap<String, String>,
        reporter: &dyn Reporter,
        ctx: &ReportContext,
    ) -> Result<(), DriftError> {
        let mut all_results = Vec::new();

        for &kind in kinds {
            let results = self.run_kind(kind, filters).await?;
            all_results.extend(results);
        }

        reporter.report(ctx, &all_results).await
    }

    async fn run_kind(
        &self,
        kind: ResourceKind,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<ComparisonResult>, DriftError> {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);

        let platform_provider = self.platform_provider.clone();
        let listing_cancel = cancel.clone();
        let listing_kinds = vec![kind];
        let listing_filters = filters.clone();
        let listing = tokio::spawn(async move {
            platform_provider.list_resources(listing_cancel, &listing_kinds, &listing_filters, tx).await
        });

        let state_provider = self.state_provider.clone();
        let loading = tokio::spawn(async move { state_provider.list(kind).await });

        let mut actual = Vec::new();
        while let Some(resource) = rx.recv().await {
            actual.push(resource);
        }

        let listing_result = listing
            .await
            .map_err(|e| DriftError::new(ErrorCode::Internal, format!("listing task panicked: {e}")))?;
        if let Err(e) = listing_result {
            cancel.cancel();
            return Err(e);
        }

        let desired = loading
            .await
            .map_err(|e| DriftError::new(ErrorCode::Internal, format!("state load task panicked: {e}")))??;

        let matching = match_resources(desired, actual, &cancel).await?;

        let comparer = comparer_for(kind);
        let mut results = Vec::with_capacity(
            matching.matched.len() + matching.unmatched_desired.len() + matching.unmatched_actual.len(),
        );

        for (desired, actual) in matching.matched {
            let (actual_attrs, hydration_error) = actual.attributes(&cancel).await;
            let source_identifier = desired.metadata.source_identifier.clone();
            let provider_id = actual.metadata.provider_assigned_id.clone();

            if let Some(err) = hydration_error {
                results.push(ComparisonResult {
                    kind,
                    source_identifier,
                    provider_id,
                    status: ComparisonStatus::Error,
                    diffs: Vec::new(),
                });
                tracing::warn!("hydration failed for {:?}: {}", provider_id, err);
                continue;
            }

            match comparer.compare(&desired.attributes, &actual_attrs) {
                Ok(diffs) => results.push(classify(kind, source_identifier, provider_id, diffs)),
                Err(e) => {
                    tracing::warn!("comparison failed for {:?}: {}", source_identifier, e);
                    results.push(ComparisonResult {
                        kind,
                        source_identifier,
                        provider_id,
                        status: ComparisonStatus::Error,
                        diffs: Vec::new(),
                    });
                }
            }
        }

        for desired in matching.unmatched_desired {
            results.push(ComparisonResult {
                kind,
                source_identifier: desired.metadata.source_identifier.clone(),
                provider_id: None,
                status: ComparisonStatus::Missing,
                diffs: Vec::new(),
            });
        }

        for actual in matching.unmatched_actual {
            results.push(ComparisonResult {
                kind,
                source_identifier: None,
                provider_id: actual.metadata.provider_assigned_id.clone(),
                status: ComparisonStatus::Unmanaged,
                diffs: Vec::new(),
            });
        }

        Ok(results)
    }
}
