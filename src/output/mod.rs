//! Reporting: renders `ComparisonResult`s for a drift run.

pub mod console;
pub mod json;

use async_trait::async_trait;

use crate::error::DriftError;
use crate::model::ComparisonResult;

/// A run's context, passed to the reporter alongside its results.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub workspace: String,
    pub provider_type: String,
}

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, ctx: &ReportContext, results: &[ComparisonResult]) -> Result<(), DriftError>;
}
