//! JSON reporter: a structured dump consumable by other tooling.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{DriftError, ErrorCode};
use crate::model::ComparisonResult;

use super::{ReportContext, Reporter};

#[derive(Serialize)]
struct Report<'a> {
    workspace: &'a str,
    provider_type: &'a str,
    results: &'a [ComparisonResult],
}

pub struct JsonReporter;

#[async_trait]
impl Reporter for JsonReporter {
    async fn report(&self, ctx: &ReportContext, results: &[ComparisonResult]) -> Result<(), DriftError> {
        let report = Report { workspace: &ctx.workspace, provider_type: &ctx.provider_type, results };
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| DriftError::wrap(ErrorCode::Internal, "failed to serialize report", e))?;
        println!("{rendered}");
        Ok(())
    }
}
