//! Terraform-plan-styled console reporter, grounded on the legend and
//! symbol conventions in oxid's `output::formatter` module.

use async_trait::async_trait;
use colored::Colorize;

use crate::error::DriftError;
use crate::model::{ComparisonResult, ComparisonStatus};

use super::{ReportContext, Reporter};

pub struct ConsoleReporter;

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn report(&self, ctx: &ReportContext, results: &[ComparisonResult]) -> Result<(), DriftError> {
        println!();
        println!(
            "Drift check for workspace {} against provider {}",
            ctx.workspace.bold(),
            ctx.provider_type
        );

        let drifted: Vec<&ComparisonResult> = results.iter().filter(|r| r.status == ComparisonStatus::Drifted).collect();
        let missing: Vec<&ComparisonResult> = results.iter().filter(|r| r.status == ComparisonStatus::Missing).collect();
        let unmanaged: Vec<&ComparisonResult> = results.iter().filter(|r| r.status == ComparisonStatus::Unmanaged).collect();
        let errored: Vec<&ComparisonResult> = results.iter().filter(|r| r.status == ComparisonStatus::Error).collect();

        if drifted.is_empty() && missing.is_empty() && unmanaged.is_empty() && errored.is_empty() {
            println!("{}", "No drift detected. Infrastructure matches declared state.".green());
            return Ok(());
        }

        println!("Resources are indicated with the following symbols:");
        if !drifted.is_empty() {
            println!("  {} drifted", "~".yellow().bold());
        }
        if !missing.is_empty() {
            println!("  {} missing (declared but not found)", "-".red().bold());
        }
        if !unmanaged.is_empty() {
            println!("  {} unmanaged (found but not declared)", "+".cyan().bold());
        }
        if !errored.is_empty() {
            println!("  {} error", "!".red().bold());
        }
        println!();

        for result in &drifted {
            print_resource(result, "~".yellow().bold().to_string());
        }
        for result in &missing {
            print_resource(result, "-".red().bold().to_string());
        }
        for result in &unmanaged {
            print_resource(result, "+".cyan().bold().to_string());
        }
        for result in &errored {
            print_resource(result, "!".red().bold().to_string());
        }

        println!();
        println!(
            "{} drifted, {} missing, {} unmanaged, {} errored",
            drifted.len(),
            missing.len(),
            unmanaged.len(),
            errored.len()
        );

        Ok(())
    }
}

fn print_resource(result: &ComparisonResult, symbol: String) {
    let name = result
        .source_identifier
        .clone()
        .or_else(|| result.provider_id.clone())
        .unwrap_or_else(|| "<unknown>".to_string());
    println!("  {symbol} {} {}", result.kind, name);
    for diff in &result.diffs {
        let details = diff.details.clone().unwrap_or_default();
        println!("      {}: {}", diff.attribute_name, details);
    }
}
