use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Reset SIGPIPE to default behavior so piping (e.g. `drift-detector ... | less`)
/// exits cleanly instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use drift_detector::engine::DriftEngine;
use drift_detector::hcl::HclStateProvider;
use drift_detector::logging::init_tracing;
use drift_detector::model::{PlatformProvider, ResourceKind};
use drift_detector::output::console::ConsoleReporter;
use drift_detector::output::json::JsonReporter;
use drift_detector::output::{ReportContext, Reporter};
use drift_detector::provider::aws_provider::AwsPlatformProvider;
use drift_detector::provider::handlers::bucket::ObjectStorageBucketHandler;
use drift_detector::provider::handlers::compute::ComputeInstanceHandler;
use drift_detector::provider::handlers::ResourceHandler;
use drift_detector::provider::rate_limiter::RateLimiter;

/// drift-detector - compares HCL-declared infrastructure against a live AWS account
#[derive(Parser)]
#[command(name = "drift-detector", version, about, long_about = None)]
struct Cli {
    /// Directory containing .tf / .tf.json files
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Extra tfvars files to apply, in addition to terraform.tfvars and *.auto.tfvars
    #[arg(long = "var-file")]
    var_files: Vec<PathBuf>,

    /// Terraform workspace name (affects terraform.workspace in HCL)
    #[arg(long, default_value = "default")]
    workspace: String,

    /// Resource kinds to check (defaults to all supported kinds)
    #[arg(long, value_enum)]
    kind: Vec<KindArg>,

    /// Maximum AWS API requests per second
    #[arg(long, default_value = "20")]
    rate_limit: u32,

    /// Output format
    #[arg(long, value_enum, default_value = "console")]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    ComputeInstance,
    StorageBucket,
}

impl From<KindArg> for ResourceKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::ComputeInstance => ResourceKind::ComputeInstance,
            KindArg::StorageBucket => ResourceKind::StorageBucket,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Console,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    RateLimiter::init(cli.rate_limit);

    let state_provider = Arc::new(
        HclStateProvider::load(&cli.dir, &cli.var_files, &cli.workspace)
            .context("failed to load HCL configuration")?,
    );

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let ec2_client = aws_sdk_ec2::Client::new(&aws_config);
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let sts_client = aws_sdk_sts::Client::new(&aws_config);

    let account_id = sts_client
        .get_caller_identity()
        .send()
        .await
        .context("failed to resolve AWS account id via sts:GetCallerIdentity")?
        .account()
        .map(String::from)
        .unwrap_or_default();

    let handlers: Vec<Arc<dyn ResourceHandler>> = vec![
        Arc::new(ComputeInstanceHandler::new(ec2_client, sts_client)),
        Arc::new(ObjectStorageBucketHandler::new(s3_client, account_id)),
    ];
    let platform_provider: Arc<dyn PlatformProvider> = Arc::new(AwsPlatformProvider::new(handlers));

    let kinds: Vec<ResourceKind> = if cli.kind.is_empty() {
        vec![ResourceKind::ComputeInstance, ResourceKind::StorageBucket]
    } else {
        cli.kind.iter().map(|k| (*k).into()).collect()
    };

    if kinds.is_empty() {
        bail!("no resource kinds to check");
    }

    let reporter: Box<dyn Reporter> = match cli.format {
        OutputFormat::Console => Box::new(ConsoleReporter),
        OutputFormat::Json => Box::new(JsonReporter),
    };
    let ctx = ReportContext { workspace: cli.workspace.clone(), provider_type: "aws".to_string() };

    let filters = BTreeMap::new();
    let engine = DriftEngine::new(state_provider, platform_provider);
    engine.run(&kinds, &filters, reporter.as_ref(), &ctx).await?;

    Ok(())
}
