//! # api-key-reconciler
//!
//! Deploy-lifecycle hook binary. The host deployment tool invokes it at two
//! extension points:
//!
//! - `deploy` after a successful deploy - runs the add path
//! - `remove` on teardown - runs the remove path
//!
//! ## Usage
//!
//! ```bash
//! # Reconcile declared keys after a deploy
//! api-key-reconciler deploy --config serverless.yml --stage prod
//!
//! # Reconcile without printing generated key values
//! api-key-reconciler deploy --config serverless.yml --conceal
//!
//! # Tear down keys and plans on remove
//! api-key-reconciler remove --config serverless.yml --stage prod
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use api_key_reconciler::provider::aws::{AwsGateway, AwsKms, AwsStacks};
use api_key_reconciler::reconciler::{KeyReconciler, RunContext};
use api_key_reconciler::ServiceConfig;

/// Reconcile declared API Gateway keys and usage plans against live state.
#[derive(Parser)]
#[command(name = "api-key-reconciler")]
#[command(about = "Reconciles declared API Gateway keys and usage plans", long_about = None)]
struct Cli {
    /// Path to the declarative service file.
    #[arg(long, global = true, default_value = "serverless.yml")]
    config: PathBuf,

    /// Deployment stage; overrides the service file's `provider.stage`.
    #[arg(long, global = true)]
    stage: Option<String>,

    /// AWS region; overrides the service file's `provider.region`.
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the add path (invoked after a successful deploy).
    Deploy {
        /// Do not collect or report generated key values.
        #[arg(long)]
        conceal: bool,
    },
    /// Run the remove path (invoked on teardown).
    Remove,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_key_reconciler=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::load(&cli.config)?;

    // Input resolution failures are fatal; per-key failures are not.
    let stage = cli
        .stage
        .or_else(|| config.provider.stage.clone())
        .unwrap_or_else(|| "dev".to_string());
    let region = cli
        .region
        .or_else(|| config.provider.region.clone())
        .context("No region configured: pass --region or set provider.region")?;

    let ctx = RunContext {
        stack_name: config.stack_name(&stage),
        stage,
        region: region.clone(),
        conceal: matches!(&cli.command, Command::Deploy { conceal: true }),
    };

    let gateway = Arc::new(AwsGateway::new(&region).await);
    let stacks = Arc::new(AwsStacks::new(&region).await);
    let reconciler = KeyReconciler::new(gateway, stacks, Arc::new(AwsKms::new()));

    let keys = config.keys_for_stage(&ctx.stage);
    let default_plan = config.provider.default_usage_plan();

    match cli.command {
        Command::Deploy { .. } => {
            let summary = reconciler.add_keys(keys, &default_plan, &ctx).await?;
            info!(
                "Processed {} declared keys for stage {}: {} created, {} failed",
                keys.len(),
                ctx.stage,
                summary.created.len(),
                summary.failed.len()
            );
        }
        Command::Remove => {
            reconciler.remove_keys(keys, &default_plan).await?;
            info!("Removal run completed for stage {}", ctx.stage);
        }
    }

    Ok(())
}
