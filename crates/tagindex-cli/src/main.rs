//! tagindex - publish the dist-tag index
//!
//! Builds the registry document from the metadata cache, then for every
//! configured channel decides whether to publish, re-promote or skip, and
//! only moves `latest` after the consistency check passes.
//!
//! Exit status is non-zero when the registry cannot be built or any channel
//! failed for a reason other than a refused publish upload. A failed publish
//! is logged and the other channels carry on.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};

use tagindex_core::{
    load_package_list, ChannelResult, Collaborators, FsMetadataCache, Orchestrator, RunReport,
    WorkflowConfig,
};
use tagindex_remote::{FsOutputSink, NpmRegistryClient, SystemClock, TokioDelay};

#[derive(Parser, Debug)]
#[command(name = "tagindex")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Publish the aggregated dist-tag registry", long_about = None)]
struct Cli {
    /// Decide and validate, but do not publish, wait or move tags
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON list of packages to index
    #[arg(long, env = "TAGINDEX_PACKAGES")]
    packages: PathBuf,

    /// Directory holding one cached metadata file per package
    #[arg(long, env = "TAGINDEX_CACHE_DIR")]
    cache_dir: PathBuf,

    /// Where generated files are written (overrides the config file)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tagindex_core::init_tracing(cli.json, level);

    let config = load_config(&cli)?;
    let env = Collaborators {
        client: Arc::new(
            NpmRegistryClient::from_env().context("Failed to set up the registry client")?,
        ),
        sink: Arc::new(
            FsOutputSink::new(&config.output_dir).with_context(|| {
                format!("Failed to open output directory {:?}", config.output_dir)
            })?,
        ),
        clock: Arc::new(SystemClock),
        delay: Arc::new(TokioDelay),
    };

    let report = run(&cli, config, env).await?;
    print_report(&report);
    Ok(exit_code(&report))
}

/// Configuration file and environment, with command-line flags applied last.
fn load_config(cli: &Cli) -> Result<WorkflowConfig> {
    let mut config = WorkflowConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if cli.dry_run {
        config.dry_run = true;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    Ok(config)
}

async fn run(cli: &Cli, config: WorkflowConfig, env: Collaborators) -> Result<RunReport> {
    let packages = load_package_list(&cli.packages)
        .with_context(|| format!("Failed to read package list {:?}", cli.packages))?;
    info!(
        packages = packages.len(),
        dry_run = config.dry_run,
        "building registry"
    );

    let orchestrator = Orchestrator::new(config, env)?;
    let cache = FsMetadataCache::new(&cli.cache_dir);
    let report = orchestrator
        .run_from_cache(&packages, &cache)
        .await
        .context("Failed to build registry")?;
    Ok(report)
}

fn print_report(report: &RunReport) {
    for result in &report.results {
        match result {
            ChannelResult::Completed(outcome) => {
                let state = outcome
                    .final_state()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let dry = if outcome.dry_run { " (dry run)" } else { "" };
                println!(
                    "✓ {}: {} → {} at {}{}",
                    outcome.channel, outcome.decision, state, outcome.version, dry
                );
                for path in &outcome.validation.deprecated {
                    println!("    deprecated: {}", path);
                }
            }
            ChannelResult::Failed { channel, error } => {
                println!("✗ {}: {}", channel, error);
            }
        }
    }
}

fn exit_code(report: &RunReport) -> ExitCode {
    if report.has_fatal() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
