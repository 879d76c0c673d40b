//! cme-harvester main entry point
//!
//! This is the command-line interface for one harvest worker. A sharded run
//! launches N processes with the same `--shard-count` and distinct
//! `--shard-index` values; each walks its own stride of the paginated list.

use clap::Parser;
use cme_harvester::config::{load_site_profile, RunConfig, SiteSelectors, UploadConfig};
use cme_harvester::driver::CdpDriver;
use cme_harvester::output::CsvSink;
use cme_harvester::upload::{HttpUploadClient, UploadClient};
use cme_harvester::{Harvester, ShardPlan, TimingConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// cme-harvester: a resilient extraction worker for the Mustamir CME
/// external-activities portal
///
/// Walks the paginated activity list, opens each row's detail view, and
/// persists one CSV record per activity plus a cumulative master. Runs may be
/// split across shards: worker i of N starts at page start+i and strides by N.
#[derive(Parser, Debug)]
#[command(name = "cme-harvester")]
#[command(version = "1.0.0")]
#[command(about = "Sharded extraction worker for the Mustamir CME portal", long_about = None)]
struct Cli {
    /// Pages processed by this shard before stopping (0 = until pagination ends)
    #[arg(long, default_value_t = 0)]
    max_pages: u32,

    /// Global 1-based start page (the shard's index is added on top)
    #[arg(long, default_value_t = 1)]
    start_page: u32,

    /// Total number of parallel workers
    #[arg(long, default_value_t = 1)]
    shard_count: u32,

    /// This worker's 0-based shard index
    #[arg(long, default_value_t = 0)]
    shard_index: u32,

    /// Readiness timeout for the list view, in milliseconds
    #[arg(long, default_value_t = 120_000)]
    list_timeout_ms: u64,

    /// Run the browser without a visible window
    #[arg(long)]
    headless: bool,

    /// Local output directory
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Object-store endpoint for checkpoint uploads (disabled when absent)
    #[arg(long)]
    upload_endpoint: Option<String>,

    /// Remote key prefix for uploaded artifacts
    #[arg(long, default_value = "runs/current")]
    upload_prefix: String,

    /// Upload the master every N extracted records
    #[arg(long, default_value_t = 25)]
    upload_every: u32,

    /// Optional TOML site profile overriding the built-in selectors
    #[arg(long, value_name = "FILE")]
    site_config: Option<PathBuf>,

    /// Validate the plan and show what would be harvested without a browser
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    // Shard arithmetic fails fast, before any browser work
    let plan = ShardPlan::plan(cli.shard_count, cli.shard_index, cli.start_page)?;

    let mut root_url = cme_harvester::config::DEFAULT_ROOT_URL.to_string();
    let mut selectors = SiteSelectors::default();
    if let Some(path) = &cli.site_config {
        tracing::info!("Loading site profile from: {}", path.display());
        let profile = load_site_profile(path)?;
        if let Some(url) = profile.root_url {
            root_url = url;
        }
        selectors = profile.selectors;
    }

    let upload = cli.upload_endpoint.clone().map(|endpoint| UploadConfig {
        endpoint,
        prefix: cli.upload_prefix.clone(),
        flush_every: cli.upload_every,
    });
    let config = RunConfig {
        root_url,
        out_dir: cli.out_dir.clone(),
        max_pages: cli.max_pages,
        start_page: cli.start_page,
        list_timeout: Duration::from_millis(cli.list_timeout_ms),
        headless: cli.headless,
        upload,
        timing: TimingConfig::default(),
    };

    if cli.dry_run {
        handle_dry_run(&config, &plan);
        return Ok(());
    }

    harvest(config, selectors, plan).await
}

async fn harvest(
    config: RunConfig,
    selectors: SiteSelectors,
    plan: ShardPlan,
) -> Result<(), Box<dyn std::error::Error>> {
    let sink = CsvSink::new(&config.out_dir, &plan.artifact_suffix())?;
    let uploader: Option<Arc<dyn UploadClient>> = config
        .upload
        .as_ref()
        .map(|u| Arc::new(HttpUploadClient::new(u.endpoint.clone())) as Arc<dyn UploadClient>);

    tracing::info!("Launching browser (headless: {})", config.headless);
    let driver = Arc::new(CdpDriver::launch(config.headless).await?);

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing the current row");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let harvester = Harvester::new(
        config,
        selectors,
        plan,
        Arc::clone(&driver) as Arc<dyn cme_harvester::Driver>,
        Box::new(sink),
        uploader,
        shutdown,
    );
    let result = harvester.run().await;

    if let Ok(driver) = Arc::try_unwrap(driver) {
        driver.close().await;
    }

    let summary = result?;
    tracing::info!(
        "Harvest complete: {} page(s), {} record(s), {} skipped row(s)",
        summary.pages_processed,
        summary.records_extracted,
        summary.rows_skipped
    );
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("cme_harvester=info,warn"),
            1 => EnvFilter::new("cme_harvester=debug,info"),
            2 => EnvFilter::new("cme_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the shard plan without launching a browser
fn handle_dry_run(config: &RunConfig, plan: &ShardPlan) {
    println!("=== cme-harvester Dry Run ===\n");

    println!("Target:");
    println!("  Root URL: {}", config.root_url);
    println!("  Output directory: {}", config.out_dir.display());
    println!();

    println!("Shard plan:");
    println!("  Worker: {} of {}", plan.shard_index + 1, plan.shard_count);
    println!("  Global start page: {}", config.start_page);
    println!("  This shard starts at: {}", plan.effective_start_page);
    println!("  Stride: {}", plan.stride);
    if config.max_pages > 0 {
        let pages: Vec<String> = (0..config.max_pages.min(8))
            .map(|n| plan.page_at(n).to_string())
            .collect();
        let ellipsis = if config.max_pages > 8 { ", ..." } else { "" };
        println!("  Pages: {}{}", pages.join(", "), ellipsis);
    } else {
        println!(
            "  Pages: {}, {}, {}, ... (until pagination ends)",
            plan.page_at(0),
            plan.page_at(1),
            plan.page_at(2)
        );
    }
    println!();

    match &config.upload {
        Some(upload) => {
            println!("Uploads:");
            println!("  Endpoint: {}", upload.endpoint);
            println!("  Key prefix: {}", plan.key_prefix(&upload.prefix));
            println!("  Flush every: {} record(s)", upload.flush_every);
        }
        None => println!("Uploads: disabled"),
    }
}
