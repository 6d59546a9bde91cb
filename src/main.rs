//! vendor-harvest CLI - resumable, rate-limited vendor discovery runs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vendor_harvest::catalog::{CatalogFilter, WorkCatalog};
use vendor_harvest::config::HarvestConfig;
use vendor_harvest::dispatch::{Dispatcher, DispatcherConfig, RunContext};
use vendor_harvest::harvest::{
    Collaborators, CommandEvaluator, CommandGenerator, HarvestError, HarvestSettings, Harvester,
    JsonFileExporter, RetryConfig, RunSummary, TemplateGenerator, UnitSettings, WorkGenerator,
};
use vendor_harvest::limiter::RateLimiter;
use vendor_harvest::persistence::{DedupStore, ProcessedSet, ProgressStore, StateLayout};
use vendor_harvest::server::{self, AppState};
use vendor_harvest::types::{Category, DedupFields};

/// Resumable vendor discovery over a catalog of locations.
///
/// Processes every location of the catalog once per category, in rate-limited
/// batches, and keeps enough state on disk to resume after an interruption.
#[derive(Parser, Debug)]
#[command(name = "vendor-harvest")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process remaining locations for one or all categories.
    Run(RunArgs),
    /// Show persisted progress without processing anything.
    Status(StatusArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
struct CommonArgs {
    /// Location catalog JSON file.
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Directory holding progress, processed sets, records and exports.
    #[arg(long, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Restrict to one configured category (default: all, in turn).
    #[arg(long)]
    category: Option<String>,

    /// Restrict to one state.
    #[arg(long)]
    state: Option<String>,

    /// Restrict to one city (combine with --state).
    #[arg(long)]
    city: Option<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Shell command evaluating one task; receives task, category and location as $1..$3.
    #[arg(long, env = "VENDOR_HARVEST_EVALUATOR_CMD", value_name = "SCRIPT")]
    evaluator_cmd: String,

    /// Shell command generating tasks; receives category, location and count as $1..$3.
    #[arg(long, env = "VENDOR_HARVEST_GENERATOR_CMD", value_name = "SCRIPT")]
    generator_cmd: Option<String>,

    /// Locations per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Units of work in flight at once.
    #[arg(long)]
    max_workers: Option<usize>,

    /// Units started per rolling minute.
    #[arg(long)]
    max_requests_per_minute: Option<usize>,

    /// Tasks generated per location.
    #[arg(long)]
    queries_per_location: Option<usize>,

    /// Seconds to wait between batches.
    #[arg(long)]
    batch_pause_secs: Option<u64>,

    /// Export new records every N batches (0: only at the end of a category).
    #[arg(long)]
    export_every: Option<usize>,

    /// Deadline in seconds for each collaborator command.
    #[arg(long)]
    task_timeout_secs: Option<u64>,

    /// Revisit locations already marked processed.
    #[arg(long)]
    rescan: bool,

    /// Serve the status API on this address while running.
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vendor_harvest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Status(args) => status(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn base_config(common: &CommonArgs) -> Result<HarvestConfig, HarvestError> {
    let mut config = HarvestConfig::from_env()?;
    if let Some(dir) = &common.state_dir {
        config = config.with_state_dir(dir);
    }
    if let Some(path) = &common.catalog {
        config = config.with_catalog_path(path);
    }
    Ok(config)
}

fn scope(common: &CommonArgs) -> CatalogFilter {
    CatalogFilter::new(common.state.clone(), common.city.clone())
}

async fn run(args: RunArgs) -> Result<(), HarvestError> {
    let mut config = base_config(&args.common)?;
    if let Some(n) = args.batch_size {
        config = config.with_batch_size(n);
    }
    if let Some(n) = args.max_workers {
        config = config.with_max_workers(n);
    }
    if let Some(n) = args.max_requests_per_minute {
        config = config.with_max_requests_per_minute(n);
    }
    if let Some(n) = args.queries_per_location {
        config = config.with_tasks_per_item(n);
    }
    if let Some(secs) = args.batch_pause_secs {
        config = config.with_batch_pause(Duration::from_secs(secs));
    }
    if let Some(n) = args.export_every {
        config = config.with_export_every(n);
    }
    if let Some(secs) = args.task_timeout_secs {
        config = config.with_task_timeout(Duration::from_secs(secs));
    }
    config.validate()?;

    let categories = config.selected_categories(args.common.category.as_deref())?;
    let catalog = Arc::new(WorkCatalog::load(&config.catalog_path, config.batch_size)?);
    let layout = config.layout();

    let progress = Arc::new(ProgressStore::load(layout.progress_path()));
    let limiter = Arc::new(RateLimiter::new(config.max_requests_per_minute));
    let dispatcher = Dispatcher::new(
        DispatcherConfig::new(config.max_workers),
        limiter,
        Arc::clone(&progress),
    );
    let dedup = Arc::new(DedupStore::new(layout.vendors_dir(), DedupFields::default()));
    let ctx = Arc::new(RunContext::default());

    let server_shutdown = CancellationToken::new();
    let server_task = match &args.listen {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|source| HarvestError::Listen {
                    addr: addr.clone(),
                    source,
                })?;
            let app_state = AppState::new(
                Arc::clone(&catalog),
                Arc::clone(&progress),
                Arc::clone(&dedup),
                Arc::clone(&ctx),
                config.categories.clone(),
            );
            Some(tokio::spawn(server::serve(
                listener,
                app_state,
                server_shutdown.clone(),
            )))
        }
        None => None,
    };

    let signal_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; finishing units in flight");
            signal_ctx.cancel();
        }
    });

    let settings = HarvestSettings {
        filter: scope(&args.common),
        rescan: args.rescan,
        batch_pause: config.batch_pause,
        export_every: config.export_every,
        unit: UnitSettings {
            tasks_per_item: config.tasks_per_item,
            retry: RetryConfig::DEFAULT,
        },
    };
    let evaluator = CommandEvaluator::new(args.evaluator_cmd, config.task_timeout);
    let exporter = JsonFileExporter::new(layout.exports_dir());

    let parts = RunParts {
        catalog,
        dispatcher,
        dedup,
        layout,
        ctx,
        settings,
    };
    let summary = match args.generator_cmd {
        Some(script) => {
            let generator = CommandGenerator::new(script, config.task_timeout);
            harvest(parts, generator, evaluator, exporter, &categories).await
        }
        None => harvest(parts, TemplateGenerator, evaluator, exporter, &categories).await,
    };

    server_shutdown.cancel();
    if let Some(task) = server_task {
        match task.await {
            Ok(Err(e)) => warn!(error = %e, "Status server failed"),
            Err(e) => warn!(error = %e, "Status server task panicked"),
            Ok(Ok(())) => {}
        }
    }

    print!("{summary}");
    Ok(())
}

struct RunParts {
    catalog: Arc<WorkCatalog>,
    dispatcher: Dispatcher,
    dedup: Arc<DedupStore>,
    layout: StateLayout,
    ctx: Arc<RunContext>,
    settings: HarvestSettings,
}

async fn harvest<G: WorkGenerator + 'static>(
    parts: RunParts,
    generator: G,
    evaluator: CommandEvaluator,
    exporter: JsonFileExporter,
    categories: &[Category],
) -> RunSummary {
    let harvester = Harvester::new(
        parts.catalog,
        parts.dispatcher,
        parts.dedup,
        parts.layout,
        parts.ctx,
        Collaborators {
            generator,
            evaluator,
            exporter,
        },
        parts.settings,
    );
    harvester.run(categories).await
}

fn status(args: StatusArgs) -> Result<(), HarvestError> {
    let config = base_config(&args.common)?;
    let categories = config.selected_categories(args.common.category.as_deref())?;
    let catalog = WorkCatalog::load(&config.catalog_path, config.batch_size)?;
    let layout = config.layout();
    let filter = scope(&args.common);

    let counters = ProgressStore::load(layout.progress_path()).snapshot();
    println!(
        "Progress: processed={} successful={} failed={} (last update {})",
        counters.total_processed,
        counters.successful,
        counters.failed,
        counters.last_update.to_rfc3339()
    );
    println!("Scope: {filter}");

    let dedup = DedupStore::new(layout.vendors_dir(), DedupFields::default());
    for category in &categories {
        let path = layout.processed_path(category);
        let processed = if path.exists() {
            ProcessedSet::load(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Failed to read processed set");
                ProcessedSet::in_memory()
            })
        } else {
            ProcessedSet::in_memory()
        };
        println!(
            "  {category}: {} total, {} remaining ({:.1}% done), {} records",
            catalog.total_count(&filter),
            catalog.remaining_count(&filter, &processed),
            catalog.progress_percent(&filter, &processed),
            dedup.count(category),
        );
    }
    Ok(())
}
