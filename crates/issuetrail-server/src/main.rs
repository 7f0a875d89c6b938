mod http;
mod intake;
mod metrics;
mod queue;
mod settings;
mod state;
mod valkey;
mod worker;

use anyhow::Context;
use clap::{Parser, Subcommand};
use http::router;
use intake::IntakeFilter;
use issuetrail_core::lifecycle::LifecycleManager;
use issuetrail_core::store::{MemoryStore, OccurrenceStore};
use issuetrail_core::tracker::TrackerClient;
use issuetrail_core::types::CapturedError;
use issuetrail_github::client::GithubClient;
use metrics::init_metrics;
use queue::ReportQueue;
use settings::{ReporterArgs, ServiceArgs, StoreKind};
use state::{AppState, ReportStats};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use valkey::ValkeyStore;
use worker::{FingerprintLocks, Reporter, RetryPolicy, WorkerPool};

#[derive(Parser)]
#[command(name = "issuetrail")]
#[command(about = "Deduplicates runtime errors into GitHub issues, one issue per error per tracking window")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "ISSUETRAIL_LOG_JSON")]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the intake hook and report workers
    Run {
        #[command(flatten)]
        reporter: ReporterArgs,
        #[command(flatten)]
        service: ServiceArgs,
    },
    /// Report a single captured error and print the outcome
    Report {
        #[command(flatten)]
        reporter: ReporterArgs,
        /// JSON file holding the captured error ("-" for stdin)
        #[arg(long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run { reporter, service } => run_service(reporter, service).await,
        Commands::Report { reporter, input } => report_once(reporter, input).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Occurrence store chosen on the command line, plus the sweeper task when the
/// store lives in this process.
async fn build_store(
    args: &ReporterArgs,
    sweep_interval: Duration,
) -> anyhow::Result<(Arc<dyn OccurrenceStore>, Option<JoinHandle<()>>)> {
    match args.store {
        StoreKind::Memory => {
            let store = MemoryStore::new();
            let sweeper = store.spawn_sweeper(sweep_interval);
            info!("Using in-memory occurrence store");
            Ok((Arc::new(store), Some(sweeper)))
        }
        StoreKind::Valkey => {
            let store = ValkeyStore::connect(
                args.valkey_url()?,
                &args.valkey_namespace,
                args.valkey_pool_size,
            )
            .await
            .context("Failed to connect to the Valkey occurrence store")?;
            Ok((Arc::new(store), None))
        }
    }
}

fn build_reporter(args: &ReporterArgs, store: Arc<dyn OccurrenceStore>) -> anyhow::Result<Reporter> {
    let github = args.github_config()?;
    info!(repository = %github.repository, "Reporting to GitHub");
    let tracker: Arc<dyn TrackerClient> =
        Arc::new(GithubClient::new(github).context("Failed to build GitHub client")?);
    Ok(LifecycleManager::new(
        store,
        tracker,
        Arc::new(args.reporter_config()?),
    ))
}

async fn run_service(reporter_args: ReporterArgs, service: ServiceArgs) -> anyhow::Result<()> {
    info!("Starting issuetrail");

    let handle = init_metrics()?;
    let filter = IntakeFilter::new(service.monitored_statuses()?, service.reporting_enabled());
    if !filter.is_enabled() {
        warn!(
            environment = %service.environment,
            "Reporting disabled outside production; captured errors will be skipped"
        );
    }

    let (store, sweeper) = build_store(&reporter_args, service.sweep_interval()).await?;
    let reporter = Arc::new(build_reporter(&reporter_args, store)?);

    let queue = Arc::new(ReportQueue::new(service.queue_size));
    let stats = Arc::new(ReportStats::default());
    let locks = if service.allow_concurrent_fingerprints {
        warn!("Per-fingerprint serialization disabled; concurrent duplicates may open extra issues");
        None
    } else {
        Some(Arc::new(FingerprintLocks::new()))
    };

    let pool = WorkerPool {
        queue: queue.clone(),
        reporter,
        locks,
        retry: RetryPolicy {
            max_attempts: service.max_attempts.max(1),
            ..RetryPolicy::default()
        },
        stats: stats.clone(),
    };
    let cancel = CancellationToken::new();
    let workers = pool.spawn(service.workers, &cancel);
    info!(workers = workers.len(), queue_size = queue.capacity(), "Report workers started");

    let state = AppState::new(queue, filter, stats, workers.len()).with_metrics(handle);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&service.http)
        .await
        .with_context(|| format!("Failed to bind {}", service.http))?;
    info!("HTTP intake listening on http://{}", service.http);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("HTTP server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    cancel.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            warn!("Report worker ended abnormally: {}", e);
        }
    }
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("issuetrail stopped");
    Ok(())
}

async fn report_once(reporter_args: ReporterArgs, input: PathBuf) -> anyhow::Result<()> {
    let raw = if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read captured error from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&input)
            .with_context(|| format!("Failed to read {}", input.display()))?
    };
    let error: CapturedError = serde_json::from_str(&raw).context("Invalid captured error JSON")?;

    let (store, _) = build_store(&reporter_args, Duration::from_secs(60)).await?;
    if reporter_args.store == StoreKind::Memory {
        warn!("One-shot report with the in-memory store always opens a new issue");
    }
    let reporter = build_reporter(&reporter_args, store)?;

    let outcome = reporter.report(&error).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
