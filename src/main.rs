use clap::Parser;
use scholar_harvest::config::{load_config, Config};
use scholar_harvest::freshness;
use scholar_harvest::session::{SessionCache, SessionStore};
use scholar_harvest::{CrawlController, CrawlError, DatasetStore, ScholarFetcher};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Scholar Harvest - incrementally harvest Google Scholar author profiles
/// into a locally persisted, reconciled dataset.
#[derive(Parser, Debug)]
#[command(name = "scholar-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Harvest Google Scholar author profiles into a reconciled dataset", long_about = None)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv, -vvv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scholar ids to harvest; overrides both the config file and
    /// freshness-driven selection
    #[arg(long = "id", value_name = "SCHOLAR_ID")]
    ids: Vec<String>,

    /// Re-scrape publications older than this many days
    #[arg(long, value_name = "DAYS")]
    threshold_days: Option<u32>,

    /// Dataset file to read and update
    #[arg(long, value_name = "PATH")]
    dataset: Option<PathBuf>,
}

/// Exit code when the service blocked the run; partial results are already
/// persisted, so a wrapper can solve the challenge and re-invoke.
const EXIT_BLOCKED: i32 = 3;

const EXIT_FAILURE: i32 = 2;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };

    // Logs go to stderr; stdout carries only the dataset.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("scholar_harvest={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            std::process::exit(EXIT_FAILURE);
        }
    };

    std::process::exit(run(cli, config).await);
}

async fn run(cli: Cli, mut config: Config) -> i32 {
    if let Some(path) = cli.dataset {
        config.dataset_path = path;
    }
    if let Some(days) = cli.threshold_days {
        config.rescrape_threshold_days = days;
    }
    if !cli.ids.is_empty() {
        config.scholar_ids = cli.ids;
    }

    let store = DatasetStore::new(&config.dataset_path);
    let dataset = store.load();
    tracing::info!(
        authors = dataset.len(),
        path = %config.dataset_path.display(),
        "loaded dataset"
    );

    let targets = if config.scholar_ids.is_empty() {
        freshness::select_targets(&dataset, config.rescrape_threshold_days)
    } else {
        config.scholar_ids.clone()
    };

    if targets.is_empty() {
        tracing::info!("every tracked author is fresh; nothing to do");
        return emit_dataset(&dataset);
    }
    tracing::info!(targets = targets.len(), "selected harvest targets");

    let fetcher = match ScholarFetcher::new() {
        Ok(fetcher) => fetcher,
        Err(err) => {
            tracing::error!(%err, "could not construct fetcher");
            return EXIT_FAILURE;
        }
    };

    // Replay the last solved session, if any, and drop it if the service
    // no longer honors it.
    let session_cache = SessionCache::new(&config.session_cache_path);
    if let Some(session) = session_cache.load() {
        fetcher.inject_cookies(&session.cookies);
        match fetcher.validate().await {
            Ok(true) => tracing::info!("cached session accepted"),
            Ok(false) => {
                tracing::warn!("cached session rejected; continuing without it");
                session_cache.remove();
            }
            Err(err) => {
                tracing::warn!(%err, "session validation failed; continuing anyway");
            }
        }
    }

    let skip_pub_ids = freshness::dataset_skip_ids(&dataset, config.rescrape_threshold_days);
    let controller = CrawlController::new(&fetcher, &store, config.crawl());

    match controller.run(&targets, &skip_pub_ids).await {
        Ok(report) => {
            if !report.soft_failures.is_empty() {
                tracing::warn!(
                    failed = report.soft_failures.len(),
                    ids = ?report.soft_failures,
                    "some authors could not be fetched"
                );
            }
            let merged = match store.merge_and_save(&report.fetched) {
                Ok(merged) => merged,
                Err(err) => {
                    tracing::error!(%err, "failed to persist harvested records");
                    return EXIT_FAILURE;
                }
            };
            tracing::info!(
                fetched = report.fetched.len(),
                authors = merged.len(),
                "harvest complete"
            );
            emit_dataset(&merged)
        }
        Err(CrawlError::Blocked { scholar_id, reason }) => {
            tracing::error!(
                %scholar_id,
                %reason,
                "run blocked by the service; partial results were saved"
            );
            EXIT_BLOCKED
        }
    }
}

/// Print the dataset to stdout in the same shape it is persisted in: a
/// JSON array of author records sorted by `scholar_id`.
fn emit_dataset(dataset: &scholar_harvest::store::Dataset) -> i32 {
    let authors: Vec<_> = dataset.values().collect();
    match serde_json::to_string_pretty(&authors) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(err) => {
            tracing::error!(%err, "failed to render dataset");
            EXIT_FAILURE
        }
    }
}
