//! Service Uptime Tracker Binary

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uptime_tracker::{
    Clock, Config, FileStore, HistoryStore, HttpProbe, PostFeed, Result, ServiceCheck,
    ServiceStatus, SystemClock, TrackerError, UptimeMonitor, UptimeTracker,
};

#[derive(Debug, Parser)]
#[command(name = "uptime_tracker", version, about = "Track service uptime and incidents")]
struct Cli {
    /// Directory holding the persisted state (overrides STATE_DIR)
    #[arg(long, global = true, env = "STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe all configured targets on a schedule until Ctrl-C
    Run,
    /// Probe all configured targets once and print the results
    Check,
    /// Record a check result supplied by an external scheduler
    Record {
        #[arg(long)]
        service: String,
        #[arg(long)]
        status: ServiceStatus,
        #[arg(long)]
        response_time_ms: Option<u64>,
    },
    /// Print uptime statistics
    Stats {
        /// Limit to one service
        #[arg(long)]
        service: Option<String>,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Print incidents, most recent first
    Incidents {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Browse the configured post feed
    Posts {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        per_page: usize,
        #[arg(long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    initialize_tracing();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = state_dir;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, config).await {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Command, config: Config) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match command {
        Command::Run => {
            info!(
                "Starting uptime tracker v{} - state: {}, targets: {}",
                env!("CARGO_PKG_VERSION"),
                config.state_dir.display(),
                config.targets.len()
            );

            let monitor = build_monitor(config, clock)?;
            monitor.start().await
        }
        Command::Check => {
            let monitor = build_monitor(config, clock)?;
            let checks = monitor.run_once().await;
            print_json(&checks)
        }
        Command::Record {
            service,
            status,
            response_time_ms,
        } => {
            let mut tracker = load_tracker(&config, clock.clone());
            let mut check = ServiceCheck::new(service, status, clock.now());
            if let Some(ms) = response_time_ms {
                check = check.with_response_time(ms);
            }

            let transition = tracker.record_check(check);
            info!("Recorded check: {:?}", transition);
            Ok(())
        }
        Command::Stats { service, days } => {
            let tracker = load_tracker(&config, clock);
            let services = match service {
                Some(service) => vec![service],
                None => tracker.services(),
            };

            let stats: Vec<_> = services
                .iter()
                .map(|service| tracker.uptime_stats(service, days))
                .collect();
            print_json(&stats)
        }
        Command::Incidents { days } => {
            let tracker = load_tracker(&config, clock);
            print_json(&tracker.all_incidents(days))
        }
        Command::Posts {
            page,
            per_page,
            search,
        } => {
            let feed_url = config.feed_url.clone().ok_or_else(|| {
                TrackerError::Config("no feed configured (set FEED_URL)".to_string())
            })?;

            let feed = PostFeed::new(feed_url, config.feed_ttl, config.http_timeout, clock)?;
            let page = match search {
                Some(query) => feed.search(&query, page, per_page).await?,
                None => feed.page(page, per_page).await?,
            };
            print_json(&page)
        }
    }
}

fn load_tracker(config: &Config, clock: Arc<dyn Clock>) -> UptimeTracker {
    let store = HistoryStore::new(
        Box::new(FileStore::new(&config.state_dir)),
        config.storage_key.clone(),
    );
    UptimeTracker::load(store, clock, config.retention_policy())
}

fn build_monitor(config: Config, clock: Arc<dyn Clock>) -> Result<UptimeMonitor> {
    let probe = HttpProbe::new(config.http_timeout, config.degraded_threshold, clock.clone())?;
    let tracker = load_tracker(&config, clock.clone());
    UptimeMonitor::new(config, Arc::new(probe), tracker, clock)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize structured logging on stderr, leaving stdout for command output
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
