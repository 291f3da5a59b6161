//! vwlib-ingest binary
//!
//! Thin entry point: load configuration, open the catalog, wire the
//! progress bus, run a scan (or a metadata refresh) and exit with the
//! run's status code. Ctrl-C requests a stop; no new phase or work starts
//! after it, in-flight work finishes and progress is flushed.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vwlib_common::config::Config;
use vwlib_common::events::EventBus;
use vwlib_ingest::scan::update::UpdateOrchestrator;
use vwlib_ingest::scan::ScanOrchestrator;
use vwlib_ingest::scraper::Refresh;

#[derive(Debug, Parser)]
#[command(name = "vwlib-ingest", about = "Voice-work library ingest pipeline")]
struct Args {
    /// Config file path (falls back to $VWLIB_CONFIG, then ./vwlib.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the reconciliation pass before discovery
    #[arg(long)]
    skip_cleanup: bool,

    /// Refresh metadata of cataloged works instead of scanning
    #[arg(long, value_enum)]
    refresh: Option<RefreshArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RefreshArg {
    /// Sales counters and rank history only
    Dynamic,
    /// Static and dynamic metadata
    Full,
}

impl From<RefreshArg> for Refresh {
    fn from(arg: RefreshArg) -> Self {
        match arg {
            RefreshArg::Dynamic => Refresh::DynamicOnly,
            RefreshArg::Full => Refresh::Full,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if args.skip_cleanup {
        config.skip_cleanup = true;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        roots = config.roots.len(),
        "Starting vwlib-ingest"
    );

    let pool = vwlib_ingest::db::init_pool(&config.database_path()).await?;

    // the supervising consumer attaches here; this process just mirrors
    // events into its own log
    let bus = Arc::new(EventBus::new(256));
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                tracing::debug!(target: "progress", "{json}");
            }
        }
    });

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Stop requested, finishing in-flight work");
            stop.cancel();
        }
    });

    let exit_code = match args.refresh {
        Some(mode) => {
            let update =
                UpdateOrchestrator::new(&config, pool.clone(), mode.into(), bus, cancel)?;
            let counts = update.run().await?;
            tracing::info!("Update finished: {}", counts.summary());
            0
        }
        None => {
            let scan = ScanOrchestrator::new(config, pool.clone(), bus, cancel)?;
            let report = scan.run().await?;
            tracing::info!("Scan finished: {}", report.counts.summary());
            report.exit_code()
        }
    };

    pool.close().await;
    std::process::exit(exit_code);
}
