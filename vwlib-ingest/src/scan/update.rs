//! Metadata refresh over the existing catalog
//!
//! Re-processes every stored work without touching the filesystem:
//! dynamic-only refresh updates sales counters and appends rank
//! observations; full refresh also re-scrapes static metadata and
//! rewrites tag/voice-actor associations. Same limiter, same per-work
//! reporting contract as the scan.

use crate::db::works::{self, WorkRow};
use crate::limiter::TaskLimiter;
use crate::reporter::ProgressReporter;
use crate::scan::statistics::ScanCounts;
use crate::scraper::{MetadataScraper, Refresh};
use futures::stream::{FuturesUnordered, StreamExt};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vwlib_common::config::Config;
use vwlib_common::events::{LogLevel, ProgressSink, WorkOutcome};
use vwlib_common::Result;

/// Catalog-wide metadata refresh driver
pub struct UpdateOrchestrator {
    pool: SqlitePool,
    scraper: MetadataScraper,
    refresh: Refresh,
    reporter: Arc<ProgressReporter>,
    cancel: CancellationToken,
}

impl UpdateOrchestrator {
    pub fn new(
        config: &Config,
        pool: SqlitePool,
        refresh: Refresh,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let limiter = TaskLimiter::new(config.max_parallelism);
        let scraper = MetadataScraper::new(&config.scraper, limiter)?;
        Ok(Self::with_components(pool, scraper, refresh, sink, cancel))
    }

    pub fn with_components(
        pool: SqlitePool,
        scraper: MetadataScraper,
        refresh: Refresh,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            scraper,
            refresh,
            reporter: Arc::new(ProgressReporter::new(sink)),
            cancel,
        }
    }

    pub async fn run(&self) -> Result<ScanCounts> {
        let stored = works::list(&self.pool).await?;
        self.reporter.main_log(
            LogLevel::Info,
            format!("Refreshing metadata of {} works", stored.len()),
        );

        let mut tasks: FuturesUnordered<_> = stored
            .into_iter()
            .map(|work| self.refresh_work(work))
            .collect();
        while tasks.next().await.is_some() {}

        let counts = self.reporter.counts();
        self.reporter
            .finished(format!("Update finished: {}", counts.summary()));
        Ok(counts)
    }

    async fn refresh_work(&self, work: WorkRow) {
        let code = work.id.code();

        if self.cancel.is_cancelled() {
            self.reporter.add_task(&code);
            self.reporter
                .task_log(&code, LogLevel::Warn, "Stop requested, work not refreshed");
            self.reporter.finish_task(&code, WorkOutcome::Skipped);
            return;
        }

        self.reporter.add_task(&code);
        let outcome = match self.apply_refresh(&work, &code).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.reporter
                    .task_log(&code, LogLevel::Error, e.to_string());
                WorkOutcome::Failed
            }
        };
        self.reporter.finish_task(&code, outcome);
    }

    async fn apply_refresh(&self, work: &WorkRow, code: &str) -> Result<WorkOutcome> {
        // the record may have been removed since listing
        if !works::exists(&self.pool, work.id).await? {
            return Ok(WorkOutcome::Skipped);
        }

        match self.refresh {
            Refresh::DynamicOnly => {
                let dynamic = match self.scraper.fetch_dynamic(work.id).await {
                    Ok(dynamic) => dynamic,
                    Err(e) => {
                        self.reporter.task_log(
                            code,
                            LogLevel::Error,
                            format!("Dynamic refresh failed: {e}"),
                        );
                        return Ok(WorkOutcome::Failed);
                    }
                };
                works::update_dynamic(&self.pool, work.id, &dynamic).await?;
            }
            Refresh::Full => {
                let (static_meta, dynamic) = match self.scraper.fetch_full(work.id).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        self.reporter.task_log(
                            code,
                            LogLevel::Error,
                            format!("Full refresh failed: {e}"),
                        );
                        return Ok(WorkOutcome::Failed);
                    }
                };
                works::update_static(&self.pool, work.id, &static_meta).await?;
                works::update_dynamic(&self.pool, work.id, &dynamic).await?;
            }
        }
        Ok(WorkOutcome::Updated)
    }
}
