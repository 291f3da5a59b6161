//! Library scan orchestrator
//!
//! # Phase Progression
//! BOOTSTRAP → FIX-UP → CLEANUP → DISCOVERY → DEDUP → INGEST → REPORT
//!
//! Each phase is handled by a dedicated `phase_*` module:
//!
//! - **BOOTSTRAP**: cover cache dir, schema, admin account (fatal on failure)
//! - **FIX-UP**: lock-gated voice-actor re-scrape (non-fatal, taints exit code)
//! - **CLEANUP**: reconcile the catalog against the filesystem (skippable)
//! - **DISCOVERY/DEDUP**: walk roots, pick one folder per id
//! - **INGEST**: bounded parallel per-work processing, per-work isolation
//!
//! Cleanup runs strictly before discovery so catalog deletes never race
//! new-work inserts for the same id. An operator stop signal prevents new
//! phases and new per-work tasks from starting; in-flight work finishes.

pub mod dedup;
pub mod statistics;
pub mod update;
pub mod walker;

mod phase_bootstrap;
mod phase_cleanup;
mod phase_fixup;
mod phase_ingest;

use crate::covers::CoverCache;
use crate::limiter::TaskLimiter;
use crate::memo::MemoBuilder;
use crate::reporter::ProgressReporter;
use crate::scraper::cover::CoverResolver;
use crate::scraper::MetadataScraper;
use sqlx::SqlitePool;
use statistics::ScanCounts;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vwlib_common::config::Config;
use vwlib_common::events::{LogLevel, ProgressSink};
use vwlib_common::Result;

/// Final report of one scan run
#[derive(Debug, Clone, Copy)]
pub struct ScanReport {
    pub counts: ScanCounts,
    /// The legacy voice-actor fix-up was required and did not complete
    pub fixup_failed: bool,
}

impl ScanReport {
    /// Process exit code: non-zero only when the fix-up failed
    pub fn exit_code(&self) -> i32 {
        if self.fixup_failed {
            1
        } else {
            0
        }
    }
}

/// Top-level scan driver
pub struct ScanOrchestrator {
    config: Config,
    pool: SqlitePool,
    covers: CoverCache,
    scraper: MetadataScraper,
    resolver: CoverResolver,
    memo_builder: MemoBuilder,
    reporter: Arc<ProgressReporter>,
    cancel: CancellationToken,
}

impl ScanOrchestrator {
    /// Assemble the orchestrator with default remote providers.
    ///
    /// One limiter is shared across metadata fetches, cover downloads and
    /// duration probes so the aggregate outstanding work stays bounded.
    pub fn new(
        config: Config,
        pool: SqlitePool,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let limiter = TaskLimiter::new(config.max_parallelism);
        let covers = CoverCache::new(config.covers_dir());
        let scraper = MetadataScraper::new(&config.scraper, limiter.clone())?;
        let resolver = CoverResolver::new(&config.scraper, limiter.clone())?;
        let memo_builder = MemoBuilder::new(limiter);
        Ok(Self::with_components(
            config,
            pool,
            covers,
            scraper,
            resolver,
            memo_builder,
            sink,
            cancel,
        ))
    }

    /// Assemble from explicit parts (tests inject fakes here)
    #[allow(clippy::too_many_arguments)]
    pub fn with_components(
        config: Config,
        pool: SqlitePool,
        covers: CoverCache,
        scraper: MetadataScraper,
        resolver: CoverResolver,
        memo_builder: MemoBuilder,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            pool,
            covers,
            scraper,
            resolver,
            memo_builder,
            reporter: Arc::new(ProgressReporter::new(sink)),
            cancel,
        }
    }

    /// Run the whole scan pipeline
    pub async fn run(&self) -> Result<ScanReport> {
        self.phase_bootstrap().await?;

        let fixup_failed = if self.cancel.is_cancelled() {
            false
        } else {
            self.phase_fixup().await
        };

        if self.config.skip_cleanup {
            self.reporter
                .main_log(LogLevel::Info, "Cleanup skipped by configuration");
        } else if !self.cancel.is_cancelled() {
            self.phase_cleanup().await?;
        }

        if !self.cancel.is_cancelled() {
            let folders =
                walker::discover_all(&self.config.roots, self.config.max_scan_depth)?;
            self.reporter.main_log(
                LogLevel::Info,
                format!("Discovered {} candidate folders", folders.len()),
            );

            let deduped = dedup::dedup_folders(folders);
            self.report_duplicates(&deduped);
            self.phase_ingest(deduped.unique).await;
        } else {
            self.reporter
                .main_log(LogLevel::Warn, "Stop requested, skipping discovery");
        }

        let counts = self.reporter.counts();
        self.reporter
            .finished(format!("Scan finished: {}", counts.summary()));

        Ok(ScanReport {
            counts,
            fixup_failed,
        })
    }
}
