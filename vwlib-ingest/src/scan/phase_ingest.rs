//! Phases 5-6: DEDUP REPORTING and PARALLEL INGESTION
//!
//! One task per unique folder, fanned out through `FuturesUnordered`;
//! actual concurrency is bounded by the shared limiter inside the scraper,
//! cover resolver and memo builder. Every error is caught at the work
//! boundary: one work's failure never aborts the batch.

use super::dedup::Deduped;
use super::walker::WorkFolder;
use super::ScanOrchestrator;
use crate::covers::ALL_VARIANTS;
use crate::db::works;
use crate::memo::Memo;
use futures::stream::{FuturesUnordered, StreamExt};
use vwlib_common::events::{LogLevel, WorkOutcome};
use vwlib_common::rcode::WorkId;
use vwlib_common::Result;

impl ScanOrchestrator {
    /// Report every passed-over duplicate folder as a skipped result
    pub(super) fn report_duplicates(&self, deduped: &Deduped) {
        for (id, losers) in &deduped.duplicates {
            let code = id.code();
            for folder in losers {
                self.reporter.add_task(&code);
                self.reporter.task_log(
                    &code,
                    LogLevel::Warn,
                    format!(
                        "Duplicate folder for {code} skipped: {}",
                        folder.absolute.display()
                    ),
                );
                self.reporter.finish_task(&code, WorkOutcome::Skipped);
            }
        }
    }

    pub(super) async fn phase_ingest(&self, folders: Vec<WorkFolder>) {
        let mut tasks: FuturesUnordered<_> = folders
            .into_iter()
            .map(|folder| self.process_folder(folder))
            .collect();
        while tasks.next().await.is_some() {}
    }

    /// Process one folder end to end, catching everything at the boundary
    async fn process_folder(&self, folder: WorkFolder) {
        let code = folder.id.code();

        if self.cancel.is_cancelled() {
            self.reporter.add_task(&code);
            self.reporter
                .task_log(&code, LogLevel::Warn, "Stop requested, work not processed");
            self.reporter.finish_task(&code, WorkOutcome::Skipped);
            return;
        }

        self.reporter.add_task(&code);
        let outcome = match self.ingest_folder(&folder, &code).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.reporter
                    .task_log(&code, LogLevel::Error, e.to_string());
                WorkOutcome::Failed
            }
        };
        self.reporter.finish_task(&code, outcome);
    }

    async fn ingest_folder(&self, folder: &WorkFolder, code: &str) -> Result<WorkOutcome> {
        if works::exists(&self.pool, folder.id).await? {
            self.refresh_missing_covers(folder.id, code).await
        } else {
            self.ingest_new_work(folder, code).await
        }
    }

    /// Already cataloged: only fill in cover variants that are missing
    async fn refresh_missing_covers(&self, id: WorkId, code: &str) -> Result<WorkOutcome> {
        let missing = self.covers.missing_variants(code);
        if missing.is_empty() {
            return Ok(WorkOutcome::Skipped);
        }

        self.reporter.task_log(
            code,
            LogLevel::Info,
            format!("{} cover variants missing, re-fetching", missing.len()),
        );

        let source = match self.resolver.resolve(id).await {
            Ok(source) => source,
            Err(e) => {
                self.reporter.task_log(
                    code,
                    LogLevel::Error,
                    format!("Cover source resolution failed: {e}"),
                );
                return Ok(WorkOutcome::Failed);
            }
        };

        if source.no_cover {
            self.reporter
                .task_log(code, LogLevel::Info, "Work has no cover art");
            return Ok(WorkOutcome::Skipped);
        }

        let fetched = self
            .resolver
            .fetch_covers(id, source.source_id, &missing, &self.covers)
            .await;
        if fetched.all_ok() {
            Ok(WorkOutcome::Added)
        } else {
            self.reporter.task_log(
                code,
                LogLevel::Error,
                format!("Cover variants failed: {:?}", fetched.failed),
            );
            Ok(WorkOutcome::Failed)
        }
    }

    /// New work: memo, metadata chain, transactional persist, then covers
    async fn ingest_new_work(&self, folder: &WorkFolder, code: &str) -> Result<WorkOutcome> {
        self.reporter
            .task_log(code, LogLevel::Info, "Scanning local files");
        let memo = self
            .memo_builder
            .build(&folder.absolute, &Memo::default())
            .await?;

        self.reporter
            .task_log(code, LogLevel::Info, "Fetching metadata");
        let (static_meta, dynamic) = match self.scraper.fetch_full(folder.id).await {
            Ok(pair) => pair,
            Err(e) => {
                self.reporter.task_log(
                    code,
                    LogLevel::Error,
                    format!("Metadata scrape failed: {e}"),
                );
                return Ok(WorkOutcome::Failed);
            }
        };

        works::insert(
            &self.pool,
            folder.id,
            &folder.root_name,
            &folder.relative.to_string_lossy(),
            &static_meta,
            &dynamic,
        )
        .await?;
        works::set_memo(&self.pool, folder.id, &memo).await?;
        self.reporter
            .task_log(code, LogLevel::Info, format!("Cataloged '{}'", static_meta.title));

        // covers last; metadata success is the success criterion for a
        // brand-new work, so a confirmed absence of art is still an add
        let source = match self.resolver.resolve(folder.id).await {
            Ok(source) => source,
            Err(e) => {
                self.reporter.task_log(
                    code,
                    LogLevel::Error,
                    format!("Cover source resolution failed: {e}"),
                );
                return Ok(WorkOutcome::Failed);
            }
        };

        if source.no_cover {
            self.reporter
                .task_log(code, LogLevel::Info, "Work has no cover art");
            return Ok(WorkOutcome::Added);
        }

        if source.source_id != folder.id {
            self.reporter.task_log(
                code,
                LogLevel::Info,
                format!("Cover art borrowed from {}", source.source_id),
            );
        }

        let fetched = self
            .resolver
            .fetch_covers(folder.id, source.source_id, &ALL_VARIANTS, &self.covers)
            .await;
        if fetched.all_ok() {
            Ok(WorkOutcome::Added)
        } else {
            self.reporter.task_log(
                code,
                LogLevel::Error,
                format!("Cover variants failed: {:?}", fetched.failed),
            );
            Ok(WorkOutcome::Failed)
        }
    }
}
