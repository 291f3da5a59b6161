//! Phase 3: CLEANUP
//!
//! Reconcile the catalog against the filesystem: a work whose root alias
//! is no longer configured, or whose directory is gone, is deleted
//! together with its cached covers. Per-work failures are logged and
//! non-fatal; only an unusable store aborts the phase.

use super::ScanOrchestrator;
use crate::db::works;
use vwlib_common::events::LogLevel;
use vwlib_common::Result;

impl ScanOrchestrator {
    pub(super) async fn phase_cleanup(&self) -> Result<()> {
        let stored = works::list(&self.pool).await?;
        let mut removed = 0usize;

        for work in stored {
            let on_disk = self
                .config
                .root(&work.root)
                .map(|root| root.path.join(&work.dir).is_dir())
                .unwrap_or(false);
            if on_disk {
                continue;
            }

            let code = work.id.code();
            if let Err(e) = works::delete(&self.pool, work.id).await {
                self.reporter.main_log(
                    LogLevel::Warn,
                    format!("Cannot remove vanished work {code}: {e}"),
                );
                continue;
            }
            // missing cover files are swallowed inside delete_all
            if let Err(e) = self.covers.delete_all(&code).await {
                self.reporter.main_log(
                    LogLevel::Warn,
                    format!("Cannot remove covers of {code}: {e}"),
                );
            }
            tracing::info!(work = %code, root = %work.root, dir = %work.dir, "Removed vanished work");
            removed += 1;
        }

        if removed > 0 {
            self.reporter.main_log(
                LogLevel::Info,
                format!("Cleanup removed {removed} vanished works"),
            );
        }
        Ok(())
    }
}
