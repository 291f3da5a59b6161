//! Phase 2: LEGACY FIX-UP
//!
//! An earlier release derived voice-actor ids from provider-specific
//! identifiers, which collided across providers. Upgrades from that
//! release leave a lock file behind; while it exists, every stored work's
//! voice-actor associations are re-scraped and rewritten with the stable
//! name-derived ids. Failure degrades: the lock is retained for the next
//! run and the scan continues, but the process exit code reflects it.

use super::ScanOrchestrator;
use crate::db::works;
use vwlib_common::events::LogLevel;

impl ScanOrchestrator {
    /// Returns true when the fix-up was required and did not complete
    pub(super) async fn phase_fixup(&self) -> bool {
        let lock = self.config.va_fix_lock_path();
        if !lock.exists() {
            return false;
        }

        self.reporter.main_log(
            LogLevel::Warn,
            "Voice-actor fix-up pending, re-scraping associations",
        );

        let stored = match works::list(&self.pool).await {
            Ok(stored) => stored,
            Err(e) => {
                self.reporter
                    .main_log(LogLevel::Error, format!("Fix-up cannot list works: {e}"));
                return true;
            }
        };

        let mut failed = false;
        for work in stored {
            if self.cancel.is_cancelled() {
                failed = true;
                break;
            }

            let result = match self.scraper.fetch_static(work.id).await {
                Ok(meta) => {
                    works::replace_voice_actors(&self.pool, work.id, &meta.voice_actors)
                        .await
                        .map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            };

            if let Err(error) = result {
                self.reporter.main_log(
                    LogLevel::Warn,
                    format!("Fix-up failed for {}: {error}", work.id),
                );
                failed = true;
            }
        }

        if failed {
            self.reporter.main_log(
                LogLevel::Warn,
                "Voice-actor fix-up incomplete, lock retained for next run",
            );
            return true;
        }

        match std::fs::remove_file(&lock) {
            Ok(()) => {
                self.reporter
                    .main_log(LogLevel::Info, "Voice-actor fix-up applied");
                false
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                self.reporter.main_log(
                    LogLevel::Warn,
                    format!("Fix-up applied but lock removal failed: {e}"),
                );
                true
            }
        }
    }
}
