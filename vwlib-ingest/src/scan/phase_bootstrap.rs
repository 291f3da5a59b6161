//! Phase 1: BOOTSTRAP
//!
//! Ensure the environment the rest of the pipeline assumes: a cover cache
//! directory, the catalog schema, and the default administrative account.
//! Every failure here is fatal; "admin already exists" is not a failure.

use super::ScanOrchestrator;
use crate::db;
use vwlib_common::Result;

impl ScanOrchestrator {
    pub(super) async fn phase_bootstrap(&self) -> Result<()> {
        self.covers.ensure_dir()?;
        db::init_schema(&self.pool).await?;
        db::users::ensure_default_admin(&self.pool).await?;
        tracing::debug!("Bootstrap complete");
        Ok(())
    }
}
