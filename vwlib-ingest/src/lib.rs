//! # VWLib Ingest Pipeline
//!
//! Walks configured library roots for folders carrying catalog codes,
//! enriches each work from a chain of remote metadata providers, caches
//! cover art, reconciles the catalog against the filesystem, and streams
//! structured progress events to an injected sink.

pub mod covers;
pub mod db;
pub mod limiter;
pub mod memo;
pub mod reporter;
pub mod retry;
pub mod scan;
pub mod scraper;
