//! # VWLib Common Library
//!
//! Shared code for the VWLib voice-work library tools including:
//! - Error types (`Error` / `Result`)
//! - Catalog code codec (RJ/VJ codes <-> numeric work ids)
//! - Progress event types and event bus
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod rcode;

pub use error::{Error, Result};
