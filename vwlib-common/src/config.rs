//! Configuration loading
//!
//! Config file resolution follows the priority order the rest of the tools
//! use: explicit path argument, then the `VWLIB_CONFIG` environment
//! variable, then `./vwlib.toml`. A missing fallback file yields defaults;
//! a missing explicit path is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "VWLIB_CONFIG";

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "vwlib.toml";

/// One library root directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootFolder {
    /// Stable alias stored with each work record
    pub name: String,
    /// Absolute base path of this root
    pub path: PathBuf,
}

/// Remote scraping parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Attempts per request before a provider counts as failed
    pub retry_attempts: u32,
    /// Fixed delay between attempts, milliseconds
    pub retry_delay_ms: u64,
    /// Per-request timeout, milliseconds
    pub timeout_ms: u64,
    /// Locale sent to providers ("ja-jp", "en-us", ...)
    pub locale: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 5,
            retry_delay_ms: 2000,
            timeout_ms: 15_000,
            locale: "ja-jp".to_string(),
        }
    }
}

/// Ingest pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library roots to scan
    pub roots: Vec<RootFolder>,
    /// Maximum directory recursion depth below each root
    pub max_scan_depth: usize,
    /// Aggregate cap on concurrent network/probe operations
    pub max_parallelism: usize,
    /// Directory holding the database, cover cache and lock files
    pub data_dir: PathBuf,
    /// Skip the reconciliation pass before discovery
    pub skip_cleanup: bool,
    /// Remote scraping parameters
    pub scraper: ScraperConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            max_scan_depth: 2,
            max_parallelism: 16,
            data_dir: PathBuf::from("vwlib-data"),
            skip_cleanup: false,
            scraper: ScraperConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration, resolving the file per the priority order
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.exists() {
            Self::from_file(fallback)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse a specific TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// SQLite database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("vwlib.db")
    }

    /// Cover image cache directory
    pub fn covers_dir(&self) -> PathBuf {
        self.data_dir.join("covers")
    }

    /// Lock file left behind when the voice-actor fix-up still has to run
    pub fn va_fix_lock_path(&self) -> PathBuf {
        self.data_dir.join("va-fix.lock")
    }

    /// Look up a configured root by its alias
    pub fn root(&self, name: &str) -> Option<&RootFolder> {
        self.roots.iter().find(|r| r.name == name)
    }
}
