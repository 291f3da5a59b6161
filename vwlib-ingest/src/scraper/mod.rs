//! Remote metadata scraping
//!
//! Static metadata comes from an ordered chain of providers, each tried
//! when the previous one fails or returns nothing usable: the DLsite work
//! page (HTML), the HVDB community mirror, then DLsite's product JSON API.
//! Dynamic sales metadata always comes from the product-info endpoint.
//! Every outbound request is wrapped in the shared [`RetryPolicy`] and
//! admitted through the shared [`TaskLimiter`].

pub mod cover;
pub mod dlsite;
pub mod hvdb;

use crate::limiter::TaskLimiter;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;
use vwlib_common::config::ScraperConfig;
use vwlib_common::rcode::WorkId;

/// Namespace for deterministic voice-actor ids
pub const VA_NAMESPACE: Uuid = Uuid::from_u128(0x699d_9c07_8b1f_4a64_93a2_7c52f0c2_1a5d);

/// Deterministic voice-actor id from the actor's name.
///
/// Providers disagree on raw actor identifiers, so the stable name-derived
/// id is what the catalog stores; the same name always maps to the same id
/// across providers and re-scrapes.
pub fn voice_actor_id(name: &str) -> Uuid {
    Uuid::new_v5(&VA_NAMESPACE, name.trim().as_bytes())
}

/// Circle (publisher) reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircleRef {
    pub id: i64,
    pub name: String,
}

/// Static work metadata: identity and classification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticMetadata {
    pub title: String,
    /// Not every provider knows the circle; absent keeps the stored value
    pub circle: Option<CircleRef>,
    /// Release date, `YYYY-MM-DD`
    pub release: Option<String>,
    pub nsfw: bool,
    pub tags: Vec<String>,
    pub voice_actors: Vec<String>,
}

impl StaticMetadata {
    /// Minimal validity: a usable response names at least one tag or one
    /// voice actor. Anything less falls through to the next provider.
    pub fn is_usable(&self) -> bool {
        !self.tags.is_empty() || !self.voice_actors.is_empty()
    }
}

/// One rank observation from the sales ranking feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub term: String,
    pub category: String,
    pub rank: i64,
    pub rank_date: String,
}

/// Dynamic work metadata: sales counters and rank observations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicMetadata {
    pub dl_count: i64,
    pub price: i64,
    pub review_count: i64,
    pub rate_count: i64,
    /// Average rating scaled by 100 (e.g. 4.5 stars = 450)
    pub rate_average_2dp: i64,
    pub ranks: Vec<RankEntry>,
}

/// Refresh depth for existing works
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Re-fetch static and dynamic metadata
    Full,
    /// Re-fetch sales counters only
    DynamicOnly,
}

/// Per-provider failure
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No response / connection error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response (retryable up to the attempt budget)
    #[error("HTTP status {0}")]
    Status(u16),

    /// Response received but not understood
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Transient failures worth another attempt against the same provider
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Network(_) | ProviderError::Status(_))
    }

    pub(crate) fn network(e: reqwest::Error) -> Self {
        ProviderError::Network(e.to_string())
    }
}

/// Scrape failure after the whole chain was exhausted
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("All metadata providers failed for {0}")]
    AllProvidersFailed(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// One source of static metadata
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_static(
        &self,
        id: WorkId,
        locale: &str,
    ) -> Result<StaticMetadata, ProviderError>;
}

/// Source of dynamic (sales) metadata
#[async_trait]
pub trait DynamicProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_dynamic(&self, id: WorkId) -> Result<DynamicMetadata, ProviderError>;
}

/// Provider chain with retry, fallback and the usability check
pub struct MetadataScraper {
    providers: Vec<Box<dyn MetadataProvider>>,
    dynamic: Box<dyn DynamicProvider>,
    retry: RetryPolicy,
    limiter: TaskLimiter,
    locale: String,
}

impl MetadataScraper {
    /// Default chain: DLsite HTML page, HVDB mirror, DLsite product JSON
    pub fn new(config: &ScraperConfig, limiter: TaskLimiter) -> vwlib_common::Result<Self> {
        let client = http_client(config)?;
        Ok(Self::with_providers(
            vec![
                Box::new(dlsite::DlsiteHtmlProvider::new(client.clone())),
                Box::new(hvdb::HvdbProvider::new(client.clone())),
                Box::new(dlsite::DlsiteApiProvider::new(client.clone())),
            ],
            Box::new(dlsite::DlsiteDynamicProvider::new(client)),
            RetryPolicy::from_config(config),
            limiter,
            config.locale.clone(),
        ))
    }

    /// Assemble a scraper from explicit parts (tests inject fakes here)
    pub fn with_providers(
        providers: Vec<Box<dyn MetadataProvider>>,
        dynamic: Box<dyn DynamicProvider>,
        retry: RetryPolicy,
        limiter: TaskLimiter,
        locale: String,
    ) -> Self {
        Self {
            providers,
            dynamic,
            retry,
            limiter,
            locale,
        }
    }

    /// Fetch static metadata through the fallback chain.
    ///
    /// Each provider gets the full retry budget; a provider that fails or
    /// returns no tags and no voice actors hands over to the next one.
    pub async fn fetch_static(&self, id: WorkId) -> Result<StaticMetadata, ScrapeError> {
        for provider in &self.providers {
            let attempt = self
                .retry
                .run(
                    provider.name(),
                    || self.limiter.run(provider.fetch_static(id, &self.locale)),
                    ProviderError::is_retryable,
                )
                .await;

            match attempt {
                Ok(meta) if meta.is_usable() => {
                    tracing::debug!(work = %id, provider = provider.name(), "Static metadata fetched");
                    return Ok(meta);
                }
                Ok(_) => {
                    tracing::warn!(
                        work = %id,
                        provider = provider.name(),
                        "Response had no tags or voice actors, trying next provider"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        work = %id,
                        provider = provider.name(),
                        error = %e,
                        "Provider failed, trying next provider"
                    );
                }
            }
        }
        Err(ScrapeError::AllProvidersFailed(id.code()))
    }

    /// Fetch dynamic metadata (no chain; the product-info endpoint is the
    /// only source of counters)
    pub async fn fetch_dynamic(&self, id: WorkId) -> Result<DynamicMetadata, ScrapeError> {
        let meta = self
            .retry
            .run(
                self.dynamic.name(),
                || self.limiter.run(self.dynamic.fetch_dynamic(id)),
                ProviderError::is_retryable,
            )
            .await?;
        Ok(meta)
    }

    /// Full-refresh semantics: both halves, independently fetched
    pub async fn fetch_full(
        &self,
        id: WorkId,
    ) -> Result<(StaticMetadata, DynamicMetadata), ScrapeError> {
        let static_meta = self.fetch_static(id).await?;
        let dynamic = self.fetch_dynamic(id).await?;
        Ok((static_meta, dynamic))
    }
}

/// Merge fresh rank observations into the stored history.
///
/// History only grows; an observation is new when its
/// (term, category, rank_date) triple has not been seen.
pub fn merge_rank_history(stored: Vec<RankEntry>, fresh: &[RankEntry]) -> Vec<RankEntry> {
    let mut merged = stored;
    for entry in fresh {
        let seen = merged.iter().any(|e| {
            e.term == entry.term && e.category == entry.category && e.rank_date == entry.rank_date
        });
        if !seen {
            merged.push(entry.clone());
        }
    }
    merged
}

fn http_client(config: &ScraperConfig) -> vwlib_common::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .user_agent(concat!("vwlib/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| vwlib_common::Error::Internal(format!("cannot build HTTP client: {e}")))
}
