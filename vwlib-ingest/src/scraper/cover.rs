//! Cover art resolution and download
//!
//! Localized re-releases often host no art of their own and render the
//! original release's images on their detail page. The resolver therefore
//! scrapes the page and intersects the ids cross-linked from the editions
//! widget with the ids embedded in rendered image URLs; the first id in
//! both sets is the true cover source, falling back to the work itself.
//! A `no_img` placeholder URL means the work genuinely has no cover,
//! which is reported as a skip, never as a download failure.

use super::{ProviderError, ScrapeError};
use crate::covers::{CoverCache, CoverVariant};
use crate::limiter::TaskLimiter;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use scraper::{Html, Selector};
use vwlib_common::config::ScraperConfig;
use vwlib_common::rcode::WorkId;

/// Marker segment DLsite serves for works without any cover art
const NO_IMAGE_MARKER: &str = "no_img";

/// Where a work's cover art actually lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverSource {
    /// Id whose image URLs serve this work's art (may be the work itself)
    pub source_id: WorkId,
    /// The work has no cover at all (placeholder detected)
    pub no_cover: bool,
}

/// Remote side of cover handling, separated for test injection
#[async_trait]
pub trait CoverProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve_source(&self, id: WorkId) -> Result<CoverSource, ProviderError>;

    async fn fetch_variant(
        &self,
        source: WorkId,
        variant: CoverVariant,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Outcome of a multi-variant download
#[derive(Debug, Default)]
pub struct CoverFetch {
    /// Variants that could not be downloaded or saved
    pub failed: Vec<CoverVariant>,
}

impl CoverFetch {
    /// Aggregate success requires every variant
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Retry- and limiter-wrapped cover operations
pub struct CoverResolver {
    provider: Box<dyn CoverProvider>,
    retry: RetryPolicy,
    limiter: TaskLimiter,
}

impl CoverResolver {
    pub fn new(config: &ScraperConfig, limiter: TaskLimiter) -> vwlib_common::Result<Self> {
        let client = super::http_client(config)?;
        Ok(Self::with_provider(
            Box::new(DlsiteCoverProvider::new(client)),
            RetryPolicy::from_config(config),
            limiter,
        ))
    }

    pub fn with_provider(
        provider: Box<dyn CoverProvider>,
        retry: RetryPolicy,
        limiter: TaskLimiter,
    ) -> Self {
        Self {
            provider,
            retry,
            limiter,
        }
    }

    /// Determine the cover source for a work
    pub async fn resolve(&self, id: WorkId) -> Result<CoverSource, ScrapeError> {
        let source = self
            .retry
            .run(
                self.provider.name(),
                || self.limiter.run(self.provider.resolve_source(id)),
                ProviderError::is_retryable,
            )
            .await?;
        Ok(source)
    }

    /// Download `variants` from `source` and cache them under `target`'s
    /// code. Variants are independent: one failure never blocks the rest.
    pub async fn fetch_covers(
        &self,
        target: WorkId,
        source: WorkId,
        variants: &[CoverVariant],
        cache: &CoverCache,
    ) -> CoverFetch {
        let code = target.code();
        let mut downloads: FuturesUnordered<_> = variants
            .iter()
            .map(|&variant| {
                let code = code.clone();
                async move {
                    let fetched = self
                        .retry
                        .run(
                            self.provider.name(),
                            || self.limiter.run(self.provider.fetch_variant(source, variant)),
                            ProviderError::is_retryable,
                        )
                        .await;

                    let result = match fetched {
                        Ok(bytes) => cache
                            .save(&code, variant, &bytes)
                            .await
                            .map_err(|e| e.to_string()),
                        Err(e) => Err(e.to_string()),
                    };
                    (variant, result)
                }
            })
            .collect();

        let mut outcome = CoverFetch::default();
        while let Some((variant, result)) = downloads.next().await {
            if let Err(error) = result {
                tracing::warn!(work = %code, %variant, %error, "Cover variant download failed");
                outcome.failed.push(variant);
            }
        }
        outcome
    }
}

// ============================================================================
// DLsite cover provider
// ============================================================================

pub struct DlsiteCoverProvider {
    client: reqwest::Client,
}

impl DlsiteCoverProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CoverProvider for DlsiteCoverProvider {
    fn name(&self) -> &'static str {
        "dlsite-cover"
    }

    async fn resolve_source(&self, id: WorkId) -> Result<CoverSource, ProviderError> {
        let url = super::dlsite::work_page_url(id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let html = response.text().await.map_err(ProviderError::network)?;
        Ok(extract_cover_source(&html, id))
    }

    async fn fetch_variant(
        &self,
        source: WorkId,
        variant: CoverVariant,
    ) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(image_url(source, variant))
            .send()
            .await
            .map_err(ProviderError::network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(ProviderError::network)?;
        Ok(bytes.to_vec())
    }
}

/// Pick the cover source from a work detail page
pub(crate) fn extract_cover_source(html: &str, own: WorkId) -> CoverSource {
    let doc = Html::parse_document(html);

    let edition_sel =
        Selector::parse("#work_edition a[href], .work_edition a[href]").expect("valid selector");
    let img_sel = Selector::parse("img[src], img[srcset]").expect("valid selector");
    let og_sel = Selector::parse("meta[property=\"og:image\"]").expect("valid selector");

    let linked: Vec<WorkId> = doc
        .select(&edition_sel)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(WorkId::find_in)
        .collect();

    let mut image_urls: Vec<String> = doc
        .select(&img_sel)
        .flat_map(|img| {
            [img.value().attr("src"), img.value().attr("srcset")]
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();
    image_urls.extend(
        doc.select(&og_sel)
            .filter_map(|m| m.value().attr("content"))
            .map(str::to_string),
    );

    let no_cover = image_urls.iter().any(|url| url.contains(NO_IMAGE_MARKER));
    let image_ids: Vec<WorkId> = image_urls.iter().filter_map(|u| WorkId::find_in(u)).collect();

    let source_id = linked
        .iter()
        .copied()
        .find(|candidate| image_ids.contains(candidate))
        .unwrap_or(own);

    CoverSource {
        source_id,
        no_cover,
    }
}

/// Image URL for one variant of a work's cover.
///
/// Works are bucketed by thousands in the image host's directory layout
/// (RJ234567 lives under RJ235000).
pub(crate) fn image_url(source: WorkId, variant: CoverVariant) -> String {
    let code = source.code();
    let numeric = source.raw() % 1_000_000_000_000;
    let bucket_numeric = numeric.div_ceil(1000) * 1000;
    // bucket keeps the same prefix and padding rule as the code itself
    let prefix: String = code.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = code.len() - prefix.len();
    let bucket = format!("{prefix}{bucket_numeric:0width$}", width = digits);

    let section = if prefix == "VJ" { "professional" } else { "doujin" };

    match variant {
        CoverVariant::Main => format!(
            "https://img.dlsite.jp/modpub/images2/work/{section}/{bucket}/{code}_img_main.jpg"
        ),
        CoverVariant::Sam => format!(
            "https://img.dlsite.jp/modpub/images2/work/{section}/{bucket}/{code}_img_sam.jpg"
        ),
        CoverVariant::Thumb240 => format!(
            "https://img.dlsite.jp/resize/images2/work/{section}/{bucket}/{code}_img_main_240x240.jpg"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covers::ALL_VARIANTS;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn id(code: &str) -> WorkId {
        WorkId::parse(code).unwrap()
    }

    #[test]
    fn intersection_picks_the_borrowed_source() {
        let html = r#"
            <div id="work_edition">
              <a href="/maniax/work/=/product_id/RJ111111.html">JP original</a>
              <a href="/maniax/work/=/product_id/RJ222222.html">other language</a>
            </div>
            <img src="https://img.dlsite.jp/modpub/images2/work/doujin/RJ112000/RJ111111_img_main.jpg">
        "#;

        let source = extract_cover_source(html, id("RJ333333"));
        assert_eq!(source.source_id, id("RJ111111"));
        assert!(!source.no_cover);
    }

    #[test]
    fn empty_intersection_falls_back_to_own_id() {
        let html = r#"
            <div id="work_edition"><a href="/maniax/work/=/product_id/RJ111111.html">x</a></div>
            <img src="https://img.dlsite.jp/modpub/images2/work/doujin/RJ334000/RJ333333_img_main.jpg">
        "#;

        let source = extract_cover_source(html, id("RJ333333"));
        assert_eq!(source.source_id, id("RJ333333"));
    }

    #[test]
    fn placeholder_image_marks_no_cover() {
        let html = r#"<img src="https://img.dlsite.jp/modpub/images2/parts/no_img_main.gif">"#;
        let source = extract_cover_source(html, id("RJ333333"));
        assert!(source.no_cover);
        assert_eq!(source.source_id, id("RJ333333"));
    }

    #[test]
    fn image_urls_bucket_by_thousands() {
        assert_eq!(
            image_url(id("RJ234567"), CoverVariant::Main),
            "https://img.dlsite.jp/modpub/images2/work/doujin/RJ235000/RJ234567_img_main.jpg"
        );
        // exact multiples stay in their own bucket
        assert_eq!(
            image_url(id("RJ234000"), CoverVariant::Sam),
            "https://img.dlsite.jp/modpub/images2/work/doujin/RJ234000/RJ234000_img_sam.jpg"
        );
        assert!(image_url(id("VJ123456"), CoverVariant::Thumb240).contains("/professional/"));
        assert!(image_url(id("RJ234567"), CoverVariant::Thumb240).ends_with("_img_main_240x240.jpg"));
    }

    struct FakeCoverProvider {
        source: CoverSource,
        /// variant key -> bytes; missing key means the download fails
        images: HashMap<&'static str, Vec<u8>>,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl CoverProvider for FakeCoverProvider {
        fn name(&self) -> &'static str {
            "fake-cover"
        }

        async fn resolve_source(&self, _id: WorkId) -> Result<CoverSource, ProviderError> {
            Ok(self.source)
        }

        async fn fetch_variant(
            &self,
            _source: WorkId,
            variant: CoverVariant,
        ) -> Result<Vec<u8>, ProviderError> {
            self.calls.lock().unwrap().push(variant.key());
            self.images
                .get(variant.key())
                .cloned()
                .ok_or(ProviderError::Status(404))
        }
    }

    #[tokio::test]
    async fn one_failed_variant_does_not_block_the_others() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CoverCache::new(tmp.path());
        cache.ensure_dir().unwrap();

        let provider = FakeCoverProvider {
            source: CoverSource {
                source_id: id("RJ100000"),
                no_cover: false,
            },
            images: HashMap::from([("main", b"m".to_vec()), ("240x240", b"t".to_vec())]),
            calls: Mutex::new(Vec::new()),
        };
        let resolver = CoverResolver::with_provider(
            Box::new(provider),
            RetryPolicy::new(1, std::time::Duration::from_millis(1)),
            TaskLimiter::new(4),
        );

        let outcome = resolver
            .fetch_covers(id("RJ100000"), id("RJ100000"), &ALL_VARIANTS, &cache)
            .await;

        assert!(!outcome.all_ok());
        assert_eq!(outcome.failed, vec![CoverVariant::Sam]);
        assert!(cache.exists("RJ100000", CoverVariant::Main));
        assert!(cache.exists("RJ100000", CoverVariant::Thumb240));
        assert!(!cache.exists("RJ100000", CoverVariant::Sam));
    }
}
