//! DLsite providers
//!
//! Three faces of the same shop: the work detail page (HTML, primary
//! static source), the product JSON API (static fallback), and the
//! product-info endpoint (the only dynamic source).

use super::{
    CircleRef, DynamicMetadata, DynamicProvider, MetadataProvider, ProviderError, RankEntry,
    StaticMetadata,
};
use async_trait::async_trait;
use scraper::{Html, Selector};
use vwlib_common::rcode::WorkId;

/// Shop section for a work: doujin (RJ) vs professional (VJ)
fn shop_segment(id: WorkId) -> &'static str {
    if id.code().starts_with('V') {
        "pro"
    } else {
        "maniax"
    }
}

pub(crate) fn work_page_url(id: WorkId) -> String {
    format!(
        "https://www.dlsite.com/{}/work/=/product_id/{}.html",
        shop_segment(id),
        id.code()
    )
}

fn product_api_url(id: WorkId) -> String {
    format!(
        "https://www.dlsite.com/{}/api/=/product.json?workno={}",
        shop_segment(id),
        id.code()
    )
}

fn product_info_url(id: WorkId) -> String {
    format!(
        "https://www.dlsite.com/{}/product/info/ajax?product_id={}",
        shop_segment(id),
        id.code()
    )
}

async fn get_text(
    client: &reqwest::Client,
    url: &str,
    locale: &str,
) -> Result<String, ProviderError> {
    let response = client
        .get(url)
        .header(reqwest::header::COOKIE, format!("locale={locale}"))
        .send()
        .await
        .map_err(ProviderError::network)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }
    response.text().await.map_err(ProviderError::network)
}

// ============================================================================
// HTML work page (primary static provider)
// ============================================================================

pub struct DlsiteHtmlProvider {
    client: reqwest::Client,
}

impl DlsiteHtmlProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetadataProvider for DlsiteHtmlProvider {
    fn name(&self) -> &'static str {
        "dlsite-html"
    }

    async fn fetch_static(
        &self,
        id: WorkId,
        locale: &str,
    ) -> Result<StaticMetadata, ProviderError> {
        let html = get_text(&self.client, &work_page_url(id), locale).await?;
        parse_work_page(&html)
    }
}

/// Extract static metadata from a work detail page.
///
/// The outline table is keyed by Japanese row headers regardless of the
/// locale cookie, so row matching uses those labels.
pub(crate) fn parse_work_page(html: &str) -> Result<StaticMetadata, ProviderError> {
    let doc = Html::parse_document(html);

    let title_sel = Selector::parse("#work_name").expect("valid selector");
    let maker_sel = Selector::parse("span.maker_name a").expect("valid selector");
    let row_sel = Selector::parse("#work_outline tr").expect("valid selector");
    let th_sel = Selector::parse("th").expect("valid selector");
    let link_sel = Selector::parse("td a").expect("valid selector");
    let td_sel = Selector::parse("td").expect("valid selector");
    let genre_sel = Selector::parse(".main_genre a").expect("valid selector");

    let title = doc
        .select(&title_sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProviderError::Parse("work page has no title".into()))?;

    let circle = doc.select(&maker_sel).next().and_then(|a| {
        let name = a.text().collect::<String>().trim().to_string();
        let id = a
            .value()
            .attr("href")
            .and_then(|href| href.split("/maker_id/").nth(1))
            .map(|tail| tail.trim_start_matches("RG"))
            .and_then(|digits| {
                digits
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse::<i64>()
                    .ok()
            });
        id.map(|id| CircleRef { id, name })
    });

    let mut release = None;
    let mut nsfw = false;
    let mut voice_actors = Vec::new();

    for row in doc.select(&row_sel) {
        let Some(header) = row.select(&th_sel).next() else {
            continue;
        };
        let label = header.text().collect::<String>();
        if label.contains("販売日") {
            release = row
                .select(&td_sel)
                .next()
                .map(|td| normalize_release_date(&td.text().collect::<String>()));
        } else if label.contains("年齢指定") {
            let value = row
                .select(&td_sel)
                .next()
                .map(|td| td.text().collect::<String>())
                .unwrap_or_default();
            nsfw = value.contains("18");
        } else if label.contains("声優") {
            voice_actors = row
                .select(&link_sel)
                .map(|a| a.text().collect::<String>().trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
        }
    }

    let tags = doc
        .select(&genre_sel)
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    Ok(StaticMetadata {
        title,
        circle,
        release,
        nsfw,
        tags,
        voice_actors,
    })
}

/// "2024年03月15日" / "2024-03-15 00:00:00" -> "2024-03-15"
fn normalize_release_date(raw: &str) -> String {
    let raw = raw.trim();
    let digits: Vec<String> = raw
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    match digits.as_slice() {
        [year, month, day, ..] if year.len() == 4 => {
            format!("{year}-{:0>2}-{:0>2}", month, day)
        }
        _ => raw.to_string(),
    }
}

// ============================================================================
// Product JSON API (static fallback provider)
// ============================================================================

pub struct DlsiteApiProvider {
    client: reqwest::Client,
}

impl DlsiteApiProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetadataProvider for DlsiteApiProvider {
    fn name(&self) -> &'static str {
        "dlsite-api"
    }

    async fn fetch_static(
        &self,
        id: WorkId,
        locale: &str,
    ) -> Result<StaticMetadata, ProviderError> {
        let body = get_text(&self.client, &product_api_url(id), locale).await?;
        parse_product_json(&body)
    }
}

pub(crate) fn parse_product_json(body: &str) -> Result<StaticMetadata, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("product json: {e}")))?;

    let product = value
        .as_array()
        .and_then(|a| a.first())
        .ok_or_else(|| ProviderError::Parse("product json: empty result".into()))?;

    let title = product
        .get("work_name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Parse("product json: no work_name".into()))?;

    let circle = match (
        product.get("maker_id").and_then(|v| v.as_str()),
        product.get("maker_name").and_then(|v| v.as_str()),
    ) {
        (Some(maker_id), Some(name)) => maker_id
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse::<i64>()
            .ok()
            .map(|id| CircleRef {
                id,
                name: name.to_string(),
            }),
        _ => None,
    };

    let release = product
        .get("regist_date")
        .and_then(|v| v.as_str())
        .map(|d| d.split_whitespace().next().unwrap_or(d).to_string());

    let nsfw = product
        .get("age_category")
        .and_then(|v| v.as_i64())
        .map(|age| age == 3)
        .unwrap_or(false);

    let tags = product
        .get("genres")
        .and_then(|v| v.as_array())
        .map(|genres| {
            genres
                .iter()
                .filter_map(|g| g.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let voice_actors = product
        .get("creaters")
        .and_then(|v| v.get("voice_by"))
        .and_then(|v| v.as_array())
        .map(|actors| {
            actors
                .iter()
                .filter_map(|a| a.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(StaticMetadata {
        title,
        circle,
        release,
        nsfw,
        tags,
        voice_actors,
    })
}

// ============================================================================
// Product info endpoint (dynamic provider)
// ============================================================================

pub struct DlsiteDynamicProvider {
    client: reqwest::Client,
}

impl DlsiteDynamicProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DynamicProvider for DlsiteDynamicProvider {
    fn name(&self) -> &'static str {
        "dlsite-info"
    }

    async fn fetch_dynamic(&self, id: WorkId) -> Result<DynamicMetadata, ProviderError> {
        let body = get_text(&self.client, &product_info_url(id), "ja-jp").await?;
        parse_product_info(&body, &id.code())
    }
}

pub(crate) fn parse_product_info(body: &str, code: &str) -> Result<DynamicMetadata, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("product info: {e}")))?;

    let info = value
        .get(code)
        .ok_or_else(|| ProviderError::Parse(format!("product info: no entry for {code}")))?;

    // counters come back as numbers or numeric strings depending on the work
    let int = |key: &str| -> i64 {
        let field = info.get(key);
        field
            .and_then(|v| v.as_i64())
            .or_else(|| field.and_then(|v| v.as_str()).and_then(|s| s.parse().ok()))
            .unwrap_or(0)
    };

    let ranks = info
        .get("rank")
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    Some(RankEntry {
                        term: entry.get("term")?.as_str()?.to_string(),
                        category: entry.get("category")?.as_str()?.to_string(),
                        rank: entry.get("rank")?.as_i64()?,
                        rank_date: entry.get("rank_date")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(DynamicMetadata {
        dl_count: int("dl_count"),
        price: int("price"),
        review_count: int("review_count"),
        rate_count: int("rate_count"),
        rate_average_2dp: int("rate_average_2dp"),
        ranks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK_PAGE: &str = r##"
        <html><body>
        <h1 id="work_name">ささやき休憩室</h1>
        <span class="maker_name"><a href="https://www.dlsite.com/maniax/circle/profile/=/maker_id/RG12345.html">ねむり工房</a></span>
        <table id="work_outline">
          <tr><th>販売日</th><td>2024年03月15日</td></tr>
          <tr><th>年齢指定</th><td><span>18禁</span></td></tr>
          <tr><th>声優</th><td><a href="#">花丸ことり</a> / <a href="#">柚木つばめ</a></td></tr>
        </table>
        <div class="main_genre">
          <a href="#">癒し</a><a href="#">ASMR</a>
        </div>
        </body></html>
    "##;

    #[test]
    fn parses_work_page() {
        let meta = parse_work_page(WORK_PAGE).unwrap();
        assert_eq!(meta.title, "ささやき休憩室");
        let circle = meta.circle.as_ref().unwrap();
        assert_eq!(circle.id, 12345);
        assert_eq!(circle.name, "ねむり工房");
        assert_eq!(meta.release.as_deref(), Some("2024-03-15"));
        assert!(meta.nsfw);
        assert_eq!(meta.voice_actors, vec!["花丸ことり", "柚木つばめ"]);
        assert_eq!(meta.tags, vec!["癒し", "ASMR"]);
        assert!(meta.is_usable());
    }

    #[test]
    fn work_page_without_title_is_a_parse_error() {
        let result = parse_work_page("<html><body>age check</body></html>");
        assert!(matches!(result, Err(ProviderError::Parse(_))));
    }

    #[test]
    fn parses_product_json() {
        let body = r#"[{
            "work_name": "ささやき休憩室",
            "maker_id": "RG12345",
            "maker_name": "ねむり工房",
            "regist_date": "2024-03-15 00:00:00",
            "age_category": 3,
            "genres": [{"name": "癒し"}, {"name": "ASMR"}],
            "creaters": {"voice_by": [{"name": "花丸ことり"}]}
        }]"#;

        let meta = parse_product_json(body).unwrap();
        assert_eq!(meta.title, "ささやき休憩室");
        assert_eq!(meta.circle.as_ref().unwrap().id, 12345);
        assert_eq!(meta.release.as_deref(), Some("2024-03-15"));
        assert!(meta.nsfw);
        assert_eq!(meta.tags.len(), 2);
        assert_eq!(meta.voice_actors, vec!["花丸ことり"]);
    }

    #[test]
    fn parses_product_info_with_string_counters() {
        let body = r#"{
            "RJ123456": {
                "dl_count": "1200",
                "price": 880,
                "review_count": 4,
                "rate_count": 320,
                "rate_average_2dp": 462,
                "rank": [
                    {"term": "day", "category": "all", "rank": 3, "rank_date": "2024-03-16"}
                ]
            }
        }"#;

        let dynamic = parse_product_info(body, "RJ123456").unwrap();
        assert_eq!(dynamic.dl_count, 1200);
        assert_eq!(dynamic.price, 880);
        assert_eq!(dynamic.rate_average_2dp, 462);
        assert_eq!(dynamic.ranks.len(), 1);
        assert_eq!(dynamic.ranks[0].rank, 3);
    }

    #[test]
    fn urls_follow_the_shop_segment() {
        let rj = WorkId::parse("RJ123456").unwrap();
        let vj = WorkId::parse("VJ123456").unwrap();
        assert_eq!(
            work_page_url(rj),
            "https://www.dlsite.com/maniax/work/=/product_id/RJ123456.html"
        );
        assert!(work_page_url(vj).contains("/pro/"));
        assert!(product_info_url(rj).contains("product/info/ajax?product_id=RJ123456"));
    }
}
