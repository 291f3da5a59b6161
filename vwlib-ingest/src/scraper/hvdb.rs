//! HVDB community mirror provider
//!
//! Secondary static source. HVDB indexes the same catalog by numeric id
//! and serves a small JSON document per work. It knows tags and voice
//! actors but not the circle, so the circle field stays empty and the
//! stored value (if any) is preserved downstream.

use super::{MetadataProvider, ProviderError, StaticMetadata};
use async_trait::async_trait;
use serde::Deserialize;
use vwlib_common::rcode::WorkId;

const BASE_URL: &str = "https://hvdb.me/Dashboard/WorkDetails";

pub struct HvdbProvider {
    client: reqwest::Client,
}

impl HvdbProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct HvdbWork {
    #[serde(rename = "name", alias = "Name")]
    name: String,
    #[serde(rename = "sfw", alias = "SFW", default)]
    sfw: bool,
    #[serde(rename = "tags", alias = "Tags", default)]
    tags: Vec<HvdbNamed>,
    #[serde(rename = "cvs", alias = "CVs", default)]
    cvs: Vec<HvdbNamed>,
}

#[derive(Debug, Deserialize)]
struct HvdbNamed {
    #[serde(rename = "name", alias = "Name")]
    name: String,
}

#[async_trait]
impl MetadataProvider for HvdbProvider {
    fn name(&self) -> &'static str {
        "hvdb"
    }

    async fn fetch_static(
        &self,
        id: WorkId,
        _locale: &str,
    ) -> Result<StaticMetadata, ProviderError> {
        // HVDB keys works by the bare numeric part
        let numeric = id.raw() % 1_000_000_000_000;
        let url = format!("{BASE_URL}/{numeric}");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(ProviderError::network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(ProviderError::network)?;
        parse_work_details(&body)
    }
}

pub(crate) fn parse_work_details(body: &str) -> Result<StaticMetadata, ProviderError> {
    let work: HvdbWork =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(format!("hvdb: {e}")))?;

    Ok(StaticMetadata {
        title: work.name,
        circle: None,
        release: None,
        nsfw: !work.sfw,
        tags: work.tags.into_iter().map(|t| t.name).collect(),
        voice_actors: work.cvs.into_iter().map(|c| c.name).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_work_details() {
        let body = r#"{
            "name": "ささやき休憩室",
            "sfw": false,
            "tags": [{"name": "Whispering"}],
            "cvs": [{"name": "花丸ことり"}]
        }"#;

        let meta = parse_work_details(body).unwrap();
        assert_eq!(meta.title, "ささやき休憩室");
        assert!(meta.nsfw);
        assert!(meta.circle.is_none());
        assert_eq!(meta.tags, vec!["Whispering"]);
        assert_eq!(meta.voice_actors, vec!["花丸ことり"]);
    }

    #[test]
    fn garbage_body_is_a_parse_error() {
        assert!(matches!(
            parse_work_details("<html>not json</html>"),
            Err(ProviderError::Parse(_))
        ));
    }
}
