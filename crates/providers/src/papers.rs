use std::time::Duration;

use async_trait::async_trait;
use quill_agent::PaperSource;
use quill_core::config::SearchConfig;
use quill_core::domain::paper::{Paper, PaperDetail, PaperId, SearchResponse};
use quill_core::errors::ProviderError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::generation::{check_status, map_transport};

/// Plain-text conversion width for fetched full-text HTML.
const FULL_TEXT_COLUMNS: usize = 120;

/// Client for a CORE-style scholarly works API.
pub struct CoreApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    page_limit: u32,
}

impl CoreApiClient {
    pub fn new(config: &SearchConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ProviderError::Other(error.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            page_limit: config.page_limit,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => {
                request.header("Authorization", format!("Bearer {}", key.expose_secret()))
            }
            None => request,
        }
    }
}

#[async_trait]
impl PaperSource for CoreApiClient {
    async fn search(&self, query: &str) -> Result<SearchResponse, ProviderError> {
        let body = SearchRequest {
            q: query,
            limit: self.page_limit,
            fields: &["id", "title", "abstract", "downloadUrl"],
        };
        let response = self
            .authorize(self.client.post(format!("{}/search/works", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;
        let response = check_status(response).await?;

        let wire: SearchResponseWire =
            response.json().await.map_err(|error| ProviderError::Other(error.to_string()))?;
        tracing::debug!(
            event_name = "providers.search.response",
            total_hits = wire.total_hits,
            returned = wire.results.len(),
            "search response received"
        );
        Ok(SearchResponse {
            results: wire.results.into_iter().filter_map(WorkWire::into_paper).collect(),
            total_hits: wire.total_hits,
        })
    }

    async fn fetch_detail(&self, id: &PaperId) -> Result<PaperDetail, ProviderError> {
        let response = self
            .authorize(self.client.get(format!("{}/works/{}", self.base_url, id)))
            .send()
            .await
            .map_err(map_transport)?;
        let response = check_status(response).await?;

        let wire: WorkDetailWire =
            response.json().await.map_err(|error| ProviderError::Other(error.to_string()))?;
        Ok(wire.into_detail())
    }

    async fn fetch_full_text(&self, url: &str) -> Result<String, ProviderError> {
        let response = self.client.get(url).send().await.map_err(map_transport)?;
        let response = check_status(response).await?;
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes =
            response.bytes().await.map_err(|error| ProviderError::Other(error.to_string()))?;

        let text = if content_type.contains("html") {
            html2text::from_read(&bytes[..], FULL_TEXT_COLUMNS)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned())
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };
        Ok(text)
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    limit: u32,
    fields: &'a [&'a str],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponseWire {
    #[serde(default)]
    total_hits: Option<u64>,
    #[serde(default)]
    results: Vec<WorkWire>,
}

/// Work identifiers come back numeric from some deployments and as
/// strings from others.
#[derive(Deserialize)]
#[serde(untagged)]
enum WorkId {
    Number(u64),
    Text(String),
}

impl WorkId {
    fn into_string(self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkWire {
    id: Option<WorkId>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    download_url: Option<String>,
}

impl WorkWire {
    /// Entries without an id or title are unusable downstream; skip them.
    fn into_paper(self) -> Option<Paper> {
        let id = self.id?.into_string();
        let title = self.title.filter(|title| !title.trim().is_empty())?;
        let mut paper = Paper::new(id, title, self.download_url.unwrap_or_default());
        paper.abstract_text = self.abstract_text.filter(|text| !text.trim().is_empty());
        Some(paper)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkDetailWire {
    id: Option<WorkId>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    authors: Vec<AuthorWire>,
    published_date: Option<String>,
    #[serde(default)]
    source_fulltext_urls: Vec<String>,
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct AuthorWire {
    name: Option<String>,
}

impl WorkDetailWire {
    fn into_detail(self) -> PaperDetail {
        let full_text_url = self
            .source_fulltext_urls
            .into_iter()
            .find(|url| !url.trim().is_empty())
            .or(self.download_url);
        PaperDetail {
            id: PaperId(self.id.map(WorkId::into_string).unwrap_or_default()),
            title: self.title.unwrap_or_default(),
            abstract_text: self.abstract_text.filter(|text| !text.trim().is_empty()),
            authors: self.authors.into_iter().filter_map(|author| author.name).collect(),
            published_date: self.published_date,
            full_text_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_results_map_numeric_ids_and_skip_untitled_entries() {
        let raw = r#"{
            "totalHits": 42,
            "results": [
                { "id": 123, "title": "A Paper", "abstract": "Text.", "downloadUrl": "https://x/123" },
                { "id": "abc", "title": "Another", "downloadUrl": null },
                { "id": 9, "title": "  " },
                { "title": "No id at all" }
            ]
        }"#;
        let wire: SearchResponseWire = serde_json::from_str(raw).expect("parses");
        let papers: Vec<_> = wire.results.into_iter().filter_map(WorkWire::into_paper).collect();

        assert_eq!(wire.total_hits, Some(42));
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].id.0, "123");
        assert_eq!(papers[0].abstract_text.as_deref(), Some("Text."));
        assert_eq!(papers[1].id.0, "abc");
        assert_eq!(papers[1].download_url, "");
    }

    #[test]
    fn detail_prefers_source_fulltext_url_over_download_url() {
        let raw = r#"{
            "id": 7,
            "title": "Detailed",
            "abstract": "Deep dive.",
            "authors": [ { "name": "A. Author" }, { "name": null } ],
            "publishedDate": "2021-03-01",
            "sourceFulltextUrls": ["https://x/full/7"],
            "downloadUrl": "https://x/pdf/7"
        }"#;
        let detail: PaperDetail =
            serde_json::from_str::<WorkDetailWire>(raw).expect("parses").into_detail();

        assert_eq!(detail.id.0, "7");
        assert_eq!(detail.authors, vec!["A. Author".to_string()]);
        assert_eq!(detail.full_text_url.as_deref(), Some("https://x/full/7"));
        assert_eq!(detail.published_date.as_deref(), Some("2021-03-01"));
    }

    #[test]
    fn detail_falls_back_to_download_url() {
        let raw = r#"{ "id": "w1", "title": "T", "downloadUrl": "https://x/pdf/w1" }"#;
        let detail = serde_json::from_str::<WorkDetailWire>(raw).expect("parses").into_detail();
        assert_eq!(detail.full_text_url.as_deref(), Some("https://x/pdf/w1"));
        assert!(detail.authors.is_empty());
    }
}
