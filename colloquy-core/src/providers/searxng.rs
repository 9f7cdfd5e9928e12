//! SearXNG search adapter (text + image endpoints).
//!
//! SearXNG exposes one `/search` endpoint; `format=json` returns structured
//! results and `categories=images` switches to image hits. Instances are
//! keyless, which keeps offline-free demos runnable against a local
//! container.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SafeSearch;
use crate::error::{ColloquyError, Result};
use crate::providers::{ImageResult, SearchProvider, SearchQuery, SearchResult};

#[derive(Clone)]
pub struct SearxngSearch {
    client: Client,
    base_url: String,
}

impl SearxngSearch {
    /// # Errors
    /// Returns `Transport` if the TLS-backed HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ColloquyError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn search_json(&self, query: &SearchQuery, categories: Option<&str>) -> Result<SearxResponse> {
        let url = format!("{}/search", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.query.clone()),
            ("format", "json".into()),
            ("safesearch", safesearch_param(query.safesearch).into()),
        ];
        if let Some(language) = language_param(&query.region) {
            params.push(("language", language));
        }
        if let Some(categories) = categories {
            params.push(("categories", categories.into()));
        }

        debug!(query = %query.query, categories = ?categories, "search request");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        response
            .json()
            .await
            .map_err(|e| ColloquyError::Parse(format!("search response body: {e}")))
    }
}

#[async_trait]
impl SearchProvider for SearxngSearch {
    async fn text_search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let response = self.search_json(query, None).await?;
        Ok(response
            .results
            .into_iter()
            .filter(|hit| !hit.url.is_empty())
            .map(|hit| SearchResult {
                title: hit.title,
                snippet: hit.content.unwrap_or_default(),
                url: hit.url,
            })
            .take(query.max_results)
            .collect())
    }

    async fn image_search(&self, query: &SearchQuery) -> Result<Vec<ImageResult>> {
        let response = self.search_json(query, Some("images")).await?;
        Ok(response
            .results
            .into_iter()
            .filter_map(|hit| {
                hit.img_src.map(|image_url| ImageResult {
                    image_url,
                    title: Some(hit.title).filter(|t| !t.is_empty()),
                    source_url: Some(hit.url).filter(|u| !u.is_empty()),
                })
            })
            .take(query.max_results)
            .collect())
    }
}

/// SearXNG safesearch levels: 0 off, 1 moderate, 2 strict.
fn safesearch_param(level: SafeSearch) -> &'static str {
    match level {
        SafeSearch::Off => "0",
        SafeSearch::Moderate => "1",
        SafeSearch::Strict => "2",
    }
}

/// `"worldwide"` means no language bias; anything else is forwarded as-is.
fn language_param(region: &str) -> Option<String> {
    let region = region.trim();
    if region.is_empty() || region.eq_ignore_ascii_case("worldwide") {
        None
    } else {
        Some(region.to_string())
    }
}

fn classify_send_error(err: reqwest::Error) -> ColloquyError {
    if err.is_timeout() {
        ColloquyError::Transport("search request timed out".into())
    } else {
        ColloquyError::Transport(format!("search request failed: {err}"))
    }
}

fn status_error(status: StatusCode) -> ColloquyError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ColloquyError::Auth(format!("search API rejected the request ({status})"))
        }
        _ => ColloquyError::Transport(format!("search API returned {status}")),
    }
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxHit>,
}

#[derive(Debug, Deserialize)]
struct SearxHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    img_src: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safesearch_levels_map_to_searxng_values() {
        assert_eq!(safesearch_param(SafeSearch::Off), "0");
        assert_eq!(safesearch_param(SafeSearch::Moderate), "1");
        assert_eq!(safesearch_param(SafeSearch::Strict), "2");
    }

    #[test]
    fn worldwide_region_sends_no_language() {
        assert_eq!(language_param("worldwide"), None);
        assert_eq!(language_param("  "), None);
        assert_eq!(language_param("en-US"), Some("en-US".into()));
    }

    #[test]
    fn deserializes_text_and_image_hits() {
        let body = r#"{
            "query": "moon landing 1969",
            "results": [
                {"title": "Apollo 11", "url": "https://example.org/apollo",
                 "content": "First crewed landing."},
                {"title": "Moon photo", "url": "https://example.org/photo",
                 "img_src": "https://img.example.org/moon.jpg"}
            ]
        }"#;
        let parsed: SearxResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].content.as_deref(), Some("First crewed landing."));
        assert_eq!(
            parsed.results[1].img_src.as_deref(),
            Some("https://img.example.org/moon.jpg")
        );
    }
}
