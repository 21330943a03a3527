//! Web and media search for spoken search/play commands

use std::fmt::Write as _;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{Error, Result};

/// Number of web results fed to the generator
const SEARCH_RESULT_COUNT: usize = 5;

/// One web search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Free-text web search
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Resolves a free-text query to a playable media locator
#[async_trait]
pub trait MediaSearch: Send + Sync {
    /// `Ok(None)` when nothing matched
    async fn find(&self, query: &str) -> Result<Option<String>>;
}

/// Build the user message asking the generator to answer from search hits
#[must_use]
pub fn search_prompt(query: &str, hits: &[SearchHit]) -> String {
    let mut prompt = format!(
        "Answer the question \"{query}\" in a few spoken sentences using these search results. \
         Do not read out URLs.\n"
    );
    for (i, hit) in hits.iter().enumerate() {
        let _ = write!(prompt, "\n[{}] {}\n{}\n", i + 1, hit.title, hit.snippet);
    }
    prompt
}

#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    description: String,
}

/// Brave Search API client
pub struct BraveSearch {
    api_key: SecretString,
    client: reqwest::Client,
}

impl BraveSearch {
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WebSearch for BraveSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        tracing::debug!(query, "web search");

        let count = SEARCH_RESULT_COUNT.to_string();
        let response = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("X-Subscription-Token", self.api_key.expose_secret())
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await?;

        let response = response
            .error_for_status()
            .map_err(|e| Error::Search(e.to_string()))?;
        let parsed: BraveSearchResponse = response.json().await?;

        Ok(parsed
            .web
            .map(|web| {
                web.results
                    .into_iter()
                    .map(|r| SearchHit {
                        title: r.title,
                        url: r.url,
                        snippet: r.description,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct YouTubeSearchResponse {
    #[serde(default)]
    items: Vec<YouTubeItem>,
}

#[derive(Debug, Deserialize)]
struct YouTubeItem {
    id: YouTubeId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YouTubeId {
    video_id: Option<String>,
}

/// `YouTube` Data API video search
pub struct YouTubeSearch {
    api_key: SecretString,
    client: reqwest::Client,
}

impl YouTubeSearch {
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MediaSearch for YouTubeSearch {
    async fn find(&self, query: &str) -> Result<Option<String>> {
        tracing::debug!(query, "media search");

        let response = self
            .client
            .get("https://www.googleapis.com/youtube/v3/search")
            .query(&[
                ("part", "id"),
                ("type", "video"),
                ("maxResults", "1"),
                ("q", query),
                ("key", self.api_key.expose_secret()),
            ])
            .send()
            .await?;

        let response = response
            .error_for_status()
            .map_err(|e| Error::Search(e.to_string()))?;
        let parsed: YouTubeSearchResponse = response.json().await?;

        Ok(parsed
            .items
            .into_iter()
            .find_map(|item| item.id.video_id)
            .map(|id| format!("https://www.youtube.com/watch?v={id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_hits_in_order() {
        let hits = vec![
            SearchHit {
                title: "First".to_string(),
                url: "https://a.example".to_string(),
                snippet: "alpha".to_string(),
            },
            SearchHit {
                title: "Second".to_string(),
                url: "https://b.example".to_string(),
                snippet: "beta".to_string(),
            },
        ];
        let prompt = search_prompt("rust release date", &hits);
        assert!(prompt.contains("\"rust release date\""));
        let first = prompt.find("[1] First").unwrap();
        let second = prompt.find("[2] Second").unwrap();
        assert!(first < second);
        assert!(!prompt.contains("https://"));
    }

    #[test]
    fn youtube_response_picks_first_video() {
        let body = r#"{"items":[{"id":{"kind":"youtube#channel"}},{"id":{"kind":"youtube#video","videoId":"abc123"}}]}"#;
        let parsed: YouTubeSearchResponse = serde_json::from_str(body).unwrap();
        let locator = parsed
            .items
            .into_iter()
            .find_map(|item| item.id.video_id)
            .map(|id| format!("https://www.youtube.com/watch?v={id}"));
        assert_eq!(locator.as_deref(), Some("https://www.youtube.com/watch?v=abc123"));
    }
}
