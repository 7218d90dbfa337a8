//! Web search through the Serper API

use crate::backends::WebSearch;
use crate::error::BackendError;
use crate::graph::state::SearchHit;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Serper client configuration
#[derive(Debug, Clone)]
pub struct SerperConfig {
    pub api_key: String,
    pub base_url: String,
    pub max_results: usize,
    pub timeout: Duration,
}

impl Default for SerperConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://google.serper.dev".to_string(),
            max_results: 5,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Web search collaborator backed by Serper
pub struct SerperWebSearch {
    config: SerperConfig,
    client: reqwest::Client,
}

impl SerperWebSearch {
    pub fn new(config: SerperConfig) -> Result<Self, BackendError> {
        if config.api_key.is_empty() {
            return Err(BackendError::NotConfigured(
                "Serper API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Build search payload (pure function)
    fn build_search_payload(query: &str, max_results: usize) -> Value {
        json!({
            "q": query,
            "num": max_results,
            "gl": "us",
            "hl": "en"
        })
    }

    /// Parse organic results, skipping entries without a title or link (pure function)
    fn parse_search_response(search_result: &Value, max_results: usize) -> Vec<SearchHit> {
        search_result
            .get("organic")
            .and_then(|o| o.as_array())
            .map(|organic| {
                organic
                    .iter()
                    .filter_map(|result| {
                        let title = result.get("title").and_then(|t| t.as_str())?;
                        let link = result.get("link").and_then(|l| l.as_str())?;
                        let snippet = result.get("snippet").and_then(|s| s.as_str()).unwrap_or("");
                        Some(SearchHit {
                            title: title.to_string(),
                            snippet: snippet.to_string(),
                            url: link.to_string(),
                        })
                    })
                    .take(max_results)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl WebSearch for SerperWebSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, BackendError> {
        let payload = Self::build_search_payload(query, self.config.max_results);

        let response = self
            .client
            .post(format!("{}/search", self.config.base_url))
            .header("X-API-KEY", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(self.config.timeout)
                } else {
                    BackendError::RequestFailed(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BackendError::RequestFailed(format!(
                "Serper API error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let search_result: Value = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let hits = Self::parse_search_response(&search_result, self.config.max_results);
        debug!(hits = hits.len(), "Serper search completed");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_api_key() {
        let result = SerperWebSearch::new(SerperConfig::default());
        assert!(matches!(result, Err(BackendError::NotConfigured(_))));
    }

    #[test]
    fn test_build_search_payload() {
        let payload = SerperWebSearch::build_search_payload("test query", 5);

        assert_eq!(payload["q"], "test query");
        assert_eq!(payload["num"], 5);
        assert_eq!(payload["gl"], "us");
        assert_eq!(payload["hl"], "en");
    }

    #[test]
    fn test_parse_search_response_empty() {
        let results = SerperWebSearch::parse_search_response(&json!({}), 5);
        assert!(results.is_empty());
    }

    #[test]
    fn test_parse_search_response_skips_incomplete_entries() {
        let response = json!({
            "organic": [
                {"title": "No link"},
                {"title": "Test Title", "link": "https://example.com", "snippet": "Test snippet"},
                {"title": "Second", "link": "https://example.org"}
            ]
        });

        let results = SerperWebSearch::parse_search_response(&response, 5);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Test Title");
        assert_eq!(results[0].url, "https://example.com");
        assert_eq!(results[0].snippet, "Test snippet");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_parse_search_response_respects_max_results() {
        let organic: Vec<Value> = (0..10)
            .map(|i| json!({"title": format!("t{i}"), "link": format!("https://e.com/{i}")}))
            .collect();

        let results = SerperWebSearch::parse_search_response(&json!({ "organic": organic }), 3);
        assert_eq!(results.len(), 3);
    }
}
