//! HTTP adapters for the retrieval and order-lookup services
//!
//! Both services are plain JSON-over-HTTP endpoints:
//!
//! ```text
//! POST <retrieval url>   {"query": "..."}     -> {"documents": [{"source", "content", "score"?}]}
//! POST <orders url>      {"question": "..."}  -> {"query"?: "...", "rows": [{...}]}
//!                                              | 422 {"error": "..."}  (rejected query)
//! ```
//!
//! Each call is made exactly once; timeouts and retries are not handled here.

use crate::backends::{OrderData, OrderRows, Retriever};
use crate::error::{BackendError, QueryError};
use crate::graph::state::DocumentFragment;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Endpoint configuration shared by the HTTP adapters
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub url: String,
    /// Bearer token, if the service needs one
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl HttpBackendConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn build_client(config: &HttpBackendConfig) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| BackendError::RequestFailed(e.to_string()))
}

async fn post_json<B: Serialize>(
    client: &reqwest::Client,
    config: &HttpBackendConfig,
    body: &B,
) -> Result<reqwest::Response, BackendError> {
    let mut request = client.post(&config.url).json(body);
    if let Some(api_key) = &config.api_key {
        request = request.bearer_auth(api_key);
    }

    request.send().await.map_err(|e| {
        if e.is_timeout() {
            BackendError::Timeout(config.timeout)
        } else {
            BackendError::RequestFailed(e.to_string())
        }
    })
}

#[derive(Debug, Serialize)]
struct RetrievalRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    #[serde(default)]
    documents: Vec<DocumentFragment>,
}

/// Retrieval service client
pub struct HttpRetriever {
    config: HttpBackendConfig,
    client: reqwest::Client,
}

impl HttpRetriever {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn search(&self, query: &str) -> Result<Vec<DocumentFragment>, BackendError> {
        debug!(url = %self.config.url, "Querying retrieval service");

        let response = post_json(&self.client, &self.config, &RetrievalRequest { query }).await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::RequestFailed(format!(
                "retrieval service error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let body: RetrievalResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        debug!(documents = body.documents.len(), "Retrieval service responded");
        Ok(body.documents)
    }
}

#[derive(Debug, Serialize)]
struct OrderLookupRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderLookupRejection {
    error: String,
}

/// Order-lookup service client
pub struct HttpOrderData {
    config: HttpBackendConfig,
    client: reqwest::Client,
}

impl HttpOrderData {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl OrderData for HttpOrderData {
    async fn execute(&self, question: &str) -> Result<OrderRows, QueryError> {
        debug!(url = %self.config.url, "Querying order service");

        let response =
            post_json(&self.client, &self.config, &OrderLookupRequest { question }).await?;
        let status = response.status();

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let rejection: OrderLookupRejection = response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
            warn!(reason = %rejection.error, "Order service rejected generated query");
            return Err(QueryError::InvalidQuery(rejection.error));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::RequestFailed(format!(
                "order service error ({}): {}",
                status.as_u16(),
                error_text
            ))
            .into());
        }

        response
            .json::<OrderRows>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = HttpBackendConfig::new("http://localhost:9000/search")
            .with_api_key("abc")
            .with_timeout(Duration::from_millis(250));

        assert_eq!(config.url, "http://localhost:9000/search");
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_retrieval_response_tolerates_missing_documents() {
        let body: RetrievalResponse = serde_json::from_str("{}").unwrap();
        assert!(body.documents.is_empty());
    }
}
