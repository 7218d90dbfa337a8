//! Web branch: answers general questions from web search results

use crate::backends::WebSearch;
use crate::error::{sanitize_error_message, BackendError, NodeError};
use crate::graph::node::{Node, NodeId};
use crate::graph::state::{BranchContext, PartialUpdate, SearchHit, SharedState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct WebHandler {
    search: Arc<dyn WebSearch>,
    timeout: Duration,
}

impl WebHandler {
    pub fn new(search: Arc<dyn WebSearch>, timeout: Duration) -> Self {
        Self { search, timeout }
    }
}

/// Numbered list of hits, one block per result
pub fn format_web_context(results: &[SearchHit]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("{}. {}\n   {}\n   {}", i + 1, hit.title, hit.snippet, hit.url))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Node for WebHandler {
    fn id(&self) -> NodeId {
        NodeId::Web
    }

    async fn run(&self, state: &SharedState) -> Result<PartialUpdate, NodeError> {
        let result = tokio::time::timeout(self.timeout, self.search.search(state.user_query()))
            .await
            .unwrap_or(Err(BackendError::Timeout(self.timeout)));

        let update = match result {
            Ok(results) if results.is_empty() => PartialUpdate::new()
                .with_branch(BranchContext::Web {
                    results,
                    web_context: None,
                    error: None,
                })
                .with_note("web: the search returned no results"),
            Ok(results) => {
                debug!(request_id = %state.request_id(), hits = results.len(), "Web search completed");
                let web_context = format_web_context(&results);
                PartialUpdate::new().with_branch(BranchContext::Web {
                    results,
                    web_context: Some(web_context),
                    error: None,
                })
            }
            Err(error) => {
                let message = sanitize_error_message(&error.to_string());
                warn!(request_id = %state.request_id(), error = %message, "Web search failed");
                PartialUpdate::new()
                    .with_branch(BranchContext::Web {
                        results: Vec::new(),
                        web_context: None,
                        error: Some(message.clone()),
                    })
                    .with_note(format!("web: search failed: {message}"))
            }
        };

        Ok(update)
    }
}
