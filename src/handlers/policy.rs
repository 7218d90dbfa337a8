//! Policy branch: answers from retrieved policy and product documents

use crate::backends::Retriever;
use crate::error::{sanitize_error_message, BackendError, NodeError};
use crate::graph::node::{Node, NodeId};
use crate::graph::state::{BranchContext, DocumentFragment, PartialUpdate, SharedState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct PolicyHandler {
    retriever: Arc<dyn Retriever>,
    timeout: Duration,
}

impl PolicyHandler {
    pub fn new(retriever: Arc<dyn Retriever>, timeout: Duration) -> Self {
        Self { retriever, timeout }
    }
}

/// Join fragments into one context block, each under its source title
pub fn format_policy_context(documents: &[DocumentFragment]) -> String {
    documents
        .iter()
        .map(|doc| format!("[{}]\n{}", doc.source, doc.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Node for PolicyHandler {
    fn id(&self) -> NodeId {
        NodeId::Policy
    }

    async fn run(&self, state: &SharedState) -> Result<PartialUpdate, NodeError> {
        let result = tokio::time::timeout(self.timeout, self.retriever.search(state.user_query()))
            .await
            .unwrap_or(Err(BackendError::Timeout(self.timeout)));

        let update = match result {
            Ok(documents) if documents.is_empty() => {
                debug!(request_id = %state.request_id(), "Retrieval returned no documents");
                PartialUpdate::new()
                    .with_branch(BranchContext::Policy {
                        documents,
                        policy_context: None,
                        error: None,
                    })
                    .with_note("policy: no matching documents were found")
            }
            Ok(documents) => {
                debug!(
                    request_id = %state.request_id(),
                    documents = documents.len(),
                    "Retrieved policy documents"
                );
                let policy_context = format_policy_context(&documents);
                PartialUpdate::new().with_branch(BranchContext::Policy {
                    documents,
                    policy_context: Some(policy_context),
                    error: None,
                })
            }
            Err(error) => {
                let message = sanitize_error_message(&error.to_string());
                warn!(request_id = %state.request_id(), error = %message, "Policy retrieval failed");
                PartialUpdate::new()
                    .with_branch(BranchContext::Policy {
                        documents: Vec::new(),
                        policy_context: None,
                        error: Some(message.clone()),
                    })
                    .with_note(format!("policy: retrieval failed: {message}"))
            }
        };

        Ok(update)
    }
}
