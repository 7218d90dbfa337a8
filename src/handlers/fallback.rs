//! Fallback branch: prepares a human handoff

use crate::backends::EscalationSink;
use crate::error::{sanitize_error_message, BackendError, NodeError};
use crate::graph::node::{Node, NodeId};
use crate::graph::state::{FallbackReason, HandoffContext, PartialUpdate, Role, SharedState};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

pub struct FallbackHandler {
    sink: Arc<dyn EscalationSink>,
    timeout: Duration,
}

impl FallbackHandler {
    pub fn new(sink: Arc<dyn EscalationSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Build the handoff summary from the current state (pure apart from ids and clock)
    pub fn build_handoff(state: &SharedState) -> HandoffContext {
        let mut partial = Map::new();
        if let Some(branch) = state.branch() {
            partial.insert(
                "branch".to_string(),
                serde_json::to_value(branch).unwrap_or(Value::Null),
            );
        }
        if let Some(question) = state.clarification_question() {
            partial.insert("clarification_question".to_string(), json!(question));
        }
        if let Some(rationale) = state.routing_rationale() {
            partial.insert("routing_rationale".to_string(), json!(rationale));
        }

        HandoffContext {
            ticket_id: Uuid::new_v4(),
            request_id: state.request_id(),
            query: state.user_query().to_string(),
            intent: state.intent(),
            confidence: state.confidence(),
            reason: state
                .fallback_reason()
                .unwrap_or(FallbackReason::ClassificationFailure),
            missing_info: state.missing_info().iter().cloned().collect(),
            partial_results: Value::Object(partial),
            notes: state.notes().to_vec(),
            conversation_turns: state
                .conversation_history()
                .iter()
                .filter(|entry| entry.role == Role::User)
                .count(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl Node for FallbackHandler {
    fn id(&self) -> NodeId {
        NodeId::Fallback
    }

    async fn run(&self, state: &SharedState) -> Result<PartialUpdate, NodeError> {
        let handoff = Self::build_handoff(state);
        let mut update = PartialUpdate::new();
        if state.fallback_reason().is_none() {
            update = update.with_note("fallback: no fallback reason was recorded");
        }

        let submitted = tokio::time::timeout(self.timeout, self.sink.submit(&handoff))
            .await
            .unwrap_or(Err(BackendError::Timeout(self.timeout)));

        match submitted {
            Ok(()) => info!(
                request_id = %state.request_id(),
                ticket_id = %handoff.ticket_id,
                reason = %handoff.reason,
                "Handoff submitted"
            ),
            Err(e) => {
                let message = sanitize_error_message(&e.to_string());
                error!(
                    request_id = %state.request_id(),
                    ticket_id = %handoff.ticket_id,
                    error = %message,
                    "Failed to submit handoff"
                );
                update = update.with_note(format!("fallback: escalation submit failed: {message}"));
            }
        }

        update.handoff_context = Some(handoff);
        Ok(update)
    }
}
