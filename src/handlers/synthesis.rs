//! Synthesizer: turns the single populated artifact into the final response

use crate::error::NodeError;
use crate::graph::node::{Node, NodeId};
use crate::graph::state::{
    BranchContext, ConversationEntry, FallbackReason, HandoffContext, OrderOutcome, PartialUpdate,
    Row, SharedState,
};
use async_trait::async_trait;
use serde_json::Value;

const GENERIC_ACK: &str =
    "Thanks for reaching out. A member of our support team will follow up with you shortly.";

/// Rows shown in an order answer
const MAX_ORDER_ROWS: usize = 10;

#[derive(Debug, Default, Clone, Copy)]
pub struct Synthesizer;

impl Synthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Compose the response for the state (pure function)
    pub fn compose(state: &SharedState) -> Result<String, NodeError> {
        match (state.branch(), state.handoff_context()) {
            (Some(branch), Some(_)) => Err(NodeError::state_corruption(format!(
                "both a `{}` branch context and a handoff are present",
                branch.route()
            ))),
            (Some(branch), None) => Ok(Self::branch_response(branch)),
            (None, Some(handoff)) => Ok(Self::handoff_response(handoff)),
            (None, None) => Ok(state
                .clarification_question()
                .map(str::to_string)
                .unwrap_or_else(|| GENERIC_ACK.to_string())),
        }
    }

    fn branch_response(branch: &BranchContext) -> String {
        match branch {
            BranchContext::Policy {
                policy_context: Some(context),
                ..
            } => format!("Here is what our policy documents say:\n\n{context}"),
            BranchContext::Policy { error: Some(_), .. } => {
                "I'm sorry, I couldn't reach our policy documents right now. Please try again in a few minutes.".to_string()
            }
            BranchContext::Policy { .. } => {
                "I couldn't find anything in our policy documents that answers this. Could you try wording it differently?".to_string()
            }
            BranchContext::Order {
                outcome: OrderOutcome::Rows(rows),
                ..
            } if rows.is_empty() => {
                "I couldn't find any orders matching your request. Please double-check the order number.".to_string()
            }
            BranchContext::Order {
                outcome: OrderOutcome::Rows(rows),
                ..
            } => Self::order_response(rows),
            BranchContext::Order {
                outcome: OrderOutcome::Failed(_),
                ..
            } => {
                "I'm sorry, I wasn't able to look up your order right now. Please try again later or contact support.".to_string()
            }
            BranchContext::Web {
                web_context: Some(context),
                ..
            } => format!("Here is what I found on the web:\n\n{context}"),
            BranchContext::Web { error: Some(_), .. } => {
                "I'm sorry, web search is unavailable at the moment. Please try again shortly.".to_string()
            }
            BranchContext::Web { .. } => {
                "I searched the web but couldn't find anything relevant to your question.".to_string()
            }
        }
    }

    fn order_response(rows: &[Row]) -> String {
        let mut lines = vec!["Here are the order details I found:".to_string()];
        for row in rows.iter().take(MAX_ORDER_ROWS) {
            let fields = row
                .iter()
                .map(|(key, value)| match value {
                    Value::String(s) => format!("{key}: {s}"),
                    other => format!("{key}: {other}"),
                })
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("- {fields}"));
        }
        if rows.len() > MAX_ORDER_ROWS {
            lines.push(format!("...and {} more", rows.len() - MAX_ORDER_ROWS));
        }
        lines.join("\n")
    }

    fn handoff_response(handoff: &HandoffContext) -> String {
        let ticket = handoff.ticket_id;
        match handoff.reason {
            FallbackReason::Complaint => format!(
                "I'm sorry about your experience. I've passed this to our support team (ticket {ticket}) and someone will get back to you shortly."
            ),
            FallbackReason::Cancelled => format!(
                "Your request was interrupted before I could finish. I've saved it for our support team (ticket {ticket})."
            ),
            FallbackReason::ClarificationLimitExceeded => format!(
                "I'm having trouble understanding the request, so I've handed it to a member of our support team (ticket {ticket})."
            ),
            FallbackReason::ClassificationFailure => format!(
                "I couldn't process your request automatically, so I've forwarded it to our support team (ticket {ticket})."
            ),
        }
    }
}

#[async_trait]
impl Node for Synthesizer {
    fn id(&self) -> NodeId {
        NodeId::Synthesis
    }

    async fn run(&self, state: &SharedState) -> Result<PartialUpdate, NodeError> {
        let response = Self::compose(state)?;

        // A parked clarification question is already the last assistant turn
        let already_said = state
            .conversation_history()
            .last()
            .is_some_and(|entry| entry.content == response);

        let mut update = PartialUpdate {
            final_response: Some(response.clone()),
            ..Default::default()
        };
        if !already_said {
            update.append_history.push(ConversationEntry::assistant(response));
        }
        Ok(update)
    }
}
