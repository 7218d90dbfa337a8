//! Clarification node
//!
//! Asking and resolving are two halves of one visit: [`Node::run`] produces the
//! question, the orchestrator waits for the user's reply on its turn source, and
//! [`ClarificationHandler::resolve`] folds the reply back into the state before
//! control returns to the router.

use crate::error::NodeError;
use crate::graph::node::{Node, NodeId};
use crate::graph::state::{ConversationEntry, PartialUpdate, SharedState};
use async_trait::async_trait;
use std::collections::BTreeSet;

const REPHRASE_QUESTION: &str =
    "I'm not sure I understood your request. Could you rephrase it or add a little more detail?";

#[derive(Debug, Default, Clone, Copy)]
pub struct ClarificationHandler;

impl ClarificationHandler {
    pub fn new() -> Self {
        Self
    }

    /// Question asking for every outstanding item, or a rephrase request
    pub fn build_question(missing_info: &BTreeSet<String>) -> String {
        let items: Vec<&str> = missing_info.iter().map(String::as_str).collect();
        match items.as_slice() {
            [] => REPHRASE_QUESTION.to_string(),
            [only] => format!("Could you tell me your {only}?"),
            [init @ .., last] => format!(
                "To help with that I need a few more details: your {} and {last}.",
                init.join(", ")
            ),
        }
    }

    /// Fold the user's reply into the state
    ///
    /// A non-blank reply is taken as addressing every outstanding item; the
    /// router will ask again for anything still missing. A blank reply only
    /// records a note.
    pub fn resolve(&self, state: &SharedState, reply: &str) -> PartialUpdate {
        let reply = reply.trim();
        if reply.is_empty() {
            return PartialUpdate::new().with_note("clarification: the user sent an empty reply");
        }

        PartialUpdate {
            append_history: vec![ConversationEntry::user(reply)],
            missing_info: (!state.missing_info().is_empty()).then(BTreeSet::new),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Node for ClarificationHandler {
    fn id(&self) -> NodeId {
        NodeId::Clarification
    }

    async fn run(&self, state: &SharedState) -> Result<PartialUpdate, NodeError> {
        let question = Self::build_question(state.missing_info());

        Ok(PartialUpdate {
            append_history: vec![ConversationEntry::assistant(question.clone())],
            clarification_question: Some(question),
            ..Default::default()
        })
    }
}
