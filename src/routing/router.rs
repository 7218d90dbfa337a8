//! Router node
//!
//! Classifies the request once per visit and applies the [`ConfidenceGate`].
//! Classification failures never escape: they become a fallback route with
//! `classification_failure` as the reason.

use crate::error::{sanitize_error_message, ClassificationError, NodeError};
use crate::graph::node::{Node, NodeId};
use crate::graph::state::{FallbackReason, PartialUpdate, Route, SharedState};
use crate::routing::classifier::Classifier;
use crate::routing::gate::ConfidenceGate;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct RouterNode {
    classifier: Arc<dyn Classifier>,
    gate: ConfidenceGate,
    timeout: Duration,
}

impl RouterNode {
    pub fn new(classifier: Arc<dyn Classifier>, gate: ConfidenceGate, timeout: Duration) -> Self {
        Self {
            classifier,
            gate,
            timeout,
        }
    }

    pub fn gate(&self) -> &ConfidenceGate {
        &self.gate
    }

    fn classification_failure(error: &ClassificationError) -> PartialUpdate {
        PartialUpdate {
            confidence: Some(0.0),
            routing_rationale: Some(format!(
                "Classification failed ({}); handing off to a human agent.",
                sanitize_error_message(&error.to_string())
            )),
            route: Some(Route::Fallback),
            fallback_reason: Some(FallbackReason::ClassificationFailure),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Node for RouterNode {
    fn id(&self) -> NodeId {
        NodeId::Router
    }

    async fn run(&self, state: &SharedState) -> Result<PartialUpdate, NodeError> {
        let query = state.user_query();
        let history = state.conversation_history();

        let result = match tokio::time::timeout(self.timeout, self.classifier.classify(query, history))
            .await
        {
            Ok(result) => result.and_then(|classification| {
                classification.validate()?;
                Ok(classification)
            }),
            Err(_) => Err(ClassificationError::Timeout(self.timeout)),
        };

        let classification = match result {
            Ok(classification) => classification,
            Err(error) => {
                warn!(request_id = %state.request_id(), error = %error, "Classification failed");
                return Ok(Self::classification_failure(&error));
            }
        };

        let decision = self.gate.decide(&classification);
        info!(
            request_id = %state.request_id(),
            intent = %classification.intent,
            confidence = classification.confidence,
            route = %decision.route,
            "Routing decision"
        );

        Ok(PartialUpdate {
            intent: Some(classification.intent),
            confidence: Some(classification.confidence),
            missing_info: Some(classification.missing_info.into_iter().collect::<BTreeSet<_>>()),
            routing_rationale: Some(decision.rationale),
            route: Some(decision.route),
            fallback_reason: decision.fallback_reason,
            ..Default::default()
        })
    }
}
