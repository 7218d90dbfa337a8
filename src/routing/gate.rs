//! Confidence gate: turns a classification into a route

use crate::graph::state::{FallbackReason, Intent, Route};
use crate::routing::classifier::Classification;

/// Default minimum confidence for taking a branch directly
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Outcome of the gate for one router visit
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub route: Route,
    /// Always non-empty
    pub rationale: String,
    pub fallback_reason: Option<FallbackReason>,
}

/// Branch taken for an intent once the gate lets the request through
pub fn route_for_intent(intent: Intent) -> Route {
    match intent {
        Intent::Policy | Intent::ProductInfo => Route::Policy,
        Intent::Order => Route::Order,
        Intent::Web => Route::Web,
        Intent::Complaint => Route::Fallback,
    }
}

/// Forces a clarification detour when the classifier is unsure or needs more input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl ConfidenceGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decide the route for a validated classification
    pub fn decide(&self, classification: &Classification) -> GateDecision {
        let intent = classification.intent;
        let confidence = classification.confidence;
        let reasoning = classification
            .reasoning
            .as_deref()
            .map(|r| format!(" Classifier: {r}"))
            .unwrap_or_default();

        if confidence < self.threshold {
            return GateDecision {
                route: Route::Clarification,
                rationale: format!(
                    "Intent `{intent}` at confidence {confidence:.2} is below the threshold {:.2}; asking the user to clarify.{reasoning}",
                    self.threshold
                ),
                fallback_reason: None,
            };
        }

        if !classification.missing_info.is_empty() {
            return GateDecision {
                route: Route::Clarification,
                rationale: format!(
                    "Intent `{intent}` at confidence {confidence:.2} needs more information: {}.{reasoning}",
                    classification.missing_info.join(", ")
                ),
                fallback_reason: None,
            };
        }

        let route = route_for_intent(intent);
        let fallback_reason = (intent == Intent::Complaint).then_some(FallbackReason::Complaint);
        let rationale = match intent {
            Intent::Complaint => format!(
                "Complaint detected at confidence {confidence:.2}; escalating to a human agent.{reasoning}"
            ),
            Intent::ProductInfo => format!(
                "Intent `product_info` at confidence {confidence:.2} (threshold {:.2}); answering from product and policy documents.{reasoning}",
                self.threshold
            ),
            _ => format!(
                "Intent `{intent}` at confidence {confidence:.2} (threshold {:.2}) routes to `{route}`.{reasoning}",
                self.threshold
            ),
        };

        GateDecision {
            route,
            rationale,
            fallback_reason,
        }
    }
}
