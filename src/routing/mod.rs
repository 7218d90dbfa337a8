//! Intent classification and routing
//!
//! The router node asks a [`Classifier`] for an intent and a confidence, then
//! the [`ConfidenceGate`] decides whether the request can take a branch
//! directly or must detour through clarification.

pub mod classifier;
pub mod gate;
pub mod llm_classifier;
pub mod router;

pub use classifier::{Classification, Classifier, ClassifierOutput};
pub use gate::{route_for_intent, ConfidenceGate, GateDecision, DEFAULT_CONFIDENCE_THRESHOLD};
pub use llm_classifier::LlmClassifier;
pub use router::RouterNode;
