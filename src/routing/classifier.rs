//! Intent classifier contract and its structured-output schema

use crate::error::ClassificationError;
use crate::graph::state::{ConversationEntry, Intent};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Result of classifying one user query
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    /// Details the classifier needs before the request can be answered
    pub missing_info: Vec<String>,
    pub reasoning: Option<String>,
}

impl Classification {
    pub fn new(intent: Intent, confidence: f64) -> Self {
        Self {
            intent,
            confidence,
            missing_info: Vec::new(),
            reasoning: None,
        }
    }

    pub fn with_missing_info<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.missing_info = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Check that the confidence is a finite number in [0, 1]
    pub fn validate(&self) -> Result<(), ClassificationError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ClassificationError::Malformed(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Language-understanding capability used by the router
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `query` given the conversation so far
    async fn classify(
        &self,
        query: &str,
        history: &[ConversationEntry],
    ) -> Result<Classification, ClassificationError>;
}

/// Structured output schema requested from an LLM classifier
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ClassifierOutput {
    /// One of policy, order, web, product_info, complaint
    pub intent: Intent,

    /// Probability that the intent is correct, between 0 and 1
    pub confidence: f64,

    /// Details that must be asked of the user before answering (may be empty)
    pub missing_info: Vec<String>,

    /// Short explanation of the classification
    pub reasoning: String,
}

impl ClassifierOutput {
    /// Generate the JSON schema for this structure
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(ClassifierOutput);
        serde_json::to_value(schema).unwrap_or_default()
    }
}

impl From<ClassifierOutput> for Classification {
    fn from(output: ClassifierOutput) -> Self {
        let reasoning = Some(output.reasoning).filter(|r| !r.trim().is_empty());
        Self {
            intent: output.intent,
            confidence: output.confidence,
            missing_info: output
                .missing_info
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            reasoning,
        }
    }
}
