//! LLM-backed intent classifier
//!
//! Asks a chat-completion model for a [`ClassifierOutput`] and validates the
//! answer against its JSON schema before trusting it. OpenAI gets the schema as
//! a strict `response_format`; other providers are asked for a plain JSON
//! object and rely on the validator alone.

use crate::error::ClassificationError;
use crate::graph::state::{ConversationEntry, Intent, Role};
use crate::llm::provider::{
    CompletionRequest, JsonSchemaDefinition, LlmError, LlmProvider, Message, MessageRole,
    ResponseFormat,
};
use crate::routing::classifier::{Classification, Classifier, ClassifierOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// History entries included in the prompt
const HISTORY_WINDOW: usize = 6;

const SYSTEM_PROMPT: &str = "You are the intent classifier of a customer-support assistant. \
Classify the user's latest request and answer only with the requested JSON object.";

/// Classifier that delegates to an [`LlmProvider`]
pub struct LlmClassifier {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f32,
    validator: jsonschema::Validator,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Result<Self, LlmError> {
        let schema = ClassifierOutput::json_schema();
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| LlmError::NotConfigured(format!("invalid classifier schema: {e}")))?;

        Ok(Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            validator,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_completion_request(&self, query: &str, history: &[ConversationEntry]) -> CompletionRequest {
        let response_format = if self.provider.name() == "openai" {
            ResponseFormat::JsonSchema {
                json_schema: JsonSchemaDefinition {
                    name: "intent_classification".to_string(),
                    strict: Some(true),
                    schema: ClassifierOutput::json_schema(),
                },
            }
        } else {
            ResponseFormat::Json
        };

        CompletionRequest {
            messages: vec![
                Message {
                    role: MessageRole::System,
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: MessageRole::User,
                    content: Self::build_prompt(query, history),
                },
            ],
            model: self.model.clone(),
            max_tokens: Some(300),
            temperature: Some(self.temperature),
            response_format: Some(response_format),
            metadata: Default::default(),
        }
    }

    /// Build the classification prompt (pure function)
    fn build_prompt(query: &str, history: &[ConversationEntry]) -> String {
        let labels = Intent::ALL
            .iter()
            .map(|intent| intent.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        // On the first visit the latest entry is the query itself
        let earlier = history
            .iter()
            .rev()
            .skip_while(|entry| entry.role == Role::User && entry.content == query)
            .take(HISTORY_WINDOW)
            .collect::<Vec<_>>();

        let mut transcript = String::new();
        if earlier.is_empty() {
            transcript.push_str("(no earlier messages)\n");
        } else {
            for entry in earlier.into_iter().rev() {
                let speaker = match entry.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                };
                transcript.push_str(&format!("{speaker}: {}\n", entry.content));
            }
        }

        format!(
            r#"INTENT LABELS: {labels}

- policy: questions about store policies (returns, shipping, warranty)
- order: status or details of a specific order
- web: general questions that need up-to-date public information
- product_info: questions about a product's features or availability
- complaint: the user is unhappy and wants a person to handle it

EARLIER CONVERSATION:
{transcript}
REQUEST:
{query}

If the conversation shows the user answering a clarifying question, classify the
request together with that answer. Return the intent, your confidence between 0
and 1, any details you would need to ask the user for before answering (for
example an order number), and one sentence of reasoning. If the request is
unintelligible use a low confidence."#
        )
    }

    /// Parse and validate the model's answer (pure function apart from the validator)
    fn parse_classifier_output(&self, content: &str) -> Result<Classification, ClassificationError> {
        let mut value: Value = serde_json::from_str(content.trim())
            .map_err(|e| ClassificationError::Malformed(format!("not JSON: {e}")))?;

        if value.get("intent").and_then(Value::as_str) == Some("sql") {
            value["intent"] = Value::String(Intent::Order.as_str().to_string());
        }

        self.validator.validate(&value).map_err(|errors| {
            let details = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect::<Vec<_>>();
            ClassificationError::Malformed(details.join("; "))
        })?;

        let output: ClassifierOutput = serde_json::from_value(value)
            .map_err(|e| ClassificationError::Malformed(e.to_string()))?;

        let classification = Classification::from(output);
        classification.validate()?;
        Ok(classification)
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        query: &str,
        history: &[ConversationEntry],
    ) -> Result<Classification, ClassificationError> {
        let request = self.build_completion_request(query, history);

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| ClassificationError::Unavailable(e.to_string()))?;

        let content = response
            .content
            .ok_or_else(|| ClassificationError::Malformed("empty completion".to_string()))?;

        let classification = self.parse_classifier_output(&content).map_err(|e| {
            warn!(error = %e, "Rejected classifier output");
            e
        })?;

        debug!(
            intent = %classification.intent,
            confidence = classification.confidence,
            missing = classification.missing_info.len(),
            "LLM classification parsed"
        );
        Ok(classification)
    }
}
