//! Mock implementations for testing
//!
//! Deterministic stand-ins for the classifier, the backends, the escalation
//! sink, the turn source and the LLM provider, so the whole graph can be
//! exercised without network access.

use crate::backends::{EscalationSink, OrderData, OrderRows, Retriever, WebSearch};
use crate::error::{BackendError, ClassificationError, QueryError};
use crate::graph::state::{ConversationEntry, DocumentFragment, HandoffContext, Intent, SearchHit};
use crate::graph::turns::TurnSource;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use crate::routing::{Classification, Classifier};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

async fn maybe_sleep(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

/// Classifier that returns the same result for every query
#[derive(Debug)]
pub struct StaticClassifier {
    result: Result<Classification, ClassificationError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticClassifier {
    pub fn new(classification: Classification) -> Self {
        Self {
            result: Ok(classification),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn intent(intent: Intent, confidence: f64) -> Self {
        Self::new(Classification::new(intent, confidence))
    }

    pub fn failing(error: ClassificationError) -> Self {
        Self {
            result: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify(
        &self,
        _query: &str,
        _history: &[ConversationEntry],
    ) -> Result<Classification, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        maybe_sleep(self.delay).await;
        self.result.clone()
    }
}

/// Classifier that plays back a script, repeating the last entry when exhausted
#[derive(Debug)]
pub struct ScriptedClassifier {
    script: Vec<Result<Classification, ClassificationError>>,
    calls: AtomicUsize,
    seen_history: Mutex<Vec<usize>>,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<Result<Classification, ClassificationError>>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            seen_history: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// History length observed on each call
    pub async fn seen_history_lengths(&self) -> Vec<usize> {
        self.seen_history.lock().await.clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(
        &self,
        _query: &str,
        history: &[ConversationEntry],
    ) -> Result<Classification, ClassificationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_history.lock().await.push(history.len());

        match self.script.get(call).or_else(|| self.script.last()) {
            Some(result) => result.clone(),
            None => Err(ClassificationError::Unavailable(
                "empty classifier script".to_string(),
            )),
        }
    }
}

/// Retriever returning fixed documents or a fixed error
#[derive(Debug, Default)]
pub struct MockRetriever {
    documents: Vec<DocumentFragment>,
    error: Option<BackendError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockRetriever {
    pub fn with_documents(documents: Vec<DocumentFragment>) -> Self {
        Self {
            documents,
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: Some(BackendError::RequestFailed(message.into())),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn search(&self, _query: &str) -> Result<Vec<DocumentFragment>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        maybe_sleep(self.delay).await;
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self.documents.clone()),
        }
    }
}

/// Order data returning fixed rows or a fixed error
#[derive(Debug, Default)]
pub struct MockOrderData {
    rows: OrderRows,
    error: Option<QueryError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockOrderData {
    pub fn with_rows(rows: OrderRows) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn failing(error: QueryError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderData for MockOrderData {
    async fn execute(&self, _question: &str) -> Result<OrderRows, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        maybe_sleep(self.delay).await;
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self.rows.clone()),
        }
    }
}

/// Web search returning fixed hits or a fixed error
#[derive(Debug, Default)]
pub struct MockWebSearch {
    results: Vec<SearchHit>,
    error: Option<BackendError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockWebSearch {
    pub fn with_results(results: Vec<SearchHit>) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: Some(BackendError::RequestFailed(message.into())),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for MockWebSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        maybe_sleep(self.delay).await;
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self.results.clone()),
        }
    }
}

/// Escalation sink that keeps every submitted handoff
#[derive(Debug, Default)]
pub struct RecordingEscalationSink {
    pub submitted: Arc<Mutex<Vec<HandoffContext>>>,
    pub should_fail: bool,
}

impl RecordingEscalationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub async fn handoffs(&self) -> Vec<HandoffContext> {
        self.submitted.lock().await.clone()
    }
}

#[async_trait]
impl EscalationSink for RecordingEscalationSink {
    async fn submit(&self, handoff: &HandoffContext) -> Result<(), BackendError> {
        self.submitted.lock().await.push(handoff.clone());
        if self.should_fail {
            return Err(BackendError::RequestFailed(
                "Mock escalation failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Turn source that answers from a fixed list, then reports no further turns
#[derive(Debug, Default)]
pub struct ScriptedTurns {
    replies: Mutex<VecDeque<String>>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedTurns {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            questions: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far, in order
    pub async fn questions(&self) -> Vec<String> {
        self.questions.lock().await.clone()
    }
}

#[async_trait]
impl TurnSource for ScriptedTurns {
    async fn next_turn(&self, question: &str) -> Option<String> {
        self.questions.lock().await.push(question.to_string());
        self.replies.lock().await.pop_front()
    }
}

/// Mock LLM provider returning canned completions in sequence
#[derive(Debug)]
pub struct MockLlmProvider {
    pub name: String,
    pub responses: Vec<String>,
    pub current_response: Arc<Mutex<usize>>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
    pub should_fail: bool,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            name: "mock".to_string(),
            responses,
            current_response: Arc::new(Mutex::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Self::new(vec![])
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Report a different provider name (e.g. "openai")
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub async fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().await.push(request);
        if self.should_fail {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let mut current = self.current_response.lock().await;
        let response_idx = *current % self.responses.len().max(1);
        *current += 1;

        let content = self
            .responses
            .get(response_idx)
            .cloned()
            .unwrap_or_else(|| "Mock response".to_string());

        Ok(CompletionResponse {
            content: Some(content),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            metadata: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_classifier_repeats_last_entry() {
        let classifier = ScriptedClassifier::new(vec![
            Ok(Classification::new(Intent::Web, 0.2)),
            Ok(Classification::new(Intent::Web, 0.9)),
        ]);

        let first = classifier.classify("q", &[]).await.unwrap();
        let second = classifier.classify("q", &[]).await.unwrap();
        let third = classifier.classify("q", &[]).await.unwrap();

        assert_eq!(first.confidence, 0.2);
        assert_eq!(second.confidence, 0.9);
        assert_eq!(third.confidence, 0.9);
        assert_eq!(classifier.calls(), 3);
    }

    #[tokio::test]
    async fn test_scripted_turns_run_out() {
        let turns = ScriptedTurns::new(["first"]);

        assert_eq!(turns.next_turn("q1").await.as_deref(), Some("first"));
        assert_eq!(turns.next_turn("q2").await, None);
        assert_eq!(turns.questions().await, vec!["q1", "q2"]);
    }

    #[tokio::test]
    async fn test_recording_sink_records_even_when_failing() {
        let sink = RecordingEscalationSink::with_failure();
        let state = crate::graph::SharedState::new("help", vec![]);
        let handoff = crate::handlers::FallbackHandler::build_handoff(&state);

        assert!(sink.submit(&handoff).await.is_err());
        assert_eq!(sink.handoffs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_llm_provider_cycles_responses() {
        let provider = MockLlmProvider::new(vec!["a".to_string(), "b".to_string()]);
        let request = CompletionRequest {
            messages: vec![],
            model: "m".to_string(),
            max_tokens: None,
            temperature: None,
            response_format: None,
            metadata: HashMap::new(),
        };

        let first = provider.complete(request.clone()).await.unwrap();
        let second = provider.complete(request.clone()).await.unwrap();
        let third = provider.complete(request).await.unwrap();

        assert_eq!(first.content.as_deref(), Some("a"));
        assert_eq!(second.content.as_deref(), Some("b"));
        assert_eq!(third.content.as_deref(), Some("a"));
        assert_eq!(provider.recorded_requests().await.len(), 3);
    }
}
