//! Shared request state and the partial-update merge
//!
//! [`SharedState`] is the single record threaded through the graph. Nodes only
//! ever see it by shared reference and describe their changes as a
//! [`PartialUpdate`]; the orchestrator applies updates with
//! [`SharedState::merge`], which is the only mutation path. The merge is
//! shallow (returned fields overwrite, omitted fields persist) except for the
//! conversation history and soft notes, which are append-only.

use crate::error::NodeError;
use crate::graph::node::NodeId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Speaker of a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Classified category of a user request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Question answered from policy documents
    Policy,
    /// Order status lookup (labelled `sql` by older classifiers)
    #[serde(alias = "sql")]
    Order,
    /// General question answered from the web
    Web,
    /// Product question; routed to the document-grounded branch
    ProductInfo,
    /// Complaint; escalated to a human
    Complaint,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Policy,
        Intent::Order,
        Intent::Web,
        Intent::ProductInfo,
        Intent::Complaint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Policy => "policy",
            Intent::Order => "order",
            Intent::Web => "web",
            Intent::ProductInfo => "product_info",
            Intent::Complaint => "complaint",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge target chosen by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Policy,
    Order,
    Web,
    Clarification,
    Fallback,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Policy => "policy",
            Route::Order => "order",
            Route::Web => "web",
            Route::Clarification => "clarification",
            Route::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request ended on the fallback branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    ClassificationFailure,
    ClarificationLimitExceeded,
    Cancelled,
    Complaint,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::ClassificationFailure => "classification_failure",
            FallbackReason::ClarificationLimitExceeded => "clarification_limit_exceeded",
            FallbackReason::Cancelled => "cancelled",
            FallbackReason::Complaint => "complaint",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document fragment returned by the retrieval backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFragment {
    /// Title or identifier of the source document
    pub source: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// One row of an order lookup result
pub type Row = serde_json::Map<String, Value>;

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Result of the order branch: rows or an error, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum OrderOutcome {
    Rows(Vec<Row>),
    Failed(String),
}

/// Context produced by the single branch that executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "branch", rename_all = "snake_case")]
pub enum BranchContext {
    Policy {
        documents: Vec<DocumentFragment>,
        policy_context: Option<String>,
        error: Option<String>,
    },
    Order {
        generated_query: Option<String>,
        outcome: OrderOutcome,
    },
    Web {
        results: Vec<SearchHit>,
        web_context: Option<String>,
        error: Option<String>,
    },
}

impl BranchContext {
    /// Route whose handler produces this context
    pub fn route(&self) -> Route {
        match self {
            BranchContext::Policy { .. } => Route::Policy,
            BranchContext::Order { .. } => Route::Order,
            BranchContext::Web { .. } => Route::Web,
        }
    }

    pub fn policy_context(&self) -> Option<&str> {
        match self {
            BranchContext::Policy { policy_context, .. } => policy_context.as_deref(),
            _ => None,
        }
    }

    pub fn sql_result(&self) -> Option<&[Row]> {
        match self {
            BranchContext::Order {
                outcome: OrderOutcome::Rows(rows),
                ..
            } => Some(rows),
            _ => None,
        }
    }

    pub fn sql_error(&self) -> Option<&str> {
        match self {
            BranchContext::Order {
                outcome: OrderOutcome::Failed(error),
                ..
            } => Some(error),
            _ => None,
        }
    }

    pub fn web_context(&self) -> Option<&str> {
        match self {
            BranchContext::Web { web_context, .. } => web_context.as_deref(),
            _ => None,
        }
    }

    /// Error recorded by the branch, if its backend failed
    pub fn error(&self) -> Option<&str> {
        match self {
            BranchContext::Policy { error, .. } | BranchContext::Web { error, .. } => {
                error.as_deref()
            }
            BranchContext::Order { .. } => self.sql_error(),
        }
    }
}

/// Structured summary handed to a human agent on the fallback path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffContext {
    pub ticket_id: Uuid,
    pub request_id: Uuid,
    pub query: String,
    pub intent: Option<Intent>,
    pub confidence: Option<f64>,
    pub reason: FallbackReason,
    pub missing_info: Vec<String>,
    /// Whatever a branch produced before the request fell back
    pub partial_results: Value,
    pub notes: Vec<String>,
    pub conversation_turns: usize,
    pub created_at: DateTime<Utc>,
}

/// Fields of [`SharedState`] a partial update can touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    ConversationHistory,
    Intent,
    Confidence,
    MissingInfo,
    RoutingRationale,
    Route,
    Branch,
    Notes,
    ClarificationQuestion,
    FallbackReason,
    HandoffContext,
    FinalResponse,
}

impl StateField {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateField::ConversationHistory => "conversation_history",
            StateField::Intent => "intent",
            StateField::Confidence => "confidence",
            StateField::MissingInfo => "missing_info",
            StateField::RoutingRationale => "routing_rationale",
            StateField::Route => "route",
            StateField::Branch => "branch",
            StateField::Notes => "notes",
            StateField::ClarificationQuestion => "clarification_question",
            StateField::FallbackReason => "fallback_reason",
            StateField::HandoffContext => "handoff_context",
            StateField::FinalResponse => "final_response",
        }
    }
}

/// Subset of state a node returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialUpdate {
    pub append_history: Vec<ConversationEntry>,
    pub intent: Option<Intent>,
    pub confidence: Option<f64>,
    /// `Some(empty)` clears the set
    pub missing_info: Option<BTreeSet<String>>,
    pub routing_rationale: Option<String>,
    pub route: Option<Route>,
    pub branch: Option<BranchContext>,
    pub notes: Vec<String>,
    pub clarification_question: Option<String>,
    pub fallback_reason: Option<FallbackReason>,
    pub handoff_context: Option<HandoffContext>,
    pub final_response: Option<String>,
}

impl PartialUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, entry: ConversationEntry) -> Self {
        self.append_history.push(entry);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_branch(mut self, branch: BranchContext) -> Self {
        self.branch = Some(branch);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }

    /// Fields this update would write
    pub fn touched_fields(&self) -> Vec<StateField> {
        let mut fields = Vec::new();
        if !self.append_history.is_empty() {
            fields.push(StateField::ConversationHistory);
        }
        if self.intent.is_some() {
            fields.push(StateField::Intent);
        }
        if self.confidence.is_some() {
            fields.push(StateField::Confidence);
        }
        if self.missing_info.is_some() {
            fields.push(StateField::MissingInfo);
        }
        if self.routing_rationale.is_some() {
            fields.push(StateField::RoutingRationale);
        }
        if self.route.is_some() {
            fields.push(StateField::Route);
        }
        if self.branch.is_some() {
            fields.push(StateField::Branch);
        }
        if !self.notes.is_empty() {
            fields.push(StateField::Notes);
        }
        if self.clarification_question.is_some() {
            fields.push(StateField::ClarificationQuestion);
        }
        if self.fallback_reason.is_some() {
            fields.push(StateField::FallbackReason);
        }
        if self.handoff_context.is_some() {
            fields.push(StateField::HandoffContext);
        }
        if self.final_response.is_some() {
            fields.push(StateField::FinalResponse);
        }
        fields
    }
}

/// Fields each node is allowed to write
pub fn owned_fields(node: NodeId) -> &'static [StateField] {
    use StateField::*;
    match node {
        NodeId::Router => &[
            Intent,
            Confidence,
            MissingInfo,
            RoutingRationale,
            Route,
            FallbackReason,
        ],
        NodeId::Policy | NodeId::Order | NodeId::Web => &[Branch, Notes],
        NodeId::Clarification => &[
            ConversationHistory,
            MissingInfo,
            ClarificationQuestion,
            Notes,
        ],
        NodeId::Fallback => &[HandoffContext, Notes],
        NodeId::Synthesis => &[FinalResponse, ConversationHistory],
        NodeId::Entry | NodeId::Terminal => &[],
    }
}

/// Append-only reducer for the conversation history
pub fn append_history(existing: &mut Vec<ConversationEntry>, incoming: Vec<ConversationEntry>) {
    existing.extend(incoming);
}

/// The single mutable record threaded through the graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedState {
    request_id: Uuid,
    conversation_history: Vec<ConversationEntry>,
    user_query: String,
    intent: Option<Intent>,
    confidence: Option<f64>,
    missing_info: BTreeSet<String>,
    routing_rationale: Option<String>,
    route: Option<Route>,
    branch: Option<BranchContext>,
    notes: Vec<String>,
    clarification_question: Option<String>,
    fallback_reason: Option<FallbackReason>,
    handoff_context: Option<HandoffContext>,
    final_response: Option<String>,
    error: Option<String>,
}

impl SharedState {
    /// Create the state for a new request
    ///
    /// The user query is appended to the prior history as a user entry.
    pub fn new(user_query: impl Into<String>, prior_history: Vec<ConversationEntry>) -> Self {
        let user_query = user_query.into();
        let mut conversation_history = prior_history;
        append_history(
            &mut conversation_history,
            vec![ConversationEntry::user(user_query.clone())],
        );

        Self {
            request_id: Uuid::new_v4(),
            conversation_history,
            user_query,
            intent: None,
            confidence: None,
            missing_info: BTreeSet::new(),
            routing_rationale: None,
            route: None,
            branch: None,
            notes: Vec::new(),
            clarification_question: None,
            fallback_reason: None,
            handoff_context: None,
            final_response: None,
            error: None,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn conversation_history(&self) -> &[ConversationEntry] {
        &self.conversation_history
    }

    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    pub fn intent(&self) -> Option<Intent> {
        self.intent
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn missing_info(&self) -> &BTreeSet<String> {
        &self.missing_info
    }

    pub fn routing_rationale(&self) -> Option<&str> {
        self.routing_rationale.as_deref()
    }

    pub fn route(&self) -> Option<Route> {
        self.route
    }

    pub fn branch(&self) -> Option<&BranchContext> {
        self.branch.as_ref()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn clarification_question(&self) -> Option<&str> {
        self.clarification_question.as_deref()
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        self.fallback_reason
    }

    pub fn handoff_context(&self) -> Option<&HandoffContext> {
        self.handoff_context.as_ref()
    }

    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Merge a node's partial update into the state
    ///
    /// Rejects updates that write fields the node does not own, that would
    /// populate a second branch context, or that carry an out-of-range
    /// confidence. A rejected update leaves the state untouched.
    pub fn merge(&mut self, node: NodeId, update: PartialUpdate) -> Result<(), NodeError> {
        let allowed = owned_fields(node);
        if let Some(field) = update
            .touched_fields()
            .into_iter()
            .find(|field| !allowed.contains(field))
        {
            return Err(NodeError::state_corruption(format!(
                "node `{node}` may not write `{}`",
                field.as_str()
            )));
        }

        if let Some(confidence) = update.confidence {
            if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
                return Err(NodeError::state_corruption(format!(
                    "confidence {confidence} is outside [0, 1]"
                )));
            }
        }

        if let Some(branch) = &update.branch {
            if let Some(existing) = &self.branch {
                return Err(NodeError::state_corruption(format!(
                    "branch `{}` already executed, refusing context from `{}`",
                    existing.route(),
                    branch.route()
                )));
            }
            if NodeId::for_route(branch.route()) != node {
                return Err(NodeError::state_corruption(format!(
                    "node `{node}` returned a `{}` branch context",
                    branch.route()
                )));
            }
        }

        append_history(&mut self.conversation_history, update.append_history);
        self.notes.extend(update.notes);

        if let Some(intent) = update.intent {
            self.intent = Some(intent);
        }
        if let Some(confidence) = update.confidence {
            self.confidence = Some(confidence);
        }
        if let Some(missing_info) = update.missing_info {
            self.missing_info = missing_info;
        }
        if let Some(rationale) = update.routing_rationale {
            self.routing_rationale = Some(rationale);
        }
        if let Some(route) = update.route {
            self.route = Some(route);
        }
        if let Some(branch) = update.branch {
            self.branch = Some(branch);
        }
        if let Some(question) = update.clarification_question {
            self.clarification_question = Some(question);
        }
        if let Some(reason) = update.fallback_reason {
            self.fallback_reason = Some(reason);
        }
        if let Some(handoff) = update.handoff_context {
            self.handoff_context = Some(handoff);
        }
        if let Some(response) = update.final_response {
            self.final_response = Some(response);
        }

        Ok(())
    }

    /// Record a fatal error; clears any final response so exactly one is set
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.final_response = None;
        self.error = Some(message.into());
    }
}
