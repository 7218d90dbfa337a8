//! Error taxonomy for the Omni-Help orchestrator
//!
//! Only [`OrchestratorError`] ever reaches the caller of
//! [`Orchestrator::run`](crate::graph::Orchestrator::run). Collaborator errors
//! ([`ClassificationError`], [`BackendError`], [`QueryError`]) are recovered
//! inside the node that observed them and end up as soft notes or branch error
//! fields on the shared state.

use crate::graph::node::NodeId;
use crate::graph::state::SharedState;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Fatal error surfaced by the orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The request was halted before synthesis; `state.error()` carries the same message
    #[error("Request halted at {node}: {message}")]
    Halted {
        node: NodeId,
        message: String,
        state: Box<SharedState>,
    },
}

impl OrchestratorError {
    /// Node at which the request halted
    pub fn node(&self) -> NodeId {
        match self {
            OrchestratorError::Halted { node, .. } => *node,
        }
    }

    /// Final state of the halted request
    pub fn state(&self) -> &SharedState {
        match self {
            OrchestratorError::Halted { state, .. } => state,
        }
    }
}

/// Error returned by a node when it cannot produce a partial update at all
///
/// Anything a node can recover from locally must be expressed in its partial
/// update instead. A `NodeError` halts the request.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("State corruption: {message}")]
    StateCorruption { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl NodeError {
    /// Create missing field error
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Create state corruption error
    pub fn state_corruption<S: Into<String>>(message: S) -> Self {
        Self::StateCorruption {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Failure of the intent classifier
#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    /// The classifier answered but its output could not be parsed or validated
    #[error("Malformed classifier output: {0}")]
    Malformed(String),

    /// The classifier could not be reached or refused the request
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of a retrieval, search, order or escalation backend
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Backend request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of the order-data capability
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// The generated query was rejected as invalid or unsafe
    #[error("Invalid order query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Sanitize collaborator error text before it is stored in shared state
///
/// Redacts credential-looking pairs and sensitive file paths and caps the
/// message at 500 bytes.
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(truncate_suffix);
    }

    sanitized
}

/// Result type for orchestrator runs
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
