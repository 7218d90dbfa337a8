//! External collaborator contracts
//!
//! The orchestrator only depends on these traits. Concrete adapters live in the
//! submodules; a collaborator that was not configured is represented by
//! [`Unconfigured`], whose calls fail like any other backend error and are
//! recovered by the branch handlers.

pub mod escalation;
pub mod http;
pub mod serper;

pub use escalation::{LogEscalationSink, WebhookEscalationSink};
pub use http::{HttpBackendConfig, HttpOrderData, HttpRetriever};
pub use serper::{SerperConfig, SerperWebSearch};

use crate::error::{BackendError, QueryError};
use crate::graph::state::{DocumentFragment, HandoffContext, Row, SearchHit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Document retrieval capability used by the policy branch
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return fragments relevant to `query`; an empty list is not an error
    async fn search(&self, query: &str) -> Result<Vec<DocumentFragment>, BackendError>;
}

/// Rows returned by an order lookup, with the query that produced them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderRows {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Order-data capability used by the order branch
#[async_trait]
pub trait OrderData: Send + Sync {
    /// Translate a natural-language question into a query and execute it
    async fn execute(&self, question: &str) -> Result<OrderRows, QueryError>;
}

/// Web search capability used by the web branch
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, BackendError>;
}

/// Destination for human-escalation handoffs
#[async_trait]
pub trait EscalationSink: Send + Sync {
    async fn submit(&self, handoff: &HandoffContext) -> Result<(), BackendError>;
}

/// Placeholder for a collaborator that has no configuration
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured {
    name: &'static str,
}

impl Unconfigured {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }

    fn error(&self) -> BackendError {
        BackendError::NotConfigured(format!("no {} backend configured", self.name))
    }
}

#[async_trait]
impl Retriever for Unconfigured {
    async fn search(&self, _query: &str) -> Result<Vec<DocumentFragment>, BackendError> {
        Err(self.error())
    }
}

#[async_trait]
impl OrderData for Unconfigured {
    async fn execute(&self, _question: &str) -> Result<OrderRows, QueryError> {
        Err(self.error().into())
    }
}

#[async_trait]
impl WebSearch for Unconfigured {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, BackendError> {
        Err(self.error())
    }
}
