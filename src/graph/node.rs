//! Node contract shared by every handler in the graph

use crate::error::NodeError;
use crate::graph::state::{PartialUpdate, Route, SharedState};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Identifier of a node in the request graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Entry,
    Router,
    Policy,
    Order,
    Web,
    Clarification,
    Fallback,
    Synthesis,
    Terminal,
}

impl NodeId {
    /// Node that handles a router decision
    pub fn for_route(route: Route) -> NodeId {
        match route {
            Route::Policy => NodeId::Policy,
            Route::Order => NodeId::Order,
            Route::Web => NodeId::Web,
            Route::Clarification => NodeId::Clarification,
            Route::Fallback => NodeId::Fallback,
        }
    }

    /// Whether this node is one of the mutually exclusive branches
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            NodeId::Policy | NodeId::Order | NodeId::Web | NodeId::Fallback
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::Entry => "entry",
            NodeId::Router => "router",
            NodeId::Policy => "policy",
            NodeId::Order => "order",
            NodeId::Web => "web",
            NodeId::Clarification => "clarification",
            NodeId::Fallback => "fallback",
            NodeId::Synthesis => "synthesis",
            NodeId::Terminal => "terminal",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the request graph
///
/// Nodes read the shared state and describe their changes as a
/// [`PartialUpdate`]. Collaborator failures a node can recover from belong in
/// the update (a branch error field or a soft note); returning `Err` halts the
/// whole request.
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    async fn run(&self, state: &SharedState) -> Result<PartialUpdate, NodeError>;
}
