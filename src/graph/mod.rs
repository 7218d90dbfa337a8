//! Request graph: shared state, node contract, executor
//!
//! A request is one sequential traversal of a fixed graph. Nodes never mutate
//! the [`SharedState`] directly; they return a [`PartialUpdate`] that the
//! [`Orchestrator`] merges after checking which fields the node owns.

pub mod audit;
pub mod executor;
pub mod node;
pub mod state;
pub mod turns;

pub use audit::{AuditTrail, TransitionRecord};
pub use executor::{Collaborators, Orchestrator, OrchestratorConfig, RunReport};
pub use node::{Node, NodeId};
pub use state::{
    append_history, owned_fields, BranchContext, ConversationEntry, DocumentFragment,
    FallbackReason, HandoffContext, Intent, OrderOutcome, PartialUpdate, Role, Route, Row,
    SearchHit, SharedState, StateField,
};
pub use turns::{ChannelTurnSource, NoFurtherTurns, TurnSource};
