//! Transition audit trail
//!
//! Every edge the orchestrator takes is recorded here and emitted as a
//! structured `tracing` event, so each routing decision can be explained after
//! the fact.

use crate::graph::node::NodeId;
use crate::graph::state::{Route, SharedState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// One edge taken by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub from: NodeId,
    pub to: NodeId,
    pub route: Option<Route>,
    pub routing_rationale: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Ordered list of transitions for one request
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditTrail {
    request_id: Option<Uuid>,
    records: Vec<TransitionRecord>,
}

impl AuditTrail {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id: Some(request_id),
            records: Vec::new(),
        }
    }

    /// Record and log the transition `from -> to` against the current state
    pub fn record(&mut self, from: NodeId, to: NodeId, state: &SharedState) {
        let record = TransitionRecord {
            from,
            to,
            route: state.route(),
            routing_rationale: state.routing_rationale().map(str::to_string),
            timestamp: Utc::now(),
        };

        info!(
            request_id = %state.request_id(),
            node = %from,
            next = %to,
            route = record.route.map(|r| r.as_str()).unwrap_or("none"),
            routing_rationale = record.routing_rationale.as_deref().unwrap_or(""),
            timestamp = %record.timestamp.to_rfc3339(),
            "graph transition"
        );

        self.records.push(record);
    }

    pub fn request_id(&self) -> Option<Uuid> {
        self.request_id
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    /// Records for edges leaving the router, one per router visit
    pub fn router_decisions(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.records.iter().filter(|r| r.from == NodeId::Router)
    }

    /// Number of times `node` was entered
    pub fn visits(&self, node: NodeId) -> usize {
        self.records.iter().filter(|r| r.to == node).count()
    }

    /// Node sequence starting at entry
    pub fn path(&self) -> Vec<NodeId> {
        let mut path = Vec::with_capacity(self.records.len() + 1);
        if let Some(first) = self.records.first() {
            path.push(first.from);
        }
        path.extend(self.records.iter().map(|r| r.to));
        path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_captures_route_and_rationale() {
        let state = SharedState::new("What is your return policy?", vec![]);
        let mut trail = AuditTrail::new(state.request_id());

        trail.record(NodeId::Entry, NodeId::Router, &state);

        assert_eq!(trail.len(), 1);
        let record = &trail.records()[0];
        assert_eq!(record.from, NodeId::Entry);
        assert_eq!(record.to, NodeId::Router);
        assert!(record.route.is_none());
        assert!(record.routing_rationale.is_none());
        assert_eq!(trail.request_id(), Some(state.request_id()));
    }

    #[test]
    fn test_path_and_visits() {
        let state = SharedState::new("q", vec![]);
        let mut trail = AuditTrail::new(state.request_id());

        trail.record(NodeId::Entry, NodeId::Router, &state);
        trail.record(NodeId::Router, NodeId::Clarification, &state);
        trail.record(NodeId::Clarification, NodeId::Router, &state);
        trail.record(NodeId::Router, NodeId::Web, &state);

        assert_eq!(
            trail.path(),
            vec![
                NodeId::Entry,
                NodeId::Router,
                NodeId::Clarification,
                NodeId::Router,
                NodeId::Web
            ]
        );
        assert_eq!(trail.visits(NodeId::Router), 2);
        assert_eq!(trail.router_decisions().count(), 2);
    }
}
