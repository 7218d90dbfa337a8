//! Graph executor
//!
//! Drives one request from entry to a terminal node. The edge table is fixed:
//!
//! ```text
//! entry ──► router ──► policy | order | web | fallback ──► synthesis ──► terminal
//!             ▲   └──► clarification ──┐
//!             └──────── (user reply) ◄─┘  └─(no reply)──► synthesis
//! ```
//!
//! Only the router fans out, on the route it wrote into the state. The
//! executor itself overrides that route in two cases, both merged as router
//! decisions so they show up in the audit trail: the clarification limit and
//! cancellation.

use crate::backends::{EscalationSink, OrderData, Retriever, WebSearch};
use crate::error::{NodeError, OrchestratorError};
use crate::graph::audit::AuditTrail;
use crate::graph::node::{Node, NodeId};
use crate::graph::state::{ConversationEntry, FallbackReason, PartialUpdate, Route, SharedState};
use crate::graph::turns::{NoFurtherTurns, TurnSource};
use crate::handlers::{
    ClarificationHandler, FallbackHandler, OrderHandler, PolicyHandler, Synthesizer, WebHandler,
};
use crate::observability::RoutingMetrics;
use crate::routing::{Classifier, ConfidenceGate, RouterNode, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::{node_span, request_span};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

/// Tunables for the graph, built once and passed to [`Orchestrator::new`]
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Minimum classifier confidence for taking a branch directly
    pub confidence_threshold: f64,
    /// Clarification rounds allowed before the request is handed off
    pub max_reroutes: u32,
    /// Bound on every collaborator call
    pub branch_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_reroutes: 3,
            branch_timeout: Duration::from_secs(10),
        }
    }
}

/// External capabilities the graph depends on
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub retriever: Arc<dyn Retriever>,
    pub orders: Arc<dyn OrderData>,
    pub web: Arc<dyn WebSearch>,
    pub escalation: Arc<dyn EscalationSink>,
}

/// Outcome of a request that reached the terminal node
#[derive(Debug, Clone)]
pub struct RunReport {
    pub final_response: String,
    pub state: SharedState,
    pub audit: AuditTrail,
    /// The response is a clarifying question still waiting for the user
    pub awaiting_clarification: bool,
}

/// Result of running one node under the cancellation token
enum Step {
    Done(Result<PartialUpdate, NodeError>),
    Cancelled,
}

/// Successor of a node whose outgoing edge does not depend on the state
fn static_successor(node: NodeId) -> Option<NodeId> {
    match node {
        NodeId::Entry => Some(NodeId::Router),
        NodeId::Policy | NodeId::Order | NodeId::Web | NodeId::Fallback => Some(NodeId::Synthesis),
        NodeId::Synthesis => Some(NodeId::Terminal),
        NodeId::Router | NodeId::Clarification | NodeId::Terminal => None,
    }
}

/// Executes the request graph; safe to share across concurrent requests
pub struct Orchestrator {
    config: OrchestratorConfig,
    router: RouterNode,
    policy: PolicyHandler,
    order: OrderHandler,
    web: WebHandler,
    clarification: ClarificationHandler,
    fallback: FallbackHandler,
    synthesis: Synthesizer,
    metrics: Arc<RoutingMetrics>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, collaborators: Collaborators) -> Self {
        let timeout = config.branch_timeout;
        Self {
            router: RouterNode::new(
                collaborators.classifier,
                ConfidenceGate::new(config.confidence_threshold),
                timeout,
            ),
            policy: PolicyHandler::new(collaborators.retriever, timeout),
            order: OrderHandler::new(collaborators.orders, timeout),
            web: WebHandler::new(collaborators.web, timeout),
            clarification: ClarificationHandler::new(),
            fallback: FallbackHandler::new(collaborators.escalation, timeout),
            synthesis: Synthesizer::new(),
            metrics: Arc::new(RoutingMetrics::new()),
            config,
        }
    }

    /// Share a metrics collector with other components
    pub fn with_metrics(mut self, metrics: Arc<RoutingMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<RoutingMetrics> {
        &self.metrics
    }

    /// Answer a query without interactive clarification
    pub async fn respond(
        &self,
        query: &str,
        history: Vec<ConversationEntry>,
    ) -> Result<String, OrchestratorError> {
        let report = self
            .run(query, history, &NoFurtherTurns, &CancellationToken::new())
            .await?;
        Ok(report.final_response)
    }

    /// Run one request through the graph
    ///
    /// Returns a report once synthesis has produced the final response, or
    /// [`OrchestratorError::Halted`] if a fatal invariant was violated.
    pub async fn run(
        &self,
        user_query: &str,
        prior_history: Vec<ConversationEntry>,
        turns: &dyn TurnSource,
        cancel: &CancellationToken,
    ) -> Result<RunReport, OrchestratorError> {
        let state = SharedState::new(user_query, prior_history);
        let span = request_span!(request_id = %state.request_id());
        self.drive(state, turns, cancel).instrument(span).await
    }

    async fn drive(
        &self,
        mut state: SharedState,
        turns: &dyn TurnSource,
        cancel: &CancellationToken,
    ) -> Result<RunReport, OrchestratorError> {
        let started = Instant::now();
        let mut audit = AuditTrail::new(state.request_id());
        self.metrics.request_started();
        info!(query_len = state.user_query().len(), "Request received");

        if state.user_query().trim().is_empty() {
            return Err(self.halt(NodeId::Entry, "user query is empty".to_string(), state, started));
        }

        let mut clarifications: u32 = 0;
        let mut awaiting_clarification = false;
        let mut current = NodeId::Entry;

        loop {
            let next = match current {
                NodeId::Entry => NodeId::Router,

                NodeId::Router => {
                    let update = match self.step(&self.router, &state, cancel).await {
                        Step::Done(Ok(update)) => update,
                        Step::Done(Err(e)) => {
                            return Err(self.halt(NodeId::Router, e.to_string(), state, started))
                        }
                        Step::Cancelled => {
                            return self.finish_cancelled(NodeId::Router, state, audit, started).await
                        }
                    };

                    if update.route.is_none() {
                        let e = NodeError::missing_field("route");
                        return Err(self.halt(NodeId::Router, e.to_string(), state, started));
                    }
                    if update.routing_rationale.as_deref().map_or(true, |r| r.trim().is_empty()) {
                        let e = NodeError::missing_field("routing_rationale");
                        return Err(self.halt(NodeId::Router, e.to_string(), state, started));
                    }
                    if let Err(e) = state.merge(NodeId::Router, update) {
                        return Err(self.halt(NodeId::Router, e.to_string(), state, started));
                    }

                    let Some(mut route) = state.route() else {
                        let e = NodeError::missing_field("route");
                        return Err(self.halt(NodeId::Router, e.to_string(), state, started));
                    };
                    self.metrics.route_decided(route);

                    if route == Route::Clarification && clarifications >= self.config.max_reroutes {
                        warn!(
                            clarifications,
                            max_reroutes = self.config.max_reroutes,
                            "Clarification limit reached, forcing fallback"
                        );
                        let limit = PartialUpdate {
                            route: Some(Route::Fallback),
                            fallback_reason: Some(FallbackReason::ClarificationLimitExceeded),
                            routing_rationale: Some(format!(
                                "Still unclear after {clarifications} clarification round(s) (limit {}); handing off to a human agent. Last router decision: {}",
                                self.config.max_reroutes,
                                state.routing_rationale().unwrap_or("none")
                            )),
                            ..Default::default()
                        };
                        if let Err(e) = state.merge(NodeId::Router, limit) {
                            return Err(self.halt(NodeId::Router, e.to_string(), state, started));
                        }
                        self.metrics.fallback_forced();
                        route = Route::Fallback;
                    }

                    NodeId::for_route(route)
                }

                NodeId::Clarification => {
                    match self.step(&self.clarification, &state, cancel).await {
                        Step::Done(Ok(update)) => {
                            if let Err(e) = state.merge(NodeId::Clarification, update) {
                                return Err(self.halt(NodeId::Clarification, e.to_string(), state, started));
                            }
                        }
                        Step::Done(Err(e)) => {
                            return Err(self.halt(NodeId::Clarification, e.to_string(), state, started))
                        }
                        Step::Cancelled => {
                            return self
                                .finish_cancelled(NodeId::Clarification, state, audit, started)
                                .await
                        }
                    }
                    clarifications += 1;
                    self.metrics.clarification_asked();

                    let question = state.clarification_question().unwrap_or_default().to_string();
                    let reply = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return self
                                .finish_cancelled(NodeId::Clarification, state, audit, started)
                                .await;
                        }
                        reply = turns.next_turn(&question) => reply,
                    };

                    match reply {
                        Some(reply) => {
                            let update = self.clarification.resolve(&state, &reply);
                            if let Err(e) = state.merge(NodeId::Clarification, update) {
                                return Err(self.halt(NodeId::Clarification, e.to_string(), state, started));
                            }
                            NodeId::Router
                        }
                        None => {
                            info!(clarifications, "No reply available, parking on clarification");
                            awaiting_clarification = true;
                            NodeId::Synthesis
                        }
                    }
                }

                NodeId::Policy | NodeId::Order | NodeId::Web | NodeId::Fallback => {
                    if state.branch().is_some() || state.handoff_context().is_some() {
                        let e = NodeError::state_corruption(format!(
                            "a branch already ran before `{current}`"
                        ));
                        return Err(self.halt(current, e.to_string(), state, started));
                    }

                    let node = self.branch_node(current);
                    match self.step(node, &state, cancel).await {
                        Step::Done(Ok(update)) => {
                            if let Err(e) = state.merge(current, update) {
                                return Err(self.halt(current, e.to_string(), state, started));
                            }
                        }
                        Step::Done(Err(e)) => {
                            return Err(self.halt(current, e.to_string(), state, started))
                        }
                        Step::Cancelled => {
                            return self.finish_cancelled(current, state, audit, started).await
                        }
                    }
                    self.record_branch_outcome(current, &state);

                    match static_successor(current) {
                        Some(next) => next,
                        None => NodeId::Synthesis,
                    }
                }

                NodeId::Synthesis => {
                    if let Err(e) = self.synthesize(&mut state).await {
                        return Err(self.halt(NodeId::Synthesis, e.to_string(), state, started));
                    }
                    NodeId::Terminal
                }

                NodeId::Terminal => break,
            };

            audit.record(current, next, &state);
            current = next;
        }

        self.complete(state, audit, awaiting_clarification, started)
    }

    fn branch_node(&self, node: NodeId) -> &dyn Node {
        match node {
            NodeId::Policy => &self.policy,
            NodeId::Order => &self.order,
            NodeId::Web => &self.web,
            _ => &self.fallback,
        }
    }

    async fn step(&self, node: &dyn Node, state: &SharedState, cancel: &CancellationToken) -> Step {
        let span = node_span!(node = %node.id());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            result = node.run(state).instrument(span) => Step::Done(result),
        }
    }

    async fn synthesize(&self, state: &mut SharedState) -> Result<(), NodeError> {
        let span = node_span!(node = %NodeId::Synthesis);
        let update = self.synthesis.run(state).instrument(span).await?;
        state.merge(NodeId::Synthesis, update)
    }

    fn record_branch_outcome(&self, node: NodeId, state: &SharedState) {
        if node == NodeId::Fallback {
            if let Some(handoff) = state.handoff_context() {
                self.metrics.fallback_taken(handoff.reason);
            }
        } else if state.branch().and_then(|b| b.error()).is_some() {
            self.metrics.branch_failed();
        }
    }

    /// Abandon the active node and hand the request off
    ///
    /// Fallback and synthesis run to completion here without observing the
    /// token again, so a cancelled request still gets a response.
    async fn finish_cancelled(
        &self,
        interrupted: NodeId,
        mut state: SharedState,
        mut audit: AuditTrail,
        started: Instant,
    ) -> Result<RunReport, OrchestratorError> {
        warn!(node = %interrupted, "Request cancelled, handing off");

        let update = PartialUpdate {
            route: Some(Route::Fallback),
            fallback_reason: Some(FallbackReason::Cancelled),
            routing_rationale: Some(format!(
                "Request cancelled while `{interrupted}` was running; handing off to a human agent."
            )),
            ..Default::default()
        };
        if let Err(e) = state.merge(NodeId::Router, update) {
            return Err(self.halt(interrupted, e.to_string(), state, started));
        }
        self.metrics.fallback_forced();
        audit.record(interrupted, NodeId::Fallback, &state);

        if state.branch().is_none() && state.handoff_context().is_none() {
            let span = node_span!(node = %NodeId::Fallback);
            let merged = match self.fallback.run(&state).instrument(span).await {
                Ok(update) => state.merge(NodeId::Fallback, update),
                Err(e) => Err(e),
            };
            if let Err(e) = merged {
                return Err(self.halt(NodeId::Fallback, e.to_string(), state, started));
            }
            self.record_branch_outcome(NodeId::Fallback, &state);
        }
        audit.record(NodeId::Fallback, NodeId::Synthesis, &state);

        if let Err(e) = self.synthesize(&mut state).await {
            return Err(self.halt(NodeId::Synthesis, e.to_string(), state, started));
        }
        audit.record(NodeId::Synthesis, NodeId::Terminal, &state);

        self.complete(state, audit, false, started)
    }

    fn complete(
        &self,
        state: SharedState,
        audit: AuditTrail,
        awaiting_clarification: bool,
        started: Instant,
    ) -> Result<RunReport, OrchestratorError> {
        let Some(final_response) = state.final_response().map(str::to_string) else {
            let e = NodeError::missing_field("final_response");
            return Err(self.halt(NodeId::Terminal, e.to_string(), state, started));
        };

        self.metrics
            .request_completed(started.elapsed(), awaiting_clarification);
        info!(
            route = state.route().map(|r| r.as_str()).unwrap_or("none"),
            transitions = audit.len(),
            awaiting_clarification,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );

        Ok(RunReport {
            final_response,
            state,
            audit,
            awaiting_clarification,
        })
    }

    fn halt(
        &self,
        node: NodeId,
        message: String,
        mut state: SharedState,
        started: Instant,
    ) -> OrchestratorError {
        error!(node = %node, error = %message, "Request halted");
        state.fail(message.clone());
        self.metrics.request_failed(started.elapsed());
        OrchestratorError::Halted {
            node,
            message,
            state: Box::new(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_edges() {
        assert_eq!(static_successor(NodeId::Entry), Some(NodeId::Router));
        for branch in [NodeId::Policy, NodeId::Order, NodeId::Web, NodeId::Fallback] {
            assert_eq!(static_successor(branch), Some(NodeId::Synthesis));
        }
        assert_eq!(static_successor(NodeId::Synthesis), Some(NodeId::Terminal));
        assert_eq!(static_successor(NodeId::Router), None);
        assert_eq!(static_successor(NodeId::Clarification), None);
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(config.max_reroutes, 3);
        assert_eq!(config.branch_timeout, Duration::from_secs(10));
    }
}
