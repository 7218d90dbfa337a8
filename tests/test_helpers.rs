//! Test helpers and utilities for integration tests

use omnihelp::graph::{
    Collaborators, DocumentFragment, Orchestrator, OrchestratorConfig, SearchHit,
};
use omnihelp::routing::Classifier;
use omnihelp::testing::{MockOrderData, MockRetriever, MockWebSearch, RecordingEscalationSink};
use std::sync::Arc;
use std::time::Duration;

/// Mocks behind an orchestrator, kept so tests can inspect them afterwards
#[allow(dead_code)]
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub retriever: Arc<MockRetriever>,
    pub orders: Arc<MockOrderData>,
    pub web: Arc<MockWebSearch>,
    pub escalation: Arc<RecordingEscalationSink>,
}

/// Collaborator mocks, defaulting to healthy backends with canned data
#[allow(dead_code)]
pub struct HarnessBuilder {
    config: OrchestratorConfig,
    classifier: Arc<dyn Classifier>,
    retriever: MockRetriever,
    orders: MockOrderData,
    web: MockWebSearch,
    escalation: RecordingEscalationSink,
}

#[allow(dead_code)]
impl HarnessBuilder {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            config: test_config(),
            classifier,
            retriever: MockRetriever::with_documents(policy_documents()),
            orders: MockOrderData::default(),
            web: MockWebSearch::with_results(web_results()),
            escalation: RecordingEscalationSink::new(),
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retriever(mut self, retriever: MockRetriever) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn orders(mut self, orders: MockOrderData) -> Self {
        self.orders = orders;
        self
    }

    pub fn web(mut self, web: MockWebSearch) -> Self {
        self.web = web;
        self
    }

    pub fn escalation(mut self, escalation: RecordingEscalationSink) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn build(self) -> Harness {
        let retriever = Arc::new(self.retriever);
        let orders = Arc::new(self.orders);
        let web = Arc::new(self.web);
        let escalation = Arc::new(self.escalation);

        let orchestrator = Orchestrator::new(
            self.config,
            Collaborators {
                classifier: self.classifier,
                retriever: retriever.clone(),
                orders: orders.clone(),
                web: web.clone(),
                escalation: escalation.clone(),
            },
        );

        Harness {
            orchestrator,
            retriever,
            orders,
            web,
            escalation,
        }
    }
}

/// Orchestrator settings with a short branch timeout
#[allow(dead_code)]
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        confidence_threshold: 0.7,
        max_reroutes: 3,
        branch_timeout: Duration::from_millis(200),
    }
}

#[allow(dead_code)]
pub fn policy_documents() -> Vec<DocumentFragment> {
    vec![DocumentFragment {
        source: "Returns Policy".to_string(),
        content: "Items can be returned within 30 days of delivery for a full refund.".to_string(),
        score: Some(0.91),
    }]
}

#[allow(dead_code)]
pub fn web_results() -> Vec<SearchHit> {
    vec![SearchHit {
        title: "Carrier service alerts".to_string(),
        snippet: "Deliveries in the northeast are delayed by up to two days.".to_string(),
        url: "https://example.com/alerts".to_string(),
    }]
}
