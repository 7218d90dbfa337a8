//! End-to-end request scenarios through the orchestrator
//!
//! Each test drives a full request with mock collaborators and checks the
//! observable outcome: final response, route, audit path and handoff.

mod test_helpers;

use omnihelp::error::{ClassificationError, QueryError};
use omnihelp::graph::{
    ChannelTurnSource, FallbackReason, Intent, NodeId, NoFurtherTurns, OrchestratorConfig, Role,
    Route, Row, RunReport,
};
use omnihelp::routing::Classification;
use omnihelp::testing::{
    MockOrderData, MockRetriever, MockWebSearch, RecordingEscalationSink, ScriptedClassifier,
    ScriptedTurns, StaticClassifier,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{test_config, HarnessBuilder};
use tokio_util::sync::CancellationToken;

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn assert_single_outcome(report: &RunReport) {
    assert_eq!(report.state.final_response(), Some(report.final_response.as_str()));
    assert!(report.state.error().is_none());
}

fn assert_rationale_on_every_decision(report: &RunReport) {
    let decisions: Vec<_> = report.audit.router_decisions().collect();
    assert!(!decisions.is_empty());
    for decision in decisions {
        let rationale = decision.routing_rationale.as_deref().unwrap_or_default();
        assert!(!rationale.trim().is_empty(), "router decision without rationale");
    }
}

#[tokio::test]
async fn test_return_policy_question_is_answered_from_documents() {
    let harness = HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Policy, 0.92)))
        .build();

    let report = harness
        .orchestrator
        .run(
            "What is your return policy?",
            vec![],
            &NoFurtherTurns,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert_rationale_on_every_decision(&report);
    assert!(report.final_response.contains("30 days"));
    assert_eq!(report.state.route(), Some(Route::Policy));
    assert_eq!(report.state.intent(), Some(Intent::Policy));
    assert!(report
        .state
        .branch()
        .and_then(|b| b.policy_context())
        .is_some_and(|c| c.contains("[Returns Policy]")));
    assert!(report.state.handoff_context().is_none());
    assert!(!report.awaiting_clarification);
    assert_eq!(
        report.audit.path(),
        vec![
            NodeId::Entry,
            NodeId::Router,
            NodeId::Policy,
            NodeId::Synthesis,
            NodeId::Terminal
        ]
    );
    assert_eq!(harness.retriever.calls(), 1);
    assert_eq!(harness.web.calls(), 0);
    assert_eq!(harness.orders.calls(), 0);

    let last = report.state.conversation_history().last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, report.final_response);
}

#[tokio::test]
async fn test_gibberish_is_clarified_then_rerouted() {
    let classifier = Arc::new(ScriptedClassifier::new(vec![
        Ok(Classification::new(Intent::Web, 0.21)),
        Ok(Classification::new(Intent::Policy, 0.9)),
    ]));
    let harness = HarnessBuilder::new(classifier.clone()).build();
    let turns = ScriptedTurns::new(["I meant your return policy"]);

    let report = harness
        .orchestrator
        .run("asdkjf", vec![], &turns, &CancellationToken::new())
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert_rationale_on_every_decision(&report);
    assert_eq!(
        report.audit.path(),
        vec![
            NodeId::Entry,
            NodeId::Router,
            NodeId::Clarification,
            NodeId::Router,
            NodeId::Policy,
            NodeId::Synthesis,
            NodeId::Terminal
        ]
    );
    assert_eq!(turns.questions().await.len(), 1);
    assert_eq!(classifier.calls(), 2);
    assert_eq!(classifier.seen_history_lengths().await, vec![1, 3]);
    assert_eq!(report.state.user_query(), "asdkjf");
    assert!(report.final_response.contains("30 days"));

    let first_decision = report.audit.router_decisions().next().unwrap();
    assert_eq!(first_decision.to, NodeId::Clarification);
    assert!(first_decision
        .routing_rationale
        .as_deref()
        .unwrap()
        .contains("below the threshold"));
}

#[tokio::test]
async fn test_missing_order_number_is_requested_then_looked_up() {
    let classifier = Arc::new(ScriptedClassifier::new(vec![
        Ok(Classification::new(Intent::Order, 0.95).with_missing_info(["order number"])),
        Ok(Classification::new(Intent::Order, 0.95)),
    ]));
    let harness = HarnessBuilder::new(classifier)
        .orders(MockOrderData::with_rows(omnihelp::backends::OrderRows {
            query: Some("SELECT * FROM orders WHERE id = 1234".to_string()),
            rows: vec![row(json!({"order_id": 1234, "status": "shipped"}))],
        }))
        .build();
    let turns = ScriptedTurns::new(["It's 1234"]);

    let report = harness
        .orchestrator
        .run("Where is my order?", vec![], &turns, &CancellationToken::new())
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert_eq!(
        turns.questions().await,
        vec!["Could you tell me your order number?".to_string()]
    );
    assert_eq!(report.state.route(), Some(Route::Order));
    assert!(report.state.missing_info().is_empty());
    assert!(report.final_response.contains("status: shipped"));
    assert_eq!(report.state.branch().and_then(|b| b.sql_result()).map(<[Row]>::len), Some(1));
}

#[tokio::test]
async fn test_failed_order_lookup_produces_limitation_message() {
    let harness = HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Order, 0.9)))
        .orders(MockOrderData::failing(QueryError::InvalidQuery(
            "refusing to run a write statement".to_string(),
        )))
        .build();

    let report = harness
        .orchestrator
        .run(
            "Cancel every order from last year",
            vec![],
            &NoFurtherTurns,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_single_outcome(&report);
    let branch = report.state.branch().unwrap();
    assert!(branch.sql_error().is_some());
    assert!(branch.sql_result().is_none());
    assert!(report.final_response.contains("wasn't able to look up your order"));
    assert!(report.state.handoff_context().is_none());
    assert!(report.state.notes().iter().any(|n| n.starts_with("order:")));
    assert!(harness.escalation.handoffs().await.is_empty());
}

#[tokio::test]
async fn test_web_question_uses_search_results() {
    let harness =
        HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Web, 0.88))).build();

    let report = harness
        .orchestrator
        .run(
            "Are deliveries delayed this week?",
            vec![],
            &NoFurtherTurns,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.state.route(), Some(Route::Web));
    assert!(report.final_response.contains("northeast"));
    assert!(report.final_response.contains("https://example.com/alerts"));
    assert_eq!(harness.web.calls(), 1);
}

#[tokio::test]
async fn test_web_search_failure_is_reported_softly() {
    let harness = HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Web, 0.88)))
        .web(MockWebSearch::failing("connection refused"))
        .build();

    let report = harness
        .orchestrator
        .run("Any news?", vec![], &NoFurtherTurns, &CancellationToken::new())
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert!(report.state.branch().and_then(|b| b.error()).is_some());
    assert!(report.final_response.contains("web search is unavailable"));
    assert_eq!(harness.orchestrator.metrics().snapshot().routing.branch_failures, 1);
}

#[tokio::test]
async fn test_product_info_is_answered_by_policy_branch() {
    let harness =
        HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::ProductInfo, 0.85))).build();

    let report = harness
        .orchestrator
        .run(
            "Does the X200 come with a warranty?",
            vec![],
            &NoFurtherTurns,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.state.intent(), Some(Intent::ProductInfo));
    assert_eq!(report.state.route(), Some(Route::Policy));
    assert_eq!(harness.retriever.calls(), 1);
}

#[tokio::test]
async fn test_complaint_is_handed_off() {
    let harness =
        HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Complaint, 0.9))).build();

    let report = harness
        .orchestrator
        .run(
            "This is the third time my order arrived broken. I want to talk to a person.",
            vec![],
            &NoFurtherTurns,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert_eq!(report.state.route(), Some(Route::Fallback));
    assert_eq!(report.state.fallback_reason(), Some(FallbackReason::Complaint));
    assert!(report.state.branch().is_none());

    let handoffs = harness.escalation.handoffs().await;
    assert_eq!(handoffs.len(), 1);
    assert_eq!(handoffs[0].reason, FallbackReason::Complaint);
    assert_eq!(handoffs[0].conversation_turns, 1);
    assert!(report
        .final_response
        .contains(&handoffs[0].ticket_id.to_string()));
}

#[tokio::test]
async fn test_escalation_failure_still_produces_response() {
    let harness = HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Complaint, 0.9)))
        .escalation(RecordingEscalationSink::with_failure())
        .build();

    let report = harness
        .orchestrator
        .run("I am very unhappy", vec![], &NoFurtherTurns, &CancellationToken::new())
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert!(report.state.handoff_context().is_some());
    assert!(report
        .state
        .notes()
        .iter()
        .any(|n| n.contains("escalation submit failed")));
}

#[tokio::test]
async fn test_classifier_error_falls_back() {
    let harness = HarnessBuilder::new(Arc::new(StaticClassifier::failing(
        ClassificationError::Unavailable("api_key=sk-123 rejected".to_string()),
    )))
    .build();

    let report = harness
        .orchestrator
        .run("What is your return policy?", vec![], &NoFurtherTurns, &CancellationToken::new())
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert_eq!(report.state.route(), Some(Route::Fallback));
    assert_eq!(report.state.confidence(), Some(0.0));
    assert_eq!(
        report.state.fallback_reason(),
        Some(FallbackReason::ClassificationFailure)
    );
    let rationale = report.state.routing_rationale().unwrap();
    assert!(rationale.contains("Classification failed"));
    assert!(!rationale.contains("sk-123"));
}

#[tokio::test]
async fn test_out_of_range_confidence_falls_back() {
    let harness =
        HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Policy, 1.5))).build();

    let report = harness
        .orchestrator
        .run("What is your return policy?", vec![], &NoFurtherTurns, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state.route(), Some(Route::Fallback));
    assert_eq!(
        report.state.fallback_reason(),
        Some(FallbackReason::ClassificationFailure)
    );
    assert_eq!(harness.retriever.calls(), 0);
}

#[tokio::test]
async fn test_slow_classifier_times_out_into_fallback() {
    let harness = HarnessBuilder::new(Arc::new(
        StaticClassifier::intent(Intent::Policy, 0.9).with_delay(Duration::from_secs(2)),
    ))
    .build();

    let report = harness
        .orchestrator
        .run("What is your return policy?", vec![], &NoFurtherTurns, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state.route(), Some(Route::Fallback));
    assert!(report.state.routing_rationale().unwrap().contains("timed out"));
    assert_eq!(harness.escalation.handoffs().await.len(), 1);
}

#[tokio::test]
async fn test_slow_retriever_times_out_softly() {
    let harness = HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Policy, 0.9)))
        .retriever(
            MockRetriever::with_documents(test_helpers::policy_documents())
                .with_delay(Duration::from_secs(2)),
        )
        .build();

    let report = harness
        .orchestrator
        .run("What is your return policy?", vec![], &NoFurtherTurns, &CancellationToken::new())
        .await
        .unwrap();

    assert_single_outcome(&report);
    let error = report.state.branch().and_then(|b| b.error()).unwrap();
    assert!(error.contains("timed out"));
    assert!(report.final_response.contains("couldn't reach our policy documents"));
}

#[tokio::test]
async fn test_empty_retrieval_is_not_an_error() {
    let harness = HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Policy, 0.9)))
        .retriever(MockRetriever::empty())
        .build();

    let report = harness
        .orchestrator
        .run("Do you price match?", vec![], &NoFurtherTurns, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.state.branch().and_then(|b| b.error()).is_none());
    assert!(report.final_response.contains("couldn't find anything"));
    assert_eq!(report.state.notes().len(), 1);
}

#[tokio::test]
async fn test_clarification_limit_forces_fallback() {
    let classifier = Arc::new(ScriptedClassifier::new(vec![Ok(Classification::new(
        Intent::Web,
        0.3,
    ))]));
    let harness = HarnessBuilder::new(classifier.clone()).build();
    let turns = ScriptedTurns::new(["hmm", "still not sure", "whatever"]);

    let report = harness
        .orchestrator
        .run("asdkjf", vec![], &turns, &CancellationToken::new())
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert_rationale_on_every_decision(&report);
    assert_eq!(report.audit.visits(NodeId::Clarification), 3);
    assert_eq!(report.audit.visits(NodeId::Router), 4);
    assert_eq!(classifier.calls(), 4);
    assert_eq!(
        report.state.fallback_reason(),
        Some(FallbackReason::ClarificationLimitExceeded)
    );
    assert!(report.final_response.contains("trouble understanding"));

    let handoffs = harness.escalation.handoffs().await;
    assert_eq!(handoffs.len(), 1);
    assert_eq!(handoffs[0].conversation_turns, 4);

    let snapshot = harness.orchestrator.metrics().snapshot();
    assert_eq!(snapshot.routing.clarifications, 3);
    assert_eq!(snapshot.routing.forced_fallbacks, 1);
}

#[tokio::test]
async fn test_zero_reroutes_falls_back_without_asking() {
    let harness = HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Web, 0.3)))
        .config(OrchestratorConfig {
            max_reroutes: 0,
            ..test_config()
        })
        .build();
    let turns = ScriptedTurns::new(["unused"]);

    let report = harness
        .orchestrator
        .run("asdkjf", vec![], &turns, &CancellationToken::new())
        .await
        .unwrap();

    assert!(turns.questions().await.is_empty());
    assert_eq!(
        report.state.fallback_reason(),
        Some(FallbackReason::ClarificationLimitExceeded)
    );
}

#[tokio::test]
async fn test_request_parks_on_clarification_without_reply() {
    let harness =
        HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Web, 0.2))).build();

    let report = harness
        .orchestrator
        .run("asdkjf", vec![], &NoFurtherTurns, &CancellationToken::new())
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert!(report.awaiting_clarification);
    assert_eq!(
        report.state.clarification_question(),
        Some(report.final_response.as_str())
    );
    assert!(report.state.handoff_context().is_none());
    assert!(report.state.branch().is_none());

    let assistant_turns = report
        .state
        .conversation_history()
        .iter()
        .filter(|e| e.role == Role::Assistant)
        .count();
    assert_eq!(assistant_turns, 1);
    assert_eq!(harness.orchestrator.metrics().snapshot().requests.parked, 1);
}

#[tokio::test]
async fn test_cancel_before_start_hands_off() {
    let harness =
        HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Policy, 0.9))).build();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = harness
        .orchestrator
        .run("What is your return policy?", vec![], &NoFurtherTurns, &cancel)
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert_eq!(report.state.fallback_reason(), Some(FallbackReason::Cancelled));
    assert!(report.final_response.contains("interrupted"));
    assert_eq!(harness.retriever.calls(), 0);
    assert_eq!(harness.escalation.handoffs().await.len(), 1);
}

#[tokio::test]
async fn test_cancel_during_branch_hands_off() {
    let harness = HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Policy, 0.9)))
        .config(OrchestratorConfig {
            branch_timeout: Duration::from_secs(10),
            ..test_config()
        })
        .retriever(
            MockRetriever::with_documents(test_helpers::policy_documents())
                .with_delay(Duration::from_secs(5)),
        )
        .build();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = harness
        .orchestrator
        .run("What is your return policy?", vec![], &NoFurtherTurns, &cancel)
        .await
        .unwrap();

    assert_single_outcome(&report);
    assert!(report.state.branch().is_none());
    assert_eq!(report.state.fallback_reason(), Some(FallbackReason::Cancelled));
    assert!(report
        .state
        .routing_rationale()
        .unwrap()
        .contains("`policy`"));
    assert_eq!(
        report.audit.path(),
        vec![
            NodeId::Entry,
            NodeId::Router,
            NodeId::Policy,
            NodeId::Fallback,
            NodeId::Synthesis,
            NodeId::Terminal
        ]
    );
}

#[tokio::test]
async fn test_cancel_while_waiting_for_reply_hands_off() {
    let harness =
        HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Web, 0.2))).build();
    let (_reply_tx, turns) = ChannelTurnSource::channel(1);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = harness
        .orchestrator
        .run("asdkjf", vec![], &turns, &cancel)
        .await
        .unwrap();

    assert_eq!(report.state.fallback_reason(), Some(FallbackReason::Cancelled));
    assert!(!report.awaiting_clarification);
    assert_eq!(harness.escalation.handoffs().await.len(), 1);
}

#[tokio::test]
async fn test_empty_query_halts() {
    let harness =
        HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Policy, 0.9))).build();

    for query in ["", "   "] {
        let result = harness
            .orchestrator
            .run(query, vec![], &NoFurtherTurns, &CancellationToken::new())
            .await;
        let err = tokio_test::assert_err!(result);

        assert_eq!(err.node(), NodeId::Entry);
        assert!(err.state().error().is_some());
        assert!(err.state().final_response().is_none());
    }

    let snapshot = harness.orchestrator.metrics().snapshot();
    assert_eq!(snapshot.requests.failed, 2);
    assert_eq!(snapshot.requests.completed, 0);
}

#[tokio::test]
async fn test_respond_returns_final_text() {
    let harness =
        HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Policy, 0.9))).build();

    let answer = harness
        .orchestrator
        .respond("What is your return policy?", vec![])
        .await
        .unwrap();

    assert!(answer.contains("30 days"));
}
