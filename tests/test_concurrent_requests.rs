//! Concurrent requests through one shared orchestrator
//!
//! Every request owns its state; running many at once must not leak history,
//! routes or handoffs between them.

mod test_helpers;

use futures::future::join_all;
use omnihelp::graph::{Intent, NoFurtherTurns, Route};
use omnihelp::routing::Classification;
use omnihelp::testing::{ScriptedTurns, StaticClassifier};
use std::collections::HashSet;
use std::sync::Arc;
use test_helpers::HarnessBuilder;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_parallel_requests_keep_separate_state() {
    let harness =
        HarnessBuilder::new(Arc::new(StaticClassifier::intent(Intent::Policy, 0.9))).build();
    let orchestrator = &harness.orchestrator;

    let queries: Vec<String> = (0..16).map(|i| format!("Return policy question #{i}")).collect();
    let runs = queries.iter().map(|query| async move {
        orchestrator
            .run(query, vec![], &NoFurtherTurns, &CancellationToken::new())
            .await
    });
    let reports = join_all(runs).await;

    let mut request_ids = HashSet::new();
    for (query, report) in queries.iter().zip(reports) {
        let report = report.unwrap();
        assert_eq!(report.state.user_query(), query);
        assert_eq!(report.state.route(), Some(Route::Policy));
        assert_eq!(report.state.conversation_history().len(), 2);
        assert!(request_ids.insert(report.state.request_id()));
    }

    assert_eq!(harness.retriever.calls(), 16);
    let snapshot = orchestrator.metrics().snapshot();
    assert_eq!(snapshot.requests.completed, 16);
    assert_eq!(snapshot.requests.in_flight, 0);
}

#[tokio::test]
async fn test_spawned_requests_share_orchestrator() {
    let harness = HarnessBuilder::new(Arc::new(StaticClassifier::new(
        Classification::new(Intent::Complaint, 0.95),
    )))
    .build();
    let orchestrator = Arc::new(harness.orchestrator);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let turns = ScriptedTurns::new(Vec::<String>::new());
                orchestrator
                    .run(
                        &format!("Complaint number {i}"),
                        vec![],
                        &turns,
                        &CancellationToken::new(),
                    )
                    .await
            })
        })
        .collect();

    let mut tickets = HashSet::new();
    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        let handoff = report.state.handoff_context().unwrap();
        assert!(tickets.insert(handoff.ticket_id));
    }

    let handoffs = harness.escalation.handoffs().await;
    assert_eq!(handoffs.len(), 8);
    let queries: HashSet<_> = handoffs.iter().map(|h| h.query.clone()).collect();
    assert_eq!(queries.len(), 8);
}
