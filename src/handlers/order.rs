//! Order branch: looks up order data for the user's question

use crate::backends::OrderData;
use crate::error::{sanitize_error_message, BackendError, NodeError, QueryError};
use crate::graph::node::{Node, NodeId};
use crate::graph::state::{BranchContext, OrderOutcome, PartialUpdate, SharedState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct OrderHandler {
    orders: Arc<dyn OrderData>,
    timeout: Duration,
}

impl OrderHandler {
    pub fn new(orders: Arc<dyn OrderData>, timeout: Duration) -> Self {
        Self { orders, timeout }
    }
}

#[async_trait]
impl Node for OrderHandler {
    fn id(&self) -> NodeId {
        NodeId::Order
    }

    async fn run(&self, state: &SharedState) -> Result<PartialUpdate, NodeError> {
        let result = tokio::time::timeout(self.timeout, self.orders.execute(state.user_query()))
            .await
            .unwrap_or_else(|_| Err(QueryError::Backend(BackendError::Timeout(self.timeout))));

        let update = match result {
            Ok(lookup) => {
                debug!(
                    request_id = %state.request_id(),
                    rows = lookup.rows.len(),
                    "Order lookup completed"
                );
                let empty = lookup.rows.is_empty();
                let update = PartialUpdate::new().with_branch(BranchContext::Order {
                    generated_query: lookup.query,
                    outcome: OrderOutcome::Rows(lookup.rows),
                });
                if empty {
                    update.with_note("order: no matching orders were found")
                } else {
                    update
                }
            }
            Err(error) => {
                let message = sanitize_error_message(&error.to_string());
                warn!(request_id = %state.request_id(), error = %message, "Order lookup failed");
                PartialUpdate::new()
                    .with_branch(BranchContext::Order {
                        generated_query: None,
                        outcome: OrderOutcome::Failed(message.clone()),
                    })
                    .with_note(format!("order: lookup failed: {message}"))
            }
        };

        Ok(update)
    }
}
