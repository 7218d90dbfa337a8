//! Escalation sinks for fallback handoffs

use crate::backends::EscalationSink;
use crate::error::BackendError;
use crate::graph::state::HandoffContext;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Sink that only records the handoff in the log
///
/// Used when no escalation webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEscalationSink;

#[async_trait]
impl EscalationSink for LogEscalationSink {
    async fn submit(&self, handoff: &HandoffContext) -> Result<(), BackendError> {
        warn!(
            ticket_id = %handoff.ticket_id,
            request_id = %handoff.request_id,
            reason = %handoff.reason,
            intent = handoff.intent.map(|i| i.as_str()).unwrap_or("unknown"),
            "Handoff recorded without escalation webhook"
        );
        Ok(())
    }
}

/// Sink that posts the handoff as JSON to a webhook
pub struct WebhookEscalationSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookEscalationSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl EscalationSink for WebhookEscalationSink {
    async fn submit(&self, handoff: &HandoffContext) -> Result<(), BackendError> {
        let response = self
            .client
            .post(&self.url)
            .json(handoff)
            .send()
            .await
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::RequestFailed(format!(
                "escalation webhook returned {}",
                status.as_u16()
            )));
        }

        info!(ticket_id = %handoff.ticket_id, "Handoff submitted to escalation webhook");
        Ok(())
    }
}
