//! Outbound webhook fan-out.
//!
//! Platform events (campaign completed, payment completed, ...) are posted
//! as HMAC-SHA256-signed JSON to every enabled endpoint the owning user has
//! registered for the event type. Each attempt is logged as a delivery row,
//! success or failure.

pub mod dispatcher;
pub mod signer;
pub mod utils;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Event type names carried in the `X-Sambaza-Event` header and the payload.
pub mod events {
    pub const CAMPAIGN_COMPLETED: &str = "campaign.completed";
    pub const MESSAGE_DELIVERED: &str = "message.delivered";
    pub const PAYMENT_COMPLETED: &str = "payment.completed";
    pub const PAYMENT_FAILED: &str = "payment.failed";
    pub const SURVEY_RESPONSE_RECEIVED: &str = "survey.response.received";
    pub const TEST_PING: &str = "test.ping";
}

/// A platform event about to be fanned out to registered endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    pub fn new(event_type: &str, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            occurred_at: Utc::now(),
            data,
        }
    }

    /// Synthetic event used by the console "send test" action.
    pub fn test_ping() -> Self {
        Self::new(
            events::TEST_PING,
            serde_json::json!({ "message": "sambaza webhook test" }),
        )
    }

    /// The JSON body that is signed and posted.
    pub fn body(&self) -> String {
        serde_json::json!({
            "event": self.event_type,
            "occurred_at": self.occurred_at.to_rfc3339(),
            "data": self.data,
        })
        .to_string()
    }
}
