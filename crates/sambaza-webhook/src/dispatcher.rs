use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use sambaza_storage::store::{WebhookDeliveryRow, WebhookEndpointRow};
use sambaza_storage::Store;

use crate::signer;
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::WebhookEvent;

/// Attempts per endpoint (the original call plus one retry).
const MAX_ATTEMPTS: u32 = 2;

/// Fixed delay multiplier between attempts.
const RETRY_DELAY_MS: u64 = 500;

/// Fans platform events out to the owning user's registered endpoints.
///
/// Delivery is fire-and-log: every endpoint gets its own POST with the
/// signed payload, and the outcome is recorded as a `webhook_deliveries`
/// row whether it succeeded or not. A failing endpoint never blocks the
/// others.
pub struct WebhookDispatcher {
    store: Arc<Store>,
    client: reqwest::Client,
}

/// Outcome of one endpoint delivery, used for the log row.
struct DeliveryOutcome {
    status: &'static str,
    http_status: Option<u16>,
    response_body: Option<String>,
    error: Option<String>,
    retries: u32,
    duration_ms: i64,
}

impl WebhookDispatcher {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
        }
    }

    /// Deliver `event` to every enabled endpoint of `user_id` subscribed to
    /// its type. Returns the number of endpoints that accepted the event.
    pub async fn dispatch(&self, user_id: &str, event: &WebhookEvent) -> Result<usize> {
        let endpoints = self.store.list_enabled_webhook_endpoints(user_id).await?;
        let targets: Vec<&WebhookEndpointRow> = endpoints
            .iter()
            .filter(|ep| ep.subscribes_to(&event.event_type))
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let body = event.body();
        let mut delivered = 0usize;

        for endpoint in targets {
            let secret = match self
                .store
                .secret_encryptor()
                .decrypt(&endpoint.encrypted_secret)
            {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(
                        endpoint_id = %endpoint.id,
                        error = %e,
                        "Cannot decrypt webhook secret, skipping endpoint"
                    );
                    continue;
                }
            };

            let outcome = self.post_signed(&endpoint.url, &secret, event, &body).await;
            if outcome.status == "success" {
                delivered += 1;
            }

            let log = WebhookDeliveryRow {
                id: sambaza_common::id::next_id(),
                endpoint_id: endpoint.id.clone(),
                user_id: user_id.to_string(),
                event_type: event.event_type.clone(),
                status: outcome.status.to_string(),
                http_status_code: outcome.http_status.map(i32::from),
                request_body: Some(truncate_string(&body, MAX_BODY_LENGTH)),
                response_body: outcome.response_body,
                error_message: outcome.error,
                duration_ms: outcome.duration_ms,
                retry_count: outcome.retries as i32,
                created_at: chrono::Utc::now(),
            };
            if let Err(e) = self.store.insert_webhook_delivery(&log).await {
                tracing::error!(endpoint_id = %endpoint.id, error = %e, "Failed to log webhook delivery");
            }
        }

        Ok(delivered)
    }

    /// Deliver a single test event to one endpoint (console "send test").
    pub async fn deliver_test(&self, endpoint: &WebhookEndpointRow) -> Result<()> {
        let secret = self
            .store
            .secret_encryptor()
            .decrypt(&endpoint.encrypted_secret)?;
        let event = WebhookEvent::test_ping();
        let body = event.body();
        let outcome = self.post_signed(&endpoint.url, &secret, &event, &body).await;

        let log = WebhookDeliveryRow {
            id: sambaza_common::id::next_id(),
            endpoint_id: endpoint.id.clone(),
            user_id: endpoint.user_id.clone(),
            event_type: event.event_type.clone(),
            status: outcome.status.to_string(),
            http_status_code: outcome.http_status.map(i32::from),
            request_body: Some(truncate_string(&body, MAX_BODY_LENGTH)),
            response_body: outcome.response_body,
            error_message: outcome.error.clone(),
            duration_ms: outcome.duration_ms,
            retry_count: outcome.retries as i32,
            created_at: chrono::Utc::now(),
        };
        self.store.insert_webhook_delivery(&log).await?;

        match outcome.error {
            None => Ok(()),
            Some(e) => Err(anyhow::anyhow!(e)),
        }
    }

    async fn post_signed(
        &self,
        url: &str,
        secret: &str,
        event: &WebhookEvent,
        body: &str,
    ) -> DeliveryOutcome {
        let signature = signer::sign(secret, body.as_bytes());
        let started = Instant::now();

        let mut last_err: Option<String> = None;
        let mut last_status: Option<u16> = None;
        let mut last_response_body: Option<String> = None;
        let mut attempts = 0u32;

        for attempt in 0..MAX_ATTEMPTS {
            attempts = attempt + 1;
            match self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .header(signer::SIGNATURE_HEADER, &signature)
                .header(signer::EVENT_HEADER, &event.event_type)
                .body(body.to_string())
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    last_status = Some(status.as_u16());
                    let resp_body = match resp.text().await {
                        Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
                        Err(e) => format!("[Failed to read response body: {}]", e),
                    };
                    last_response_body = Some(resp_body.clone());

                    if status.is_success() {
                        last_err = None;
                        break;
                    }
                    tracing::warn!(
                        attempt = attempts,
                        url = %url,
                        status = %status,
                        "Webhook endpoint returned non-success status, retrying"
                    );
                    last_err = Some(format!("HTTP {status}: {resp_body}"));
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempts,
                        url = %url,
                        error = %e,
                        "Webhook delivery failed, retrying"
                    );
                    last_err = Some(e.to_string());
                }
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(std::time::Duration::from_millis(
                    RETRY_DELAY_MS * (attempt as u64 + 1),
                ))
                .await;
            }
        }

        let duration_ms = started.elapsed().as_millis() as i64;
        match last_err {
            None => DeliveryOutcome {
                status: "success",
                http_status: last_status,
                response_body: last_response_body,
                error: None,
                retries: attempts.saturating_sub(1),
                duration_ms,
            },
            Some(e) => {
                tracing::error!(url = %url, error = %e, "Webhook delivery failed after retries");
                DeliveryOutcome {
                    status: "failed",
                    http_status: last_status,
                    response_body: last_response_body,
                    error: Some(e),
                    retries: attempts.saturating_sub(1),
                    duration_ms,
                }
            }
        }
    }
}
