use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::retry::retry_with_backoff;
use crate::SmsGatewayConfig;

/// Gateway recipient status codes that mean "accepted for delivery".
const ACCEPTED_STATUS_CODES: [i64; 2] = [101, 102];

/// Client for the bulk-SMS/airtime HTTP gateway.
///
/// Authentication is the account `username` plus an `apiKey` header. The
/// send endpoint is called with a form-encoded POST; if the POST fails at
/// the transport level the same request is retried once as a GET with
/// identical query parameters, which is the gateway's documented fallback.
pub struct SmsClient {
    client: reqwest::Client,
    config: SmsGatewayConfig,
}

/// One recipient entry from the gateway send response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsRecipient {
    #[serde(rename = "statusCode")]
    pub status_code: i64,
    #[serde(rename = "number")]
    pub number: String,
    #[serde(rename = "status", default)]
    pub status: String,
    #[serde(rename = "messageId", default)]
    pub message_id: String,
    #[serde(rename = "cost", default)]
    pub cost: String,
}

impl SmsRecipient {
    pub fn accepted(&self) -> bool {
        ACCEPTED_STATUS_CODES.contains(&self.status_code)
    }

    /// Cost strings come back as `"KES 0.8000"`.
    pub fn cost_amount(&self) -> f64 {
        parse_money(&self.cost)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsSendData {
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Recipients", default)]
    pub recipients: Vec<SmsRecipient>,
}

#[derive(Debug, Clone, Deserialize)]
struct SmsSendEnvelope {
    #[serde(rename = "SMSMessageData")]
    sms_message_data: SmsSendData,
}

#[derive(Debug, Clone, Deserialize)]
struct UserDataEnvelope {
    #[serde(rename = "UserData")]
    user_data: UserData,
}

#[derive(Debug, Clone, Deserialize)]
struct UserData {
    #[serde(rename = "balance", default)]
    balance: String,
}

/// Parse a `"KES 0.8000"`-style money string. Unknown formats yield 0.
pub fn parse_money(raw: &str) -> f64 {
    raw.split_whitespace()
        .last()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

impl SmsClient {
    pub fn new(config: SmsGatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn default_sender_id(&self) -> Option<&str> {
        self.config.sender_id.as_deref()
    }

    fn send_params(&self, to: &str, message: &str, from: Option<&str>) -> Vec<(String, String)> {
        let mut params = vec![
            ("username".to_string(), self.config.username.clone()),
            ("to".to_string(), to.to_string()),
            ("message".to_string(), message.to_string()),
        ];
        if let Some(sender) = from.or(self.config.sender_id.as_deref()) {
            params.push(("from".to_string(), sender.to_string()));
        }
        params
    }

    /// Send one message to one or more recipients (comma-joined).
    ///
    /// POST first; on a transport error the request is replayed as a GET
    /// with the same parameters before the failure is surfaced.
    pub async fn send(
        &self,
        to: &[String],
        message: &str,
        from: Option<&str>,
    ) -> Result<SmsSendData> {
        let url = format!("{}/version1/messaging", self.config.base_url);
        let params = self.send_params(&to.join(","), message, from);

        let post_result = self
            .client
            .post(&url)
            .header("apiKey", &self.config.api_key)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await;

        let response = match post_result {
            Ok(resp) => resp,
            Err(e) => {
                // Transport-level POST failure: replay as GET before giving up.
                tracing::warn!(error = %e, "SMS POST failed, falling back to GET");
                self.client
                    .get(&url)
                    .header("apiKey", &self.config.api_key)
                    .header("Accept", "application/json")
                    .query(&params)
                    .send()
                    .await?
            }
        };

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GatewayError::Unauthorized {
                service: "sms".to_string(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        if status.as_u16() == 429 {
            return Err(GatewayError::RateLimited {
                service: "sms".to_string(),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::HttpError {
                service: "sms".to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let envelope: SmsSendEnvelope = response.json().await?;
        Ok(envelope.sms_message_data)
    }

    /// Send with the shared bounded retry on transient failures.
    pub async fn send_with_retry(
        &self,
        to: &[String],
        message: &str,
        from: Option<&str>,
    ) -> Result<SmsSendData> {
        retry_with_backoff(2, "sms.send", || self.send(to, message, from)).await
    }

    /// Fetch the account balance string (e.g. `"KES 1234.5600"`).
    pub async fn balance(&self) -> Result<String> {
        let url = format!("{}/version1/user", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .header("apiKey", &self.config.api_key)
            .header("Accept", "application/json")
            .query(&[("username", self.config.username.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::HttpError {
                service: "sms".to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let envelope: UserDataEnvelope = response.json().await?;
        Ok(envelope.user_data.balance)
    }

    /// Top up a sub-account phone with airtime.
    pub async fn topup(&self, phone: &str, amount: f64, currency_code: &str) -> Result<()> {
        let url = format!("{}/version1/airtime/send", self.config.base_url);
        let recipients = serde_json::json!([{
            "phoneNumber": phone,
            "amount": format!("{currency_code} {amount:.2}"),
        }])
        .to_string();
        let params = [
            ("username".to_string(), self.config.username.clone()),
            ("recipients".to_string(), recipients),
        ];

        let response = self
            .client
            .post(&url)
            .header("apiKey", &self.config.api_key)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::HttpError {
                service: "sms".to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: serde_json::Value = response.json().await?;
        let error_message = body
            .get("errorMessage")
            .and_then(|v| v.as_str())
            .unwrap_or("None");
        if error_message != "None" {
            return Err(GatewayError::ApiResponseError {
                service: "sms".to_string(),
                code: "airtime_error".to_string(),
                message: error_message.to_string(),
            });
        }
        Ok(())
    }
}

/// One row of the gateway delivery-report callback (form-encoded fields).
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryReport {
    /// Gateway message ID the report refers to.
    pub id: String,
    /// `Success` / `Sent` / `Failed` / `Rejected` / `Buffered`
    pub status: String,
    #[serde(rename = "phoneNumber", default)]
    pub phone_number: String,
    #[serde(rename = "networkCode", default)]
    pub network_code: Option<String>,
    #[serde(rename = "failureReason", default)]
    pub failure_reason: Option<String>,
}

impl DeliveryReport {
    /// Map the gateway wording onto the message-row status column.
    /// `Buffered` keeps the row in `sent` until a final report arrives.
    pub fn row_status(&self) -> &'static str {
        match self.status.as_str() {
            "Success" => "delivered",
            "Failed" | "Rejected" => "failed",
            _ => "sent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_envelope() {
        let raw = r#"{
            "SMSMessageData": {
                "Message": "Sent to 2/2 Total Cost: KES 1.6000",
                "Recipients": [
                    {"statusCode": 101, "number": "+254711000001", "status": "Success",
                     "cost": "KES 0.8000", "messageId": "ATXid_1"},
                    {"statusCode": 406, "number": "+254711000002", "status": "UserInBlacklist",
                     "cost": "0", "messageId": "None"}
                ]
            }
        }"#;
        let envelope: SmsSendEnvelope = serde_json::from_str(raw).unwrap();
        let data = envelope.sms_message_data;
        assert_eq!(data.recipients.len(), 2);
        assert!(data.recipients[0].accepted());
        assert!(!data.recipients[1].accepted());
        assert!((data.recipients[0].cost_amount() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn parses_money_strings() {
        assert!((parse_money("KES 0.8000") - 0.8).abs() < 1e-9);
        assert!((parse_money("1.25") - 1.25).abs() < 1e-9);
        assert_eq!(parse_money("free"), 0.0);
    }

    #[test]
    fn delivery_report_maps_statuses() {
        let report = |status: &str| DeliveryReport {
            id: "ATXid_1".to_string(),
            status: status.to_string(),
            phone_number: "+254711000001".to_string(),
            network_code: None,
            failure_reason: None,
        };
        assert_eq!(report("Success").row_status(), "delivered");
        assert_eq!(report("Failed").row_status(), "failed");
        assert_eq!(report("Rejected").row_status(), "failed");
        assert_eq!(report("Buffered").row_status(), "sent");
        assert_eq!(report("Sent").row_status(), "sent");
    }
}
