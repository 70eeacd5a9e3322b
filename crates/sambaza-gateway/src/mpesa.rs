use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{GatewayError, Result};
use crate::retry::retry_with_backoff;
use crate::MpesaConfig;

/// Result code the gateway sends when the payer cancels on the handset.
pub const RESULT_CODE_CANCELLED: i32 = 1032;

/// Client for the mobile-money gateway (STK push).
///
/// OAuth access tokens are fetched with client credentials and cached until
/// shortly before expiry.
pub struct MpesaClient {
    client: reqwest::Client,
    config: MpesaConfig,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct OAuthResponse {
    access_token: String,
    /// Seconds, returned as a string by the gateway.
    expires_in: String,
}

/// Response to an STK push initiation.
#[derive(Debug, Clone, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

/// Asynchronous STK result callback body: `Body.stkCallback`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub item: Vec<CallbackItem>,
}

/// Name/Value pair from the callback metadata array. Values are mixed
/// (numbers and strings), so they stay as raw JSON values.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

impl StkCallback {
    fn item(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .item
            .iter()
            .find(|i| i.name == name)?
            .value
            .as_ref()
    }

    pub fn amount(&self) -> Option<f64> {
        self.item("Amount").and_then(|v| v.as_f64())
    }

    pub fn receipt(&self) -> Option<String> {
        self.item("MpesaReceiptNumber")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// `TransactionDate` arrives as a numeric `%Y%m%d%H%M%S` stamp.
    pub fn transaction_date(&self) -> Option<String> {
        self.item("TransactionDate").map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn phone_number(&self) -> Option<String> {
        self.item("PhoneNumber").map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Map the result code onto the transaction-row status column.
    pub fn row_status(&self) -> &'static str {
        match self.result_code {
            0 => "completed",
            RESULT_CODE_CANCELLED => "cancelled",
            _ => "failed",
        }
    }
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    /// STK push password: base64(short_code + passkey + timestamp).
    fn password(&self, timestamp: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(format!(
            "{}{}{}",
            self.config.short_code, self.config.passkey, timestamp
        ))
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(ref token) = *cached {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }

        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GatewayError::Unauthorized {
                service: "mpesa".to_string(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::HttpError {
                service: "mpesa".to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let oauth: OAuthResponse = response.json().await?;
        let expires_secs: i64 = oauth.expires_in.parse().unwrap_or(3600);
        // Refresh one minute early so in-flight requests never carry a stale token
        let expires_at = Utc::now() + chrono::Duration::seconds((expires_secs - 60).max(60));
        *cached = Some(CachedToken {
            access_token: oauth.access_token.clone(),
            expires_at,
        });
        Ok(oauth.access_token)
    }

    /// Initiate an STK push prompt on the payer's handset.
    pub async fn stk_push(
        &self,
        phone: &str,
        amount: f64,
        account_reference: &str,
        description: &str,
    ) -> Result<StkPushResponse> {
        retry_with_backoff(2, "mpesa.stk_push", || {
            self.stk_push_once(phone, amount, account_reference, description)
        })
        .await
    }

    async fn stk_push_once(
        &self,
        phone: &str,
        amount: f64,
        account_reference: &str,
        description: &str,
    ) -> Result<StkPushResponse> {
        let token = self.access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let body = serde_json::json!({
            "BusinessShortCode": self.config.short_code,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount.round() as i64,
            "PartyA": phone,
            "PartyB": self.config.short_code,
            "PhoneNumber": phone,
            "CallBackURL": self.config.callback_url,
            "AccountReference": account_reference,
            "TransactionDesc": description,
        });

        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 {
            // Token may have been revoked server-side; drop the cache so the
            // retry fetches a fresh one.
            self.token.lock().await.take();
            return Err(GatewayError::Unauthorized {
                service: "mpesa".to_string(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::HttpError {
                service: "mpesa".to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: StkPushResponse = response.json().await?;
        if parsed.response_code != "0" {
            return Err(GatewayError::ApiResponseError {
                service: "mpesa".to_string(),
                code: parsed.response_code.clone(),
                message: parsed.customer_message.clone(),
            });
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_callback(result_code: i32, with_metadata: bool) -> String {
        let metadata = if with_metadata {
            r#","CallbackMetadata": {"Item": [
                {"Name": "Amount", "Value": 150.0},
                {"Name": "MpesaReceiptNumber", "Value": "QGR7XYZ12"},
                {"Name": "TransactionDate", "Value": 20250301101530},
                {"Name": "PhoneNumber", "Value": 254711000001}
            ]}"#
        } else {
            ""
        };
        format!(
            r#"{{"Body": {{"stkCallback": {{
                "MerchantRequestID": "mr-1",
                "CheckoutRequestID": "ws_CO_1",
                "ResultCode": {result_code},
                "ResultDesc": "desc"{metadata}
            }}}}}}"#
        )
    }

    #[test]
    fn parses_success_callback_metadata() {
        let envelope: StkCallbackEnvelope =
            serde_json::from_str(&sample_callback(0, true)).unwrap();
        let cb = envelope.body.stk_callback;
        assert_eq!(cb.row_status(), "completed");
        assert_eq!(cb.amount(), Some(150.0));
        assert_eq!(cb.receipt().as_deref(), Some("QGR7XYZ12"));
        assert_eq!(cb.transaction_date().as_deref(), Some("20250301101530"));
        assert_eq!(cb.phone_number().as_deref(), Some("254711000001"));
    }

    #[test]
    fn failure_callback_has_no_metadata() {
        let envelope: StkCallbackEnvelope =
            serde_json::from_str(&sample_callback(2001, false)).unwrap();
        let cb = envelope.body.stk_callback;
        assert_eq!(cb.row_status(), "failed");
        assert!(cb.amount().is_none());
        assert!(cb.receipt().is_none());
    }

    #[test]
    fn cancelled_result_code_maps_to_cancelled() {
        let envelope: StkCallbackEnvelope =
            serde_json::from_str(&sample_callback(RESULT_CODE_CANCELLED, false)).unwrap();
        assert_eq!(envelope.body.stk_callback.row_status(), "cancelled");
    }

    #[test]
    fn password_is_base64_of_shortcode_passkey_timestamp() {
        let client = MpesaClient::new(MpesaConfig {
            base_url: "https://sandbox.example".to_string(),
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
            short_code: "174379".to_string(),
            passkey: "key".to_string(),
            callback_url: "https://example.com/cb".to_string(),
        });
        let encoded = client.password("20250301101530");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "174379key20250301101530"
        );
    }
}
