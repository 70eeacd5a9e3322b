//! Clients for the third-party messaging and mobile-money gateways.
//!
//! [`sms::SmsClient`] talks to the bulk-SMS/airtime HTTP gateway (API key +
//! username auth, POST first with a GET fallback). [`mpesa::MpesaClient`]
//! talks to the mobile-money gateway (OAuth client credentials + STK push).
//! [`mailer::SmtpMailer`] delivers email-type campaigns over SMTP.
//!
//! All outbound calls go through [`retry::retry_with_backoff`], and upstream
//! failures are classified into coarse buckets by [`error::classify_failure_text`]
//! so the API layer can map them onto response codes.

pub mod error;
pub mod mailer;
pub mod mpesa;
pub mod retry;
pub mod sms;

use serde::{Deserialize, Serialize};

/// SMS/airtime gateway account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsGatewayConfig {
    #[serde(default = "default_sms_base_url")]
    pub base_url: String,
    pub username: String,
    pub api_key: String,
    /// Default alphanumeric sender ID when a campaign does not set one.
    #[serde(default)]
    pub sender_id: Option<String>,
}

fn default_sms_base_url() -> String {
    "https://api.africastalking.com".to_string()
}

/// Mobile-money gateway account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaConfig {
    #[serde(default = "default_mpesa_base_url")]
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub passkey: String,
    /// Public URL the gateway posts the asynchronous STK result to.
    pub callback_url: String,
}

fn default_mpesa_base_url() -> String {
    "https://sandbox.safaricom.co.ke".to_string()
}

/// SMTP relay configuration for email-type campaigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}
