/// Errors that can occur when interacting with a third-party gateway.
///
/// # Examples
///
/// ```rust
/// use sambaza_gateway::error::GatewayError;
///
/// let err = GatewayError::ApiResponseError {
///     service: "sms".to_string(),
///     code: "InvalidSenderId".to_string(),
///     message: "sender id not registered".to_string(),
/// };
/// assert!(err.to_string().contains("InvalidSenderId"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// HTTP-level error: non-2xx status code from the gateway.
    #[error("{service} API HTTP error: status={status}, body={body}")]
    HttpError {
        service: String,
        status: u16,
        body: String,
    },

    /// Gateway returned a 2xx status but the payload indicates a logical error.
    #[error("{service} API error: code={code}, message={message}")]
    ApiResponseError {
        service: String,
        code: String,
        message: String,
    },

    /// Credentials were rejected (bad API key, expired OAuth token).
    #[error("{service} API unauthorized: {message}")]
    Unauthorized { service: String, message: String },

    /// Request was throttled by the gateway. Callers may retry after backoff.
    #[error("{service} API rate limited, retry after backoff")]
    RateLimited { service: String },

    /// An underlying HTTP transport error from `reqwest`.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON serialization or deserialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// SMTP transport error when sending email.
    #[error("SMTP error: {0}")]
    SmtpError(String),

    /// Gateway account configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Coarse failure bucket the API layer maps onto response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transport problem; the retry helper may try again.
    Network,
    /// Credentials rejected; retrying is pointless.
    Credentials,
    /// Upstream throttling.
    Throttled,
    /// Everything else.
    Other,
}

/// Classify upstream error text by substring. The gateways do not share a
/// structured error contract, so the buckets follow the message wording.
pub fn classify_failure_text(message: &str) -> FailureClass {
    let lower = message.to_lowercase();
    if lower.contains("network") || lower.contains("timed out") || lower.contains("connection") {
        FailureClass::Network
    } else if lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("authentication")
    {
        FailureClass::Credentials
    } else if lower.contains("rate limit") || lower.contains("too many") {
        FailureClass::Throttled
    } else {
        FailureClass::Other
    }
}

impl GatewayError {
    /// Bucket this error for response-code mapping.
    pub fn classify(&self) -> FailureClass {
        match self {
            GatewayError::NetworkError(_) => FailureClass::Network,
            GatewayError::Unauthorized { .. } => FailureClass::Credentials,
            GatewayError::RateLimited { .. } => FailureClass::Throttled,
            GatewayError::HttpError { status, body, .. } => match status {
                401 | 403 => FailureClass::Credentials,
                429 => FailureClass::Throttled,
                _ => classify_failure_text(body),
            },
            other => classify_failure_text(&other.to_string()),
        }
    }

    /// Whether the retry helper should attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classify(),
            FailureClass::Network | FailureClass::Throttled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_substring() {
        assert_eq!(
            classify_failure_text("request timed out after 10s"),
            FailureClass::Network
        );
        assert_eq!(
            classify_failure_text("Unauthorized: invalid credentials"),
            FailureClass::Credentials
        );
        assert_eq!(
            classify_failure_text("rate limit exceeded for account"),
            FailureClass::Throttled
        );
        assert_eq!(
            classify_failure_text("insufficient balance"),
            FailureClass::Other
        );
    }

    #[test]
    fn http_status_overrides_body_text() {
        let err = GatewayError::HttpError {
            service: "sms".to_string(),
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(err.classify(), FailureClass::Throttled);
        assert!(err.is_retryable());

        let err = GatewayError::HttpError {
            service: "sms".to_string(),
            status: 403,
            body: "nope".to_string(),
        };
        assert_eq!(err.classify(), FailureClass::Credentials);
        assert!(!err.is_retryable());
    }
}
