use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Campaign lifecycle status.
///
/// # Examples
///
/// ```
/// use sambaza_common::types::CampaignStatus;
///
/// let st: CampaignStatus = "sending".parse().unwrap();
/// assert_eq!(st, CampaignStatus::Sending);
/// assert_eq!(st.to_string(), "sending");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Queued,
    Sending,
    Completed,
    Failed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Queued => write!(f, "queued"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(CampaignStatus::Draft),
            "queued" => Ok(CampaignStatus::Queued),
            "sending" => Ok(CampaignStatus::Sending),
            "completed" => Ok(CampaignStatus::Completed),
            "failed" => Ok(CampaignStatus::Failed),
            _ => Err(format!("unknown campaign status: {s}")),
        }
    }
}

/// Per-message delivery status, as reported by the gateway delivery
/// callback. `Sent` means accepted by the carrier, `Delivered` means the
/// handset confirmed receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    /// Terminal states no longer change from later delivery reports.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Queued => write!(f, "queued"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(DeliveryStatus::Queued),
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            _ => Err(format!("unknown delivery status: {s}")),
        }
    }
}

/// Outbound channel of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Sms,
    Whatsapp,
    Email,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Sms => write!(f, "sms"),
            MessageType::Whatsapp => write!(f, "whatsapp"),
            MessageType::Email => write!(f, "email"),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sms" => Ok(MessageType::Sms),
            "whatsapp" => Ok(MessageType::Whatsapp),
            "email" => Ok(MessageType::Email),
            _ => Err(format!("unknown message type: {s}")),
        }
    }
}

/// M-Pesa transaction status. `Cancelled` corresponds to the gateway
/// result code 1032 (request cancelled by user on the handset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            _ => Err(format!("unknown payment status: {s}")),
        }
    }
}

/// 服务开通状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStatus {
    Pending,
    Active,
    Suspended,
}

impl std::fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationStatus::Pending => write!(f, "pending"),
            ActivationStatus::Active => write!(f, "active"),
            ActivationStatus::Suspended => write!(f, "suspended"),
        }
    }
}

impl std::str::FromStr for ActivationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ActivationStatus::Pending),
            "active" => Ok(ActivationStatus::Active),
            "suspended" => Ok(ActivationStatus::Suspended),
            _ => Err(format!("unknown activation status: {s}")),
        }
    }
}

/// 工单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Open => write!(f, "open"),
            TicketStatus::InProgress => write!(f, "in_progress"),
            TicketStatus::Resolved => write!(f, "resolved"),
            TicketStatus::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(TicketStatus::Open),
            "in_progress" => Ok(TicketStatus::InProgress),
            "resolved" => Ok(TicketStatus::Resolved),
            "closed" => Ok(TicketStatus::Closed),
            _ => Err(format!("unknown ticket status: {s}")),
        }
    }
}

// User & Auth types

/// 用户帐号
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct User {
    /// 唯一标识
    pub id: String,
    /// 登录用户名（必填）
    pub username: String,
    /// 密码哈希（bcrypt）
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Token 版本（用于密码修改后的 JWT 失效）
    #[serde(skip_serializing)]
    pub token_version: i64,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 登录请求
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    /// 登录用户名（必填）
    pub username: String,
    /// 登录密码（必填）
    pub password: String,
}

/// 登录响应
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LoginResponse {
    /// JWT Access Token
    pub access_token: String,
    /// Token 有效期（秒）
    pub expires_in: u64,
}

/// 修改密码请求
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ChangePasswordRequest {
    /// 当前密码（必填）
    pub current_password: String,
    /// 新密码（必填）
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_status_round_trips_through_strings() {
        for s in ["draft", "queued", "sending", "completed", "failed"] {
            let parsed: CampaignStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("done".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn delivery_status_terminal_states() {
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Sent.is_terminal());
        assert!(!DeliveryStatus::Queued.is_terminal());
    }

    #[test]
    fn ticket_status_uses_snake_case() {
        let st: TicketStatus = "in_progress".parse().unwrap();
        assert_eq!(st, TicketStatus::InProgress);
        assert_eq!(
            serde_json::to_value(TicketStatus::InProgress).unwrap(),
            serde_json::json!("in_progress")
        );
    }
}
