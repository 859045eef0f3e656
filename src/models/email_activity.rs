use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for EmailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("unknown email status: {}", s)),
        }
    }
}

/// Record of one notification send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailActivity {
    pub id: Uuid,
    pub contact_id: Option<Uuid>,
    /// Event key, e.g. `contact.created`.
    pub event: String,
    pub recipient: String,
    pub subject: String,
    pub provider_message_id: Option<String>,
    pub status: EmailStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EmailActivity {
    pub fn sent(
        contact_id: Option<Uuid>,
        event: &str,
        recipient: &str,
        subject: &str,
        provider_message_id: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id,
            event: event.to_string(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            provider_message_id: Some(provider_message_id),
            status: EmailStatus::Sent,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(
        contact_id: Option<Uuid>,
        event: &str,
        recipient: &str,
        subject: &str,
        error: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id,
            event: event.to_string(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            provider_message_id: None,
            status: EmailStatus::Failed,
            error: Some(error),
            created_at: Utc::now(),
        }
    }
}
