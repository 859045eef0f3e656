use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    #[default]
    Note,
    Email,
    Call,
    Meeting,
    Sms,
    Other,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "NOTE",
            Self::Email => "EMAIL",
            Self::Call => "CALL",
            Self::Meeting => "MEETING",
            Self::Sms => "SMS",
            Self::Other => "OTHER",
        }
    }
}

impl std::str::FromStr for InteractionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NOTE" => Ok(Self::Note),
            "EMAIL" => Ok(Self::Email),
            "CALL" | "PHONE" => Ok(Self::Call),
            "MEETING" => Ok(Self::Meeting),
            "SMS" | "TEXT" => Ok(Self::Sms),
            "OTHER" => Ok(Self::Other),
            _ => Err(format!("unknown interaction type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Inbound,
    #[default]
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "INBOUND",
            Self::Outbound => "OUTBOUND",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INBOUND" | "IN" => Ok(Self::Inbound),
            "OUTBOUND" | "OUT" => Ok(Self::Outbound),
            _ => Err(format!("unknown direction: {}", s)),
        }
    }
}

/// A logged communication with a contact. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub interaction_type: InteractionType,
    pub direction: Direction,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub attachments: Vec<String>,
    /// User who logged it; `None` for automated entries.
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for logging an interaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInteraction {
    pub contact_id: Uuid,
    #[serde(default)]
    pub interaction_type: InteractionType,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Defaults to now.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl NewInteraction {
    pub fn note(contact_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            contact_id,
            body: Some(body.into()),
            ..Default::default()
        }
    }

    pub fn into_interaction(self, created_by: Option<String>) -> Interaction {
        let now = Utc::now();
        Interaction {
            id: Uuid::new_v4(),
            contact_id: self.contact_id,
            interaction_type: self.interaction_type,
            direction: self.direction,
            subject: self.subject,
            body: self.body,
            occurred_at: self.occurred_at.unwrap_or(now),
            attachments: self.attachments,
            created_by,
            created_at: now,
        }
    }
}
