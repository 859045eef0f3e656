//! Request and response bodies for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CrmError, FieldError};
use crate::models::{Contact, Direction, InteractionType, NewContact, NewInteraction};

/// Envelope for every JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            fields: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            fields: None,
        }
    }

    /// Error body for a service error. Server-side failures get a generic message.
    pub fn from_error(err: &CrmError) -> Self {
        let message = match err {
            CrmError::Configuration(_) | CrmError::Database(_) | CrmError::Serialization(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        Self {
            success: false,
            data: None,
            error: Some(message),
            fields: err.fields().map(|f| f.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub schema_version: i32,
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateContactRequest {
    #[serde(flatten)]
    pub contact: NewContact,
    #[serde(default)]
    pub upsert: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContactResponse {
    /// False when an upsert updated an existing contact.
    pub created: bool,
    pub contact: Contact,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignRequest {
    pub preparer_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageRequest {
    pub stage: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommissionRequest {
    pub rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRequest {
    pub name: String,
}

/// Interaction body; the contact comes from the path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogInteractionRequest {
    #[serde(default, rename = "type")]
    pub interaction_type: InteractionType,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl LogInteractionRequest {
    pub fn into_input(self, contact_id: Uuid) -> NewInteraction {
        NewInteraction {
            contact_id,
            interaction_type: self.interaction_type,
            direction: self.direction,
            subject: self.subject,
            body: self.body,
            occurred_at: self.occurred_at,
            attachments: self.attachments,
        }
    }
}
