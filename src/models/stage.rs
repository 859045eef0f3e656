use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position of a contact in the sales/onboarding pipeline.
///
/// Variants are declared in pipeline order, but any stage may be entered from any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    New,
    Contacted,
    Qualified,
    DocumentsRequested,
    DocumentsReceived,
    InProgress,
    Review,
    Filed,
    Complete,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::New,
        Stage::Contacted,
        Stage::Qualified,
        Stage::DocumentsRequested,
        Stage::DocumentsReceived,
        Stage::InProgress,
        Stage::Review,
        Stage::Filed,
        Stage::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Contacted => "CONTACTED",
            Self::Qualified => "QUALIFIED",
            Self::DocumentsRequested => "DOCUMENTS_REQUESTED",
            Self::DocumentsReceived => "DOCUMENTS_RECEIVED",
            Self::InProgress => "IN_PROGRESS",
            Self::Review => "REVIEW",
            Self::Filed => "FILED",
            Self::Complete => "COMPLETE",
        }
    }

    /// Human label used in notification emails and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Contacted => "Contacted",
            Self::Qualified => "Qualified",
            Self::DocumentsRequested => "Documents requested",
            Self::DocumentsReceived => "Documents received",
            Self::InProgress => "In progress",
            Self::Review => "Review",
            Self::Filed => "Filed",
            Self::Complete => "Complete",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}

/// One recorded pipeline transition. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageHistory {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub changed_by: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StageHistory {
    pub fn new(contact_id: Uuid, from_stage: Stage, to_stage: Stage, changed_by: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id,
            from_stage,
            to_stage,
            changed_by,
            reason: None,
            created_at: Utc::now(),
        }
    }
}

/// Request to move a contact to a new stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageUpdate {
    pub contact_id: Uuid,
    pub stage: Stage,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parse_accepts_loose_spelling() {
        assert_eq!("contacted".parse::<Stage>(), Ok(Stage::Contacted));
        assert_eq!("in-progress".parse::<Stage>(), Ok(Stage::InProgress));
        assert_eq!("Documents Requested".parse::<Stage>(), Ok(Stage::DocumentsRequested));
        assert!("archived".parse::<Stage>().is_err());
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::New < Stage::Contacted);
        assert!(Stage::Filed < Stage::Complete);
        assert_eq!(Stage::ALL.first(), Some(&Stage::New));
        assert_eq!(Stage::ALL.last(), Some(&Stage::Complete));
    }

    #[test]
    fn test_stage_serde_uses_screaming_case() {
        let json = serde_json::to_string(&Stage::DocumentsReceived).unwrap();
        assert_eq!(json, r#""DOCUMENTS_RECEIVED""#);
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>(), Ok(stage));
        }
    }
}
