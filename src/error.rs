//! Error types shared by the store, the service layer and the API server.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrmError>;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CrmError {
    /// Malformed or missing input. Never retried.
    #[error("Validation failed: {}", describe_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Rejected by the access gate. Carries no detail about the resource.
    #[error("Access denied")]
    AccessDenied,

    /// The caller's identity is internally inconsistent. A server-side defect.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CrmError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// HTTP status equivalent used by the API server.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::AccessDenied => 403,
            Self::Configuration(_) | Self::Database(_) | Self::Serialization(_) => 500,
        }
    }

    pub fn fields(&self) -> Option<&[FieldError]> {
        match self {
            Self::Validation(fields) => Some(fields),
            _ => None,
        }
    }
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_fields() {
        let err = CrmError::Validation(vec![
            FieldError::new("email", "is required"),
            FieldError::new("first_name", "is required"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: email: is required; first_name: is required"
        );
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.fields().unwrap().len(), 2);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(CrmError::not_found("Contact", "abc").status_code(), 404);
        assert_eq!(CrmError::AccessDenied.status_code(), 403);
        assert_eq!(CrmError::Configuration("x".into()).status_code(), 500);
        assert!(CrmError::AccessDenied.fields().is_none());
    }

    #[test]
    fn test_access_denied_does_not_leak_detail() {
        assert_eq!(CrmError::AccessDenied.to_string(), "Access denied");
    }
}
