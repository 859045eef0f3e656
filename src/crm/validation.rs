//! Input normalisation and field checks shared by the service operations.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{CrmError, FieldError, Result};
use crate::models::{ContactPatch, NewContact, NewInteraction, NewTask};

const MAX_NAME_LEN: usize = 100;
const MAX_TAG_LEN: usize = 50;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
    })
}

/// Lowercase and trim an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Trim, and turn an empty string into `None`.
fn clean_opt(value: &mut Option<String>) {
    if let Some(v) = value.take() {
        let trimmed = v.trim();
        if !trimmed.is_empty() {
            *value = Some(trimmed.to_string());
        }
    }
}

/// Collects field errors so a caller sees every problem at once.
#[derive(Default)]
struct Checks(Vec<FieldError>);

impl Checks {
    fn fail(&mut self, field: &str, message: &str) {
        self.0.push(FieldError::new(field, message));
    }

    fn required_name(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.fail(field, "is required");
        } else if value.chars().count() > MAX_NAME_LEN {
            self.fail(field, "is too long");
        }
    }

    fn email(&mut self, value: &str) {
        if value.is_empty() {
            self.fail("email", "is required");
        } else if !is_valid_email(value) {
            self.fail("email", "is not a valid email address");
        }
    }

    fn confidence(&mut self, value: Option<u8>) {
        if value.is_some_and(|c| c > 100) {
            self.fail("attribution_confidence", "must be between 0 and 100");
        }
    }

    fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(CrmError::Validation(self.0))
        }
    }
}

pub fn validate_commission_rate(rate: f64) -> Result<()> {
    if rate.is_finite() && (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(CrmError::invalid("commission_rate", "must be between 0 and 1"))
    }
}

/// Normalise a create input in place and check required fields.
pub fn prepare_new_contact(input: &mut NewContact) -> Result<()> {
    input.first_name = input.first_name.trim().to_string();
    input.last_name = input.last_name.trim().to_string();
    input.email = normalize_email(&input.email);
    clean_opt(&mut input.phone);
    clean_opt(&mut input.company);
    clean_opt(&mut input.user_id);
    clean_opt(&mut input.identity_provider_id);
    clean_opt(&mut input.referrer_username);
    clean_opt(&mut input.referrer_type);
    clean_opt(&mut input.attribution_method);

    let mut checks = Checks::default();
    checks.required_name("first_name", &input.first_name);
    checks.required_name("last_name", &input.last_name);
    checks.email(&input.email);
    checks.confidence(input.attribution_confidence);
    checks.into_result()
}

/// Normalise a patch in place. Present fields must be valid; absent fields are untouched.
pub fn prepare_patch(patch: &mut ContactPatch) -> Result<()> {
    let mut checks = Checks::default();

    if let Some(first) = patch.first_name.as_mut() {
        *first = first.trim().to_string();
        checks.required_name("first_name", first);
    }
    if let Some(last) = patch.last_name.as_mut() {
        *last = last.trim().to_string();
        checks.required_name("last_name", last);
    }
    if let Some(email) = patch.email.as_mut() {
        *email = normalize_email(email);
        checks.email(email);
    }
    clean_opt(&mut patch.phone);
    clean_opt(&mut patch.company);
    clean_opt(&mut patch.user_id);
    clean_opt(&mut patch.identity_provider_id);
    clean_opt(&mut patch.referrer_username);
    clean_opt(&mut patch.referrer_type);
    clean_opt(&mut patch.attribution_method);
    checks.confidence(patch.attribution_confidence);
    if let Some(rate) = patch.commission_rate {
        if let Err(CrmError::Validation(errors)) = validate_commission_rate(rate) {
            checks.0.extend(errors);
        }
    }

    checks.into_result()
}

/// An interaction needs a subject or a body.
pub fn prepare_interaction(input: &mut NewInteraction) -> Result<()> {
    clean_opt(&mut input.subject);
    clean_opt(&mut input.body);
    input.attachments.retain(|a| !a.trim().is_empty());

    if input.subject.is_none() && input.body.is_none() {
        return Err(CrmError::Validation(vec![
            FieldError::new("subject", "subject or body is required"),
            FieldError::new("body", "subject or body is required"),
        ]));
    }
    Ok(())
}

pub fn prepare_task(input: &mut NewTask) -> Result<()> {
    input.title = input.title.trim().to_string();
    clean_opt(&mut input.description);
    clean_opt(&mut input.assigned_to);

    if input.title.is_empty() {
        return Err(CrmError::invalid("title", "is required"));
    }
    Ok(())
}

pub fn clean_tag_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CrmError::invalid("name", "is required"));
    }
    if name.chars().count() > MAX_TAG_LEN {
        return Err(CrmError::invalid("name", "is too long"));
    }
    Ok(name.to_string())
}

pub fn clean_reason(reason: Option<String>) -> Option<String> {
    let mut reason = reason;
    clean_opt(&mut reason);
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn fields(err: CrmError) -> Vec<String> {
        err.fields()
            .unwrap_or_default()
            .iter()
            .map(|f| f.field.clone())
            .collect()
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no-at.com"));
        assert!(!is_valid_email("two words@x.com"));
    }

    #[test]
    fn test_new_contact_is_normalised() {
        let mut input = NewContact {
            first_name: "  Ada ".into(),
            last_name: "Lovelace".into(),
            email: "  Ada@Example.COM ".into(),
            phone: Some("   ".into()),
            ..Default::default()
        };
        prepare_new_contact(&mut input).unwrap();
        assert_eq!(input.first_name, "Ada");
        assert_eq!(input.email, "ada@example.com");
        assert_eq!(input.phone, None);
    }

    #[test]
    fn test_new_contact_reports_every_missing_field() {
        let mut input = NewContact {
            attribution_confidence: Some(120),
            ..Default::default()
        };
        let err = prepare_new_contact(&mut input).unwrap_err();
        assert_eq!(
            fields(err),
            vec!["first_name", "last_name", "email", "attribution_confidence"]
        );
    }

    #[test]
    fn test_patch_checks_only_present_fields() {
        let mut patch = ContactPatch {
            company: Some(" Acme ".into()),
            ..Default::default()
        };
        prepare_patch(&mut patch).unwrap();
        assert_eq!(patch.company.as_deref(), Some("Acme"));

        let mut bad = ContactPatch {
            first_name: Some(" ".into()),
            email: Some("nope".into()),
            commission_rate: Some(1.5),
            ..Default::default()
        };
        let err = prepare_patch(&mut bad).unwrap_err();
        assert_eq!(fields(err), vec!["first_name", "email", "commission_rate"]);
    }

    #[test]
    fn test_commission_rate_bounds() {
        assert!(validate_commission_rate(0.0).is_ok());
        assert!(validate_commission_rate(1.0).is_ok());
        assert!(validate_commission_rate(-0.1).is_err());
        assert!(validate_commission_rate(f64::NAN).is_err());
    }

    #[test]
    fn test_interaction_needs_subject_or_body() {
        let mut empty = NewInteraction {
            contact_id: Uuid::new_v4(),
            subject: Some("  ".into()),
            ..Default::default()
        };
        assert!(prepare_interaction(&mut empty).is_err());

        let mut note = NewInteraction::note(Uuid::new_v4(), "called back");
        note.attachments = vec!["".into(), "s3://docs/w2.pdf".into()];
        prepare_interaction(&mut note).unwrap();
        assert_eq!(note.attachments, vec!["s3://docs/w2.pdf".to_string()]);
    }

    #[test]
    fn test_tag_name() {
        assert_eq!(clean_tag_name("  VIP ").unwrap(), "VIP");
        assert!(clean_tag_name("").is_err());
        assert!(clean_tag_name(&"x".repeat(51)).is_err());
    }
}
