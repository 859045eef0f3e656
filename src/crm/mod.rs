//! CRM service layer.
//!
//! Every operation on a specific contact loads it first and passes it through the access
//! gate before any write. Notifications go out after the write has committed.

pub mod access;
mod contacts;
mod interactions;
mod stages;
mod tags;
mod tasks;
pub mod validation;

use uuid::Uuid;

use crate::db::Database;
use crate::error::{CrmError, Result};
use crate::models::Contact;
use crate::notify::Notifier;

pub use access::{check_contact_access, require_admin, scope_filters, AccessContext, UserRole};
pub use contacts::CreateOutcome;

/// Default and upper bound for log reads (interactions, stage history).
pub const DEFAULT_LOG_LIMIT: u32 = 50;
pub const MAX_LOG_LIMIT: u32 = 500;

pub(crate) fn clamp_log_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT)
}

/// Contact operations bound to one database connection and one notifier.
pub struct ContactService<'a> {
    db: &'a Database,
    notifier: &'a Notifier,
}

impl<'a> ContactService<'a> {
    pub fn new(db: &'a Database, notifier: &'a Notifier) -> Self {
        Self { db, notifier }
    }

    /// Load a live contact and run the access gate. Not-found is decided before access.
    fn load_contact(&self, id: Uuid, ctx: &AccessContext) -> Result<Contact> {
        let contact = self
            .db
            .get_contact(id)?
            .ok_or_else(|| CrmError::not_found("Contact", id))?;
        if let Err(e) = check_contact_access(&contact, ctx) {
            tracing::info!(user = ctx.user_id(), role = %ctx.role(), "contact access denied");
            return Err(e);
        }
        Ok(contact)
    }

    /// Re-read a contact after a write so callers see exactly what was stored.
    fn reload(&self, id: Uuid) -> Result<Contact> {
        self.db
            .get_contact(id)?
            .ok_or_else(|| CrmError::not_found("Contact", id))
    }
}
