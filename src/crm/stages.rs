use uuid::Uuid;

use super::access::AccessContext;
use super::{clamp_log_limit, validation, ContactService};
use crate::error::Result;
use crate::models::{Contact, StageHistory, StageUpdate};
use crate::notify::NotificationEvent;

impl ContactService<'_> {
    /// Move a contact to a new stage. The stage write and its history row commit together;
    /// a same-stage update is still recorded.
    pub fn update_contact_stage(&self, update: StageUpdate, ctx: &AccessContext) -> Result<Contact> {
        self.load_contact(update.contact_id, ctx)?;

        let change = self.db.apply_stage_change(
            update.contact_id,
            update.stage,
            ctx.user_id(),
            validation::clean_reason(update.reason),
        )?;
        let contact = self.reload(update.contact_id)?;
        tracing::info!(
            contact_id = %update.contact_id,
            from = change.from_stage.as_str(),
            to = change.to_stage.as_str(),
            user = ctx.user_id(),
            "stage changed"
        );

        self.notifier.notify(
            self.db,
            NotificationEvent::StageChanged { contact: &contact, change: &change },
        );
        Ok(contact)
    }

    /// Most recent transitions first.
    pub fn get_contact_stage_history(
        &self,
        contact_id: Uuid,
        ctx: &AccessContext,
        limit: Option<u32>,
    ) -> Result<Vec<StageHistory>> {
        self.load_contact(contact_id, ctx)?;
        self.db.get_stage_history(contact_id, clamp_log_limit(limit))
    }
}
