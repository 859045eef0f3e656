use uuid::Uuid;

use super::access::AccessContext;
use super::{validation, ContactService};
use crate::error::{CrmError, Result};
use crate::models::Tag;

impl ContactService<'_> {
    /// Attach a tag by name, creating the tag on first use. Returns the contact's tags.
    pub fn tag_contact(&self, contact_id: Uuid, name: &str, ctx: &AccessContext) -> Result<Vec<Tag>> {
        self.load_contact(contact_id, ctx)?;
        let name = validation::clean_tag_name(name)?;

        let tag = self.db.get_or_create_tag(&name)?;
        if self.db.add_tag_to_contact(contact_id, tag.id)? {
            tracing::debug!(contact_id = %contact_id, tag = %tag.name, "tag added");
        }
        self.db.get_tags_for_contact(contact_id)
    }

    /// Detach a tag by name. Returns the contact's remaining tags.
    pub fn untag_contact(&self, contact_id: Uuid, name: &str, ctx: &AccessContext) -> Result<Vec<Tag>> {
        self.load_contact(contact_id, ctx)?;
        let name = validation::clean_tag_name(name)?;

        if !self.db.remove_tag_from_contact(contact_id, &name)? {
            return Err(CrmError::not_found("Tag", name));
        }
        self.db.get_tags_for_contact(contact_id)
    }
}
