use chrono::Utc;
use uuid::Uuid;

use super::access::{check_contact_access, require_admin, scope_filters, AccessContext};
use super::validation;
use super::ContactService;
use crate::db::ContactWrite;
use crate::error::{CrmError, Result};
use crate::models::*;
use crate::notify::NotificationEvent;

/// Result of `create_contact`: a new row, or an existing row updated by an upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Contact),
    Updated(Contact),
}

impl CreateOutcome {
    pub fn contact(&self) -> &Contact {
        match self {
            Self::Created(c) | Self::Updated(c) => c,
        }
    }

    pub fn into_contact(self) -> Contact {
        match self {
            Self::Created(c) | Self::Updated(c) => c,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

impl ContactService<'_> {
    /// Create a contact, or with `upsert` fold the input into the contact that already
    /// owns the email.
    pub fn create_contact(
        &self,
        mut input: NewContact,
        upsert: bool,
        ctx: &AccessContext,
    ) -> Result<CreateOutcome> {
        validation::prepare_new_contact(&mut input)?;

        // An upsert writes to an existing row, so the caller must be allowed to touch it
        if upsert {
            if let Some(existing) = self.db.find_contact_by_email(&input.email)? {
                if !existing.is_deleted() {
                    check_contact_access(&existing, ctx)?;
                }
            }
        }

        let write = self.db.create_or_merge_contact(&input, upsert)?;
        let id = write.contact().id;
        let contact = self.reload(id)?;

        match write {
            ContactWrite::Created(_) => {
                tracing::info!(contact_id = %id, user = ctx.user_id(), "contact created");
                self.notifier
                    .notify(self.db, NotificationEvent::ContactCreated { contact: &contact });
                Ok(CreateOutcome::Created(contact))
            }
            ContactWrite::Merged(_) => {
                tracing::info!(contact_id = %id, user = ctx.user_id(), "contact upserted");
                Ok(CreateOutcome::Updated(contact))
            }
        }
    }

    /// Contact with its recent activity. Not-found is checked before access.
    pub fn get_contact_by_id(&self, id: Uuid, ctx: &AccessContext) -> Result<ContactDetail> {
        let contact = self.load_contact(id, ctx)?;
        self.build_detail(contact)
    }

    fn build_detail(&self, contact: Contact) -> Result<ContactDetail> {
        let id = contact.id;
        let (tasks, open_tasks) = self.db.count_tasks(id)?;

        Ok(ContactDetail {
            recent_interactions: self.db.get_interactions_for_contact(id, DETAIL_RECENT_LIMIT)?,
            recent_stage_history: self.db.get_stage_history(id, DETAIL_RECENT_LIMIT)?,
            tags: self.db.get_tags_for_contact(id)?,
            open_tasks: self.db.get_tasks_for_contact(id, false)?,
            recent_email_activity: self.db.get_email_activity_for_contact(id, DETAIL_RECENT_LIMIT)?,
            counts: ContactCounts {
                interactions: self.db.count_interactions(id)?,
                stage_changes: self.db.count_stage_changes(id)?,
                tasks,
                open_tasks,
                emails_sent: self.db.count_emails_sent(id)?,
            },
            contact,
        })
    }

    /// Apply a partial update. An empty patch returns the contact unchanged.
    pub fn update_contact(
        &self,
        id: Uuid,
        mut patch: ContactPatch,
        ctx: &AccessContext,
    ) -> Result<Contact> {
        let contact = self.load_contact(id, ctx)?;
        if patch.is_empty() {
            return Ok(contact);
        }
        validation::prepare_patch(&mut patch)?;

        // Gate and lock are checked again against the row the write transaction sees
        let updated = self.db.modify_contact(id, |current| {
            check_contact_access(current, ctx)?;
            if let Some(rate) = patch.commission_rate {
                if current.is_commission_locked() && current.commission_rate != Some(rate) {
                    return Err(CrmError::invalid("commission_rate", "is locked and cannot be changed"));
                }
            }
            patch.apply_to(current);
            Ok(())
        })?;
        if updated.is_none() {
            return Err(CrmError::not_found("Contact", id));
        }
        tracing::info!(contact_id = %id, user = ctx.user_id(), "contact updated");

        self.reload(id)
    }

    /// Soft delete. Admin only.
    pub fn delete_contact(&self, id: Uuid, ctx: &AccessContext) -> Result<()> {
        require_admin(ctx)?;
        if !self.db.soft_delete_contact(id)? {
            return Err(CrmError::not_found("Contact", id));
        }
        tracing::info!(contact_id = %id, user = ctx.user_id(), "contact deleted");
        Ok(())
    }

    /// One page of contacts visible to the caller.
    pub fn list_contacts(
        &self,
        filters: ContactFilters,
        pagination: Pagination,
        ctx: &AccessContext,
    ) -> Result<ContactPage> {
        let mut filters = scope_filters(filters, ctx);
        filters.search = filters
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let (contacts, total) = self.db.list_contacts(&filters, pagination)?;
        Ok(ContactPage::new(contacts, total, pagination))
    }

    /// Hand a contact to a preparer. Admin only.
    pub fn assign_contact_to_preparer(
        &self,
        contact_id: Uuid,
        preparer_id: &str,
        ctx: &AccessContext,
    ) -> Result<Contact> {
        require_admin(ctx)?;
        let preparer_id = preparer_id.trim();
        if preparer_id.is_empty() {
            return Err(CrmError::invalid("preparer_id", "is required"));
        }

        if !self.db.assign_contact(contact_id, preparer_id, Utc::now())? {
            return Err(CrmError::not_found("Contact", contact_id));
        }
        let contact = self.reload(contact_id)?;
        tracing::info!(contact_id = %contact_id, preparer_id, user = ctx.user_id(), "contact assigned");

        self.notifier.notify(
            self.db,
            NotificationEvent::ContactAssigned { contact: &contact, preparer_id },
        );
        Ok(contact)
    }

    /// Set and lock the referral commission rate. Admin only; a locked rate stays locked.
    pub fn lock_commission_rate(
        &self,
        contact_id: Uuid,
        rate: f64,
        ctx: &AccessContext,
    ) -> Result<Contact> {
        require_admin(ctx)?;
        validation::validate_commission_rate(rate)?;

        let contact = self.load_contact(contact_id, ctx)?;
        if contact.is_commission_locked()
            || !self.db.lock_commission_rate(contact_id, rate, Utc::now())?
        {
            return Err(CrmError::invalid("commission_rate", "is already locked"));
        }
        tracing::info!(contact_id = %contact_id, rate, user = ctx.user_id(), "commission rate locked");

        self.reload(contact_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::notify::testing::RecordingDispatcher;
    use crate::notify::Notifier;

    fn admin() -> AccessContext {
        AccessContext::admin("admin-1")
    }

    fn input(first: &str, email: &str) -> NewContact {
        NewContact {
            first_name: first.into(),
            last_name: "Tester".into(),
            email: email.into(),
            ..Default::default()
        }
    }

    fn setup() -> (Database, RecordingDispatcher, Notifier) {
        let db = Database::open_memory().unwrap();
        let recorder = RecordingDispatcher::default();
        let notifier = recorder.notifier();
        (db, recorder, notifier)
    }

    #[test]
    fn test_create_normalises_and_notifies_operations() {
        let (db, recorder, notifier) = setup();
        let svc = ContactService::new(&db, &notifier);

        let outcome = svc.create_contact(input("Ann", " Ann@X.com "), false, &admin()).unwrap();
        assert!(outcome.was_created());
        let contact = outcome.into_contact();
        assert_eq!(contact.email, "ann@x.com");
        assert_eq!(contact.stage, Stage::New);
        assert_eq!(contact.stage_entered_at, contact.created_at);

        let sent = recorder.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ops@firm.test");
    }

    #[test]
    fn test_duplicate_without_upsert_is_validation_error() {
        let (db, recorder, notifier) = setup();
        let svc = ContactService::new(&db, &notifier);

        svc.create_contact(input("Ann", "dup@x.com"), false, &admin()).unwrap();
        let err = svc
            .create_contact(input("Other", "DUP@x.com"), false, &admin())
            .unwrap_err();
        assert_eq!(err.fields().unwrap()[0].field, "email");
        assert_eq!(db.count_contacts_with_email("dup@x.com").unwrap(), 1);
        assert_eq!(recorder.sent().len(), 1);
    }

    #[test]
    fn test_upsert_updates_existing_without_notifying() {
        let (db, recorder, notifier) = setup();
        let svc = ContactService::new(&db, &notifier);

        let first = svc.create_contact(input("Ann", "dup@x.com"), false, &admin()).unwrap();
        let mut again = input("Annie", "dup@x.com");
        again.phone = Some("555-0101".into());
        let second = svc.create_contact(again, true, &admin()).unwrap();

        assert!(!second.was_created());
        assert_eq!(second.contact().id, first.contact().id);
        assert_eq!(second.contact().first_name, "Annie");
        assert_eq!(second.contact().phone.as_deref(), Some("555-0101"));
        assert_eq!(recorder.sent().len(), 1);
    }

    #[test]
    fn test_upsert_into_unassigned_contact_is_denied_for_preparer() {
        let (db, _recorder, notifier) = setup();
        let svc = ContactService::new(&db, &notifier);
        svc.create_contact(input("Ann", "ann@x.com"), false, &admin()).unwrap();

        let preparer = AccessContext::tax_preparer("u-p1", "p1");
        let err = svc.create_contact(input("Ann", "ann@x.com"), true, &preparer).unwrap_err();
        assert!(matches!(err, CrmError::AccessDenied));
    }

    #[test]
    fn test_get_contact_not_found_before_access() {
        let (db, _recorder, notifier) = setup();
        let svc = ContactService::new(&db, &notifier);
        let preparer = AccessContext::tax_preparer("u-p1", "p1");

        let err = svc.get_contact_by_id(Uuid::new_v4(), &preparer).unwrap_err();
        assert!(matches!(err, CrmError::NotFound { .. }));

        let id = svc
            .create_contact(input("Ann", "ann@x.com"), false, &admin())
            .unwrap()
            .contact()
            .id;
        let err = svc.get_contact_by_id(id, &preparer).unwrap_err();
        assert!(matches!(err, CrmError::AccessDenied));
        assert!(!err.to_string().contains("ann@x.com"));
    }

    #[test]
    fn test_update_contact_patch_and_email_uniqueness() {
        let (db, _recorder, notifier) = setup();
        let svc = ContactService::new(&db, &notifier);
        let a = svc.create_contact(input("A", "a@x.com"), false, &admin()).unwrap().into_contact();
        svc.create_contact(input("B", "b@x.com"), false, &admin()).unwrap();

        let updated = svc
            .update_contact(
                a.id,
                ContactPatch { company: Some("Acme".into()), ..Default::default() },
                &admin(),
            )
            .unwrap();
        assert_eq!(updated.company.as_deref(), Some("Acme"));
        assert!(updated.updated_at >= a.updated_at);

        let err = svc
            .update_contact(
                a.id,
                ContactPatch { email: Some("B@x.com".into()), ..Default::default() },
                &admin(),
            )
            .unwrap_err();
        assert_eq!(err.fields().unwrap()[0].field, "email");

        let unchanged = svc.update_contact(a.id, ContactPatch::default(), &admin()).unwrap();
        assert_eq!(unchanged, updated);
    }

    #[test]
    fn test_locked_commission_rate_cannot_change() {
        let (db, _recorder, notifier) = setup();
        let svc = ContactService::new(&db, &notifier);
        let c = svc.create_contact(input("A", "a@x.com"), false, &admin()).unwrap().into_contact();

        let locked = svc.lock_commission_rate(c.id, 0.15, &admin()).unwrap();
        assert_eq!(locked.commission_rate, Some(0.15));
        assert!(locked.is_commission_locked());

        assert!(svc.lock_commission_rate(c.id, 0.2, &admin()).is_err());
        let err = svc
            .update_contact(
                c.id,
                ContactPatch { commission_rate: Some(0.3), ..Default::default() },
                &admin(),
            )
            .unwrap_err();
        assert!(matches!(err, CrmError::Validation(_)));

        let preparer = AccessContext::tax_preparer("u", "p1");
        assert!(matches!(
            svc.lock_commission_rate(c.id, 0.1, &preparer),
            Err(CrmError::AccessDenied)
        ));
    }

    #[test]
    fn test_delete_is_admin_only_and_hides_contact() {
        let (db, _recorder, notifier) = setup();
        let svc = ContactService::new(&db, &notifier);
        let c = svc.create_contact(input("A", "a@x.com"), false, &admin()).unwrap().into_contact();

        let client = AccessContext::resolve("u-c", crate::crm::UserRole::Client, None).unwrap();
        assert!(matches!(svc.delete_contact(c.id, &client), Err(CrmError::AccessDenied)));

        svc.delete_contact(c.id, &admin()).unwrap();
        assert!(matches!(
            svc.get_contact_by_id(c.id, &admin()),
            Err(CrmError::NotFound { .. })
        ));
        assert!(matches!(svc.delete_contact(c.id, &admin()), Err(CrmError::NotFound { .. })));

        let page = svc
            .list_contacts(ContactFilters::default(), Pagination::default(), &admin())
            .unwrap();
        assert_eq!(page.total, 0);

        // Email stays reserved; an upsert brings the contact back
        assert!(svc.create_contact(input("A", "a@x.com"), false, &admin()).is_err());
        let restored = svc.create_contact(input("A", "a@x.com"), true, &admin()).unwrap();
        assert_eq!(restored.contact().id, c.id);
        assert!(!restored.contact().is_deleted());
    }

    #[test]
    fn test_assign_notifies_preparer_contact() {
        let (db, recorder, notifier) = setup();
        let svc = ContactService::new(&db, &notifier);

        let mut prep = input("Pat", "pat@firm.test");
        prep.contact_type = ContactType::Preparer;
        prep.user_id = Some("p1".into());
        svc.create_contact(prep, false, &admin()).unwrap();
        let lead = svc.create_contact(input("Lee", "lee@x.com"), false, &admin()).unwrap().into_contact();

        let assigned = svc.assign_contact_to_preparer(lead.id, "p1", &admin()).unwrap();
        assert_eq!(assigned.assigned_preparer_id.as_deref(), Some("p1"));
        assert!(assigned.assigned_at.is_some());

        let last = recorder.sent().pop().unwrap();
        assert_eq!(last.to, "pat@firm.test");

        let preparer = AccessContext::tax_preparer("u-p1", "p1");
        assert!(svc.get_contact_by_id(lead.id, &preparer).is_ok());
        assert!(matches!(
            svc.assign_contact_to_preparer(lead.id, "p2", &preparer),
            Err(CrmError::AccessDenied)
        ));
        assert!(matches!(
            svc.assign_contact_to_preparer(Uuid::new_v4(), "p1", &admin()),
            Err(CrmError::NotFound { .. })
        ));
    }

    #[test]
    fn test_contact_detail_collects_activity() {
        let (db, _recorder, notifier) = setup();
        let svc = ContactService::new(&db, &notifier);
        let c = svc.create_contact(input("A", "a@x.com"), false, &admin()).unwrap().into_contact();

        let detail = svc.get_contact_by_id(c.id, &admin()).unwrap();
        assert_eq!(detail.contact.id, c.id);
        assert_eq!(detail.counts.emails_sent, 1);
        assert_eq!(detail.recent_email_activity[0].event, "contact.created");
        assert!(detail.recent_interactions.is_empty());
    }
}
