use uuid::Uuid;

use super::access::AccessContext;
use super::{clamp_log_limit, validation, ContactService};
use crate::error::Result;
use crate::models::{Interaction, NewInteraction};

impl ContactService<'_> {
    /// Append to a contact's interaction log and bump its `last_contacted_at`.
    pub fn log_interaction(&self, mut input: NewInteraction, ctx: &AccessContext) -> Result<Interaction> {
        self.load_contact(input.contact_id, ctx)?;
        validation::prepare_interaction(&mut input)?;

        let interaction = input.into_interaction(Some(ctx.user_id().to_string()));
        self.db.record_interaction(&interaction)?;
        tracing::info!(
            contact_id = %interaction.contact_id,
            kind = interaction.interaction_type.as_str(),
            user = ctx.user_id(),
            "interaction logged"
        );

        Ok(interaction)
    }

    /// Most recent interactions first. `limit` defaults to 50 and is capped at 500.
    pub fn get_contact_interactions(
        &self,
        contact_id: Uuid,
        ctx: &AccessContext,
        limit: Option<u32>,
    ) -> Result<Vec<Interaction>> {
        self.load_contact(contact_id, ctx)?;
        self.db
            .get_interactions_for_contact(contact_id, clamp_log_limit(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::CrmError;
    use crate::models::{InteractionType, NewContact};
    use crate::notify::Notifier;
    use chrono::{Duration, Utc};

    fn seeded(db: &Database) -> Uuid {
        let svc_notifier = Notifier::disabled();
        let svc = ContactService::new(db, &svc_notifier);
        svc.create_contact(
            NewContact {
                first_name: "Ivy".into(),
                last_name: "Lee".into(),
                email: "ivy@x.com".into(),
                ..Default::default()
            },
            false,
            &AccessContext::admin("a1"),
        )
        .unwrap()
        .contact()
        .id
    }

    #[test]
    fn test_log_interaction_updates_last_contacted() {
        let db = Database::open_memory().unwrap();
        let id = seeded(&db);
        let notifier = Notifier::disabled();
        let svc = ContactService::new(&db, &notifier);
        let ctx = AccessContext::admin("a1");

        let before = Utc::now();
        let logged = svc
            .log_interaction(NewInteraction::note(id, "Left voicemail"), &ctx)
            .unwrap();
        assert_eq!(logged.created_by.as_deref(), Some("a1"));

        let contact = db.get_contact(id).unwrap().unwrap();
        let last = contact.last_contacted_at.unwrap();
        assert!(last >= before - Duration::milliseconds(1));
        assert!(last >= logged.occurred_at - Duration::microseconds(1));
    }

    #[test]
    fn test_last_contacted_never_moves_backwards_for_backdated_entries() {
        let db = Database::open_memory().unwrap();
        let id = seeded(&db);
        let notifier = Notifier::disabled();
        let svc = ContactService::new(&db, &notifier);
        let ctx = AccessContext::admin("a1");

        svc.log_interaction(NewInteraction::note(id, "today"), &ctx).unwrap();
        let first = db.get_contact(id).unwrap().unwrap().last_contacted_at.unwrap();

        let mut backdated = NewInteraction::note(id, "last week");
        backdated.occurred_at = Some(Utc::now() - Duration::days(7));
        svc.log_interaction(backdated, &ctx).unwrap();
        let second = db.get_contact(id).unwrap().unwrap().last_contacted_at.unwrap();
        assert!(second >= first);

        let history = svc.get_contact_interactions(id, &ctx, None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].body.as_deref(), Some("today"));
    }

    #[test]
    fn test_interaction_validation_and_gate() {
        let db = Database::open_memory().unwrap();
        let id = seeded(&db);
        let notifier = Notifier::disabled();
        let svc = ContactService::new(&db, &notifier);

        let empty = NewInteraction {
            contact_id: id,
            interaction_type: InteractionType::Call,
            ..Default::default()
        };
        assert!(matches!(
            svc.log_interaction(empty, &AccessContext::admin("a1")),
            Err(CrmError::Validation(_))
        ));

        let preparer = AccessContext::tax_preparer("u", "p1");
        assert!(matches!(
            svc.log_interaction(NewInteraction::note(id, "hi"), &preparer),
            Err(CrmError::AccessDenied)
        ));
        assert!(matches!(
            svc.get_contact_interactions(id, &preparer, None),
            Err(CrmError::AccessDenied)
        ));
        assert_eq!(db.count_interactions(id).unwrap(), 0);
    }

    #[test]
    fn test_interaction_limit_is_clamped() {
        let db = Database::open_memory().unwrap();
        let id = seeded(&db);
        let notifier = Notifier::disabled();
        let svc = ContactService::new(&db, &notifier);
        let ctx = AccessContext::admin("a1");

        for i in 0..3 {
            svc.log_interaction(NewInteraction::note(id, format!("n{}", i)), &ctx).unwrap();
        }
        assert_eq!(svc.get_contact_interactions(id, &ctx, Some(0)).unwrap().len(), 1);
        assert_eq!(svc.get_contact_interactions(id, &ctx, Some(2)).unwrap().len(), 2);
    }
}
