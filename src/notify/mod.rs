//! Post-commit email notifications.
//!
//! Delivery is best-effort: the notifier makes exactly one send attempt per event, logs
//! failures and records the attempt, but never fails the operation that triggered it.

mod api;
mod smtp;
pub mod templates;
#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;
use uuid::Uuid;

use crate::db::Database;
use crate::models::{Contact, EmailActivity, StageHistory};

pub use api::ApiDispatcher;
pub use smtp::{SmtpDispatcher, SmtpSettings};

/// One rendered email ready for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// An email provider. Returns the provider's message id on success.
pub trait EmailDispatcher {
    fn send(&self, email: &OutboundEmail) -> Result<String, NotificationError>;

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}

/// Dispatcher used when email is switched off. Logs and pretends to deliver.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledDispatcher;

impl EmailDispatcher for DisabledDispatcher {
    fn send(&self, email: &OutboundEmail) -> Result<String, NotificationError> {
        tracing::debug!(to = %email.to, subject = %email.subject, "email disabled, not sending");
        Ok(format!("disabled-{}", Uuid::new_v4()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// A state change worth telling someone about.
#[derive(Debug, Clone, Copy)]
pub enum NotificationEvent<'a> {
    ContactCreated {
        contact: &'a Contact,
    },
    ContactAssigned {
        contact: &'a Contact,
        preparer_id: &'a str,
    },
    StageChanged {
        contact: &'a Contact,
        change: &'a StageHistory,
    },
}

impl NotificationEvent<'_> {
    /// Stable event key, stored on the activity row.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ContactCreated { .. } => "contact.created",
            Self::ContactAssigned { .. } => "contact.assigned",
            Self::StageChanged { .. } => "stage.changed",
        }
    }

    pub fn contact(&self) -> &Contact {
        match self {
            Self::ContactCreated { contact }
            | Self::ContactAssigned { contact, .. }
            | Self::StageChanged { contact, .. } => *contact,
        }
    }
}

/// Renders events, sends them through a dispatcher and records each attempt.
pub struct Notifier {
    dispatcher: Box<dyn EmailDispatcher>,
    from: String,
    operations_inbox: String,
}

impl Notifier {
    pub fn new(
        dispatcher: Box<dyn EmailDispatcher>,
        from: impl Into<String>,
        operations_inbox: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            from: from.into(),
            operations_inbox: operations_inbox.into(),
        }
    }

    /// Notifier that never sends anything.
    pub fn disabled() -> Self {
        Self::new(
            Box::new(DisabledDispatcher),
            "noreply@localhost",
            "operations@localhost",
        )
    }

    pub fn operations_inbox(&self) -> &str {
        &self.operations_inbox
    }

    /// Send the email for `event` once and record the attempt.
    ///
    /// Never returns an error. The returned activity row describes what happened.
    pub fn notify(&self, db: &Database, event: NotificationEvent<'_>) -> EmailActivity {
        let recipient = self.recipient_for(db, &event);
        let rendered = templates::render(&event);
        let email = OutboundEmail {
            from: self.from.clone(),
            to: recipient,
            subject: rendered.subject,
            html: rendered.html,
        };
        let contact_id = Some(event.contact().id);

        let activity = match self.dispatcher.send(&email) {
            Ok(message_id) => {
                tracing::info!(
                    event = event.key(),
                    to = %email.to,
                    provider = self.dispatcher.name(),
                    %message_id,
                    "notification sent"
                );
                EmailActivity::sent(contact_id, event.key(), &email.to, &email.subject, message_id)
            }
            Err(e) => {
                tracing::warn!(
                    event = event.key(),
                    to = %email.to,
                    provider = self.dispatcher.name(),
                    error = %e,
                    "notification failed"
                );
                EmailActivity::failed(contact_id, event.key(), &email.to, &email.subject, e.to_string())
            }
        };

        if let Err(e) = db.insert_email_activity(&activity) {
            tracing::warn!(event = event.key(), error = %e, "failed to record email activity");
        }

        activity
    }

    /// Assignment emails go to the preparer's own contact record when one exists.
    fn recipient_for(&self, db: &Database, event: &NotificationEvent<'_>) -> String {
        if let NotificationEvent::ContactAssigned { preparer_id, .. } = event {
            match db.find_preparer_contact(preparer_id) {
                Ok(Some(preparer)) => return preparer.email,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(preparer_id, error = %e, "preparer lookup failed, using operations inbox");
                }
            }
        }
        self.operations_inbox.clone()
    }
}
