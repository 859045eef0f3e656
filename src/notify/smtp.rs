//! SMTP delivery through lettre.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use uuid::Uuid;

use super::{EmailDispatcher, NotificationError, OutboundEmail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// STARTTLS on a plain port. When false the connection uses implicit TLS.
    pub starttls: bool,
}

/// Sends through an SMTP relay. The transport is async, so the dispatcher owns a small
/// current-thread runtime and blocks on each send.
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    runtime: tokio::runtime::Runtime,
    message_domain: String,
}

impl SmtpDispatcher {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotificationError> {
        let builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        }
        .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let mut builder = builder.port(settings.port);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| NotificationError::Transport(format!("failed to start runtime: {}", e)))?;

        Ok(Self {
            transport: builder.build(),
            runtime,
            message_domain: settings.host.clone(),
        })
    }

    fn build_message(&self, email: &OutboundEmail, message_id: &str) -> Result<Message, NotificationError> {
        Message::builder()
            .from(parse_mailbox(&email.from)?)
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone())
            .message_id(Some(message_id.to_string()))
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| NotificationError::Message(e.to_string()))
    }
}

impl EmailDispatcher for SmtpDispatcher {
    fn send(&self, email: &OutboundEmail) -> Result<String, NotificationError> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.message_domain);
        let message = self.build_message(email, &message_id)?;

        self.runtime
            .block_on(self.transport.send(message))
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(message_id)
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse::<Mailbox>()
        .map_err(|_| NotificationError::InvalidAddress(address.to_string()))
}
