//! Subject lines and minimal HTML bodies for notification events.

use super::NotificationEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

pub fn render(event: &NotificationEvent<'_>) -> RenderedEmail {
    let contact = event.contact();
    let name = contact.full_name();

    match event {
        NotificationEvent::ContactCreated { .. } => RenderedEmail {
            subject: format!("New {} contact: {}", contact.contact_type.as_str().to_lowercase(), name),
            html: page(&[
                format!("<p>A new contact was added: <strong>{}</strong>.</p>", escape_html(&name)),
                detail_list(&[
                    ("Email", Some(contact.email.as_str())),
                    ("Phone", contact.phone.as_deref()),
                    ("Company", contact.company.as_deref()),
                    ("Referred by", contact.referrer_username.as_deref()),
                ]),
            ]),
        },
        NotificationEvent::ContactAssigned { .. } => RenderedEmail {
            subject: format!("Contact assigned to you: {}", name),
            html: page(&[
                format!(
                    "<p><strong>{}</strong> has been assigned to you.</p>",
                    escape_html(&name)
                ),
                detail_list(&[
                    ("Email", Some(contact.email.as_str())),
                    ("Phone", contact.phone.as_deref()),
                    ("Stage", Some(contact.stage.label())),
                ]),
            ]),
        },
        NotificationEvent::StageChanged { change, .. } => RenderedEmail {
            subject: format!("{} moved to {}", name, change.to_stage.label()),
            html: page(&[
                format!(
                    "<p><strong>{}</strong> moved from {} to {}.</p>",
                    escape_html(&name),
                    change.from_stage.label(),
                    change.to_stage.label()
                ),
                detail_list(&[
                    ("Changed by", Some(change.changed_by.as_str())),
                    ("Reason", change.reason.as_deref()),
                ]),
            ]),
        },
    }
}

fn page(parts: &[String]) -> String {
    format!("<html><body>{}</body></html>", parts.concat())
}

/// `<ul>` of label/value pairs, skipping missing values.
fn detail_list(rows: &[(&str, Option<&str>)]) -> String {
    let items: String = rows
        .iter()
        .filter_map(|(label, value)| {
            value.map(|v| format!("<li>{}: {}</li>", label, escape_html(v)))
        })
        .collect();
    if items.is_empty() {
        String::new()
    } else {
        format!("<ul>{}</ul>", items)
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, Stage, StageHistory};

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_user_content_is_escaped() {
        let mut contact = Contact::new("<script>".into(), "X".into(), "x@x.com".into());
        contact.company = Some("A & B".into());
        let email = render(&NotificationEvent::ContactCreated { contact: &contact });
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
        assert!(email.html.contains("A &amp; B"));
        assert!(!email.html.contains("Phone"));
    }

    #[test]
    fn test_stage_change_subject() {
        let contact = Contact::new("Dana".into(), "Cruz".into(), "d@x.com".into());
        let mut change = StageHistory::new(contact.id, Stage::Qualified, Stage::DocumentsRequested, "u1".into());
        change.reason = Some("engagement signed".into());
        let email = render(&NotificationEvent::StageChanged { contact: &contact, change: &change });
        assert_eq!(email.subject, format!("Dana Cruz moved to {}", Stage::DocumentsRequested.label()));
        assert!(email.html.contains("engagement signed"));
    }
}
