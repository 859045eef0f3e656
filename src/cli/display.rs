use chrono::{DateTime, Local, Utc};

use crate::models::{Contact, ContactDetail, ContactPage, Interaction, StageHistory};

/// Print one page of contacts as a table.
pub fn print_contact_page(page: &ContactPage) {
    if page.contacts.is_empty() {
        println!("No contacts found.");
        return;
    }

    println!(
        "{:<36}  {:<24} {:<28} {:<10} {:<20}",
        "ID", "NAME", "EMAIL", "TYPE", "STAGE"
    );
    for contact in &page.contacts {
        println!(
            "{:<36}  {:<24} {:<28} {:<10} {:<20}",
            contact.id,
            truncate(&contact.full_name(), 24),
            truncate(&contact.email, 28),
            contact.contact_type.as_str(),
            contact.stage.label(),
        );
    }
    println!(
        "\nPage {} of {} ({} contacts)",
        page.page,
        page.total_pages.max(1),
        page.total
    );
}

/// Print a full contact detail, skipping empty fields.
pub fn print_contact_detail(detail: &ContactDetail) {
    let contact = &detail.contact;
    println!("{}\n", contact.full_name());

    print_contact_fields(contact);

    if !detail.tags.is_empty() {
        let names: Vec<&str> = detail.tags.iter().map(|t| t.name.as_str()).collect();
        println!("  Tags: {}", names.join(", "));
    }

    let counts = &detail.counts;
    println!(
        "\n  {} interactions, {} stage changes, {} open tasks, {} emails sent",
        counts.interactions, counts.stage_changes, counts.open_tasks, counts.emails_sent
    );

    if let Some(last) = detail.last_interaction() {
        println!("\n  Last: {}", interaction_line(last));
    }

    if !detail.open_tasks.is_empty() {
        println!("\n  Open tasks:");
        for task in &detail.open_tasks {
            match task.due_at {
                Some(due) => println!("    [ ] {} (due {})", task.title, format_date(&due)),
                None => println!("    [ ] {}", task.title),
            }
        }
    }
}

fn print_contact_fields(contact: &Contact) {
    println!("  {}", contact.email);
    if let Some(ref phone) = contact.phone {
        println!("  {}", phone);
    }
    if let Some(ref company) = contact.company {
        println!("  {}", company);
    }
    println!("  {} / {}", contact.contact_type.as_str(), contact.stage.label());
    if let Some(ref preparer) = contact.assigned_preparer_id {
        println!("  Preparer: {}", preparer);
    }
    if let Some(ref referrer) = contact.referrer_username {
        println!("  Referred by: {}", referrer);
    }
    if let Some(rate) = contact.commission_rate {
        let lock = if contact.is_commission_locked() { " (locked)" } else { "" };
        println!("  Commission: {:.1}%{}", rate * 100.0, lock);
    }
    if let Some(ref last) = contact.last_contacted_at {
        println!("  Last contacted: {}", format_date(last));
    }
}

/// Print stage transitions, most recent first.
pub fn print_stage_history(history: &[StageHistory]) {
    if history.is_empty() {
        println!("No stage changes recorded.");
        return;
    }

    for entry in history {
        let reason = entry
            .reason
            .as_deref()
            .map(|r| format!(" \"{}\"", truncate(r, 40)))
            .unwrap_or_default();
        println!(
            "{}  {} -> {}  by {}{}",
            format_date(&entry.created_at),
            entry.from_stage.label(),
            entry.to_stage.label(),
            entry.changed_by,
            reason
        );
    }
}

pub fn interaction_line(interaction: &Interaction) -> String {
    let arrow = match interaction.direction {
        crate::models::Direction::Inbound => "<",
        crate::models::Direction::Outbound => ">",
    };
    let text = interaction
        .subject
        .as_deref()
        .or(interaction.body.as_deref())
        .unwrap_or("");
    format!(
        "{} {} {} \"{}\"",
        arrow,
        interaction.interaction_type.as_str(),
        format_date(&interaction.occurred_at),
        truncate(first_line(text), 40)
    )
}

/// Local date and time, minute precision.
pub fn format_date(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%b %-d, %Y %H:%M").to_string()
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

/// Truncate to `max_len` characters, ending with an ellipsis when cut.
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactCounts, Direction, InteractionType, NewInteraction};
    use uuid::Uuid;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly ten", 11), "exactly ten");
        assert_eq!(truncate("a much longer line", 7), "a much…");
        assert_eq!(truncate("Müller GmbH", 4), "Mül…");
    }

    #[test]
    fn test_interaction_line_prefers_subject_and_first_line() {
        let mut input = NewInteraction::note(Uuid::new_v4(), "first\nsecond");
        input.interaction_type = InteractionType::Call;
        input.direction = Direction::Inbound;
        let line = interaction_line(&input.clone().into_interaction(None));
        assert!(line.starts_with("< CALL"));
        assert!(line.ends_with("\"first\""));

        input.subject = Some("Quarterly check-in".into());
        let line = interaction_line(&input.into_interaction(None));
        assert!(line.contains("Quarterly check-in"));
    }

    #[test]
    fn test_print_detail_does_not_panic() {
        let mut contact = Contact::new("Ann".into(), "Lee".into(), "ann@x.com".into());
        contact.commission_rate = Some(0.15);
        let detail = ContactDetail {
            contact,
            recent_interactions: vec![],
            recent_stage_history: vec![],
            tags: vec![],
            open_tasks: vec![],
            recent_email_activity: vec![],
            counts: ContactCounts::default(),
        };
        print_contact_detail(&detail);
        print_stage_history(&[]);
    }
}
