use anyhow::{Context, Result};

use super::display::{print_contact_detail, print_contact_page};
use super::{parse_id, AddArgs, ListArgs, Session};
use crate::models::{ContactFilters, ContactType, NewContact, Pagination, Stage};

pub fn run_list(session: &Session, args: &ListArgs) -> Result<()> {
    let filters = ContactFilters {
        stage: args
            .stage
            .as_deref()
            .map(str::parse::<Stage>)
            .transpose()
            .map_err(anyhow::Error::msg)?,
        contact_type: args
            .contact_type
            .as_deref()
            .map(str::parse::<ContactType>)
            .transpose()
            .map_err(anyhow::Error::msg)?,
        search: args.search.clone(),
        assigned_preparer_id: args.assigned.clone(),
    };

    let page = session
        .service()
        .list_contacts(filters, Pagination::new(args.page, args.limit), &session.ctx)?;
    print_contact_page(&page);
    Ok(())
}

pub fn run_show(session: &Session, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let detail = session.service().get_contact_by_id(id, &session.ctx)?;
    print_contact_detail(&detail);
    Ok(())
}

pub fn run_add(session: &Session, args: AddArgs) -> Result<()> {
    let contact_type: ContactType = args.contact_type.parse().map_err(anyhow::Error::msg)?;
    let input = NewContact {
        first_name: args.first,
        last_name: args.last,
        email: args.email,
        phone: args.phone,
        company: args.company,
        contact_type,
        ..Default::default()
    };

    let outcome = session
        .service()
        .create_contact(input, args.upsert, &session.ctx)
        .context("Failed to add contact")?;

    let contact = outcome.contact();
    let verb = if outcome.was_created() { "Created" } else { "Updated" };
    println!("{} {} <{}> ({})", verb, contact.full_name(), contact.email, contact.id);
    Ok(())
}

pub fn run_assign(session: &Session, id: &str, preparer: &str) -> Result<()> {
    let id = parse_id(id)?;
    let contact = session
        .service()
        .assign_contact_to_preparer(id, preparer, &session.ctx)?;
    println!("Assigned {} to {}", contact.full_name(), preparer.trim());
    Ok(())
}

pub fn run_delete(session: &Session, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    session.service().delete_contact(id, &session.ctx)?;
    println!("Deleted {}", id);
    Ok(())
}
