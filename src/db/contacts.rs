use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, ToSql};
use uuid::Uuid;

use super::{fmt_opt_ts, fmt_ts, is_unique_violation, parse_enum, parse_opt_ts, parse_ts, parse_uuid, Database};
use crate::error::{CrmError, Result};
use crate::models::*;

/// Outcome of a create-or-merge write keyed by email.
#[derive(Debug, Clone, PartialEq)]
pub enum ContactWrite {
    Created(Contact),
    /// An existing contact with the same email absorbed the submission.
    Merged(Contact),
}

impl ContactWrite {
    pub fn contact(&self) -> &Contact {
        match self {
            Self::Created(c) | Self::Merged(c) => c,
        }
    }

    pub fn into_contact(self) -> Contact {
        match self {
            Self::Created(c) | Self::Merged(c) => c,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

fn duplicate_email() -> CrmError {
    CrmError::invalid("email", "a contact with this email already exists")
}

impl Database {
    // ==================== CONTACT CREATE ====================

    pub fn insert_contact(&self, contact: &Contact) -> Result<()> {
        insert_contact(&self.conn, contact)
    }

    /// Insert `input` as a new contact, or, when `merge` is set and the email is taken,
    /// fold it into the existing contact (restoring it if it was soft-deleted).
    ///
    /// Lookup and write run in one transaction, so two submissions with the same email
    /// never produce two rows.
    pub fn create_or_merge_contact(&self, input: &NewContact, merge: bool) -> Result<ContactWrite> {
        self.transaction(|tx| {
            match find_by_email(tx, &input.email)? {
                Some(mut existing) => {
                    if !merge {
                        return Err(duplicate_email());
                    }
                    input.merge_into(&mut existing);
                    existing.deleted_at = None;
                    existing.updated_at = Utc::now();
                    write_contact(tx, &existing)?;
                    Ok(ContactWrite::Merged(existing))
                }
                None => {
                    let contact = input.clone().into_contact();
                    insert_contact(tx, &contact)?;
                    Ok(ContactWrite::Created(contact))
                }
            }
        })
    }

    // ==================== CONTACT READ ====================

    /// Fetch a live (not soft-deleted) contact.
    pub fn get_contact(&self, id: Uuid) -> Result<Option<Contact>> {
        live_contact(&self.conn, id)
    }

    /// Find a contact by email, including soft-deleted ones (the email stays reserved).
    pub fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>> {
        find_by_email(&self.conn, email)
    }

    /// The live PREPARER contact linked to a preparer's account id.
    pub fn find_preparer_contact(&self, preparer_id: &str) -> Result<Option<Contact>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT * FROM contacts
               WHERE contact_type = 'PREPARER' AND user_id = ? AND deleted_at IS NULL
               ORDER BY created_at ASC
               LIMIT 1"#,
        )?;

        match stmt.query_row([preparer_id], row_to_contact) {
            Ok(contact) => Ok(Some(contact)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// One page of live contacts matching `filters`, plus the total match count.
    /// Ordered by most recently updated first; ties broken by id so pages are stable.
    pub fn list_contacts(
        &self,
        filters: &ContactFilters,
        pagination: Pagination,
    ) -> Result<(Vec<Contact>, u64)> {
        let mut conditions = vec!["deleted_at IS NULL".to_string()];
        let mut values: Vec<String> = Vec::new();

        if let Some(stage) = filters.stage {
            values.push(stage.as_str().to_string());
            conditions.push(format!("stage = ?{}", values.len()));
        }
        if let Some(contact_type) = filters.contact_type {
            values.push(contact_type.as_str().to_string());
            conditions.push(format!("contact_type = ?{}", values.len()));
        }
        if let Some(preparer_id) = &filters.assigned_preparer_id {
            values.push(preparer_id.clone());
            conditions.push(format!("assigned_preparer_id = ?{}", values.len()));
        }
        if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            values.push(format!("%{}%", escape_like(&search.to_lowercase())));
            // ESCAPE '\' enables backslash escaping for % and _ literals
            conditions.push(format!(
                "(LOWER(first_name || ' ' || last_name) LIKE ?{0} ESCAPE '\\' \
                  OR LOWER(email) LIKE ?{0} ESCAPE '\\' \
                  OR LOWER(COALESCE(phone, '')) LIKE ?{0} ESCAPE '\\')",
                values.len()
            ));
        }

        let where_clause = conditions.join(" AND ");

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM contacts WHERE {}", where_clause),
            rusqlite::params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let limit = pagination.limit();
        let offset = pagination.offset();
        let sql = format!(
            "SELECT * FROM contacts WHERE {} ORDER BY updated_at DESC, id ASC LIMIT ?{} OFFSET ?{}",
            where_clause,
            values.len() + 1,
            values.len() + 2
        );

        let mut all_params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
        all_params.push(&limit);
        all_params.push(&offset);

        let mut stmt = self.conn.prepare(&sql)?;
        let contacts = stmt
            .query_map(rusqlite::params_from_iter(all_params), row_to_contact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((contacts, total as u64))
    }

    /// Count of contacts (live and soft-deleted) holding `email`.
    pub fn count_contacts_with_email(&self, email: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM contacts WHERE email = ?",
            [email],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ==================== CONTACT UPDATE ====================

    /// Load a live contact, let `edit` change it, and write its profile back in one
    /// transaction. Sets `updated_at` to now. Returns `None` if the contact is missing
    /// or soft-deleted; an error from `edit` rolls back.
    pub fn modify_contact(
        &self,
        id: Uuid,
        edit: impl FnOnce(&mut Contact) -> Result<()>,
    ) -> Result<Option<Contact>> {
        self.transaction(|tx| {
            let mut contact = match live_contact(tx, id)? {
                Some(contact) => contact,
                None => return Ok(None),
            };
            edit(&mut contact)?;
            contact.updated_at = Utc::now();

            if write_profile(tx, &contact)? {
                Ok(Some(contact))
            } else {
                Ok(None)
            }
        })
    }

    pub fn assign_contact(&self, id: Uuid, preparer_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let rows = self.conn.execute(
            r#"UPDATE contacts SET assigned_preparer_id = ?, assigned_at = ?, updated_at = ?
               WHERE id = ? AND deleted_at IS NULL"#,
            params![preparer_id, fmt_ts(&at), fmt_ts(&at), id.to_string()],
        )?;
        Ok(rows > 0)
    }

    /// Set the commission rate and its lock timestamp. Returns false if the contact is
    /// missing or its rate is already locked.
    pub fn lock_commission_rate(&self, id: Uuid, rate: f64, at: DateTime<Utc>) -> Result<bool> {
        let rows = self.conn.execute(
            r#"UPDATE contacts SET commission_rate = ?, commission_rate_locked_at = ?, updated_at = ?
               WHERE id = ? AND deleted_at IS NULL AND commission_rate_locked_at IS NULL"#,
            params![rate, fmt_ts(&at), fmt_ts(&at), id.to_string()],
        )?;
        Ok(rows > 0)
    }

    // ==================== CONTACT DELETE ====================

    /// Soft delete: set `deleted_at`. The row, its email and its logs are preserved.
    pub fn soft_delete_contact(&self, id: Uuid) -> Result<bool> {
        let now = fmt_ts(&Utc::now());
        let rows = self.conn.execute(
            "UPDATE contacts SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id.to_string()],
        )?;
        Ok(rows > 0)
    }
}

// ==================== CONNECTION-LEVEL HELPERS ====================

pub(super) fn insert_contact(conn: &Connection, contact: &Contact) -> Result<()> {
    let result = conn.execute(
        r#"INSERT INTO contacts (
            id, user_id, identity_provider_id, contact_type, first_name, last_name, email,
            phone, company, stage, stage_entered_at, referrer_username, referrer_type,
            attribution_method, attribution_confidence, commission_rate, commission_rate_locked_at,
            assigned_preparer_id, assigned_at, last_contacted_at, lead_score, created_at,
            updated_at, deleted_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        params![
            contact.id.to_string(),
            contact.user_id,
            contact.identity_provider_id,
            contact.contact_type.as_str(),
            contact.first_name,
            contact.last_name,
            contact.email,
            contact.phone,
            contact.company,
            contact.stage.as_str(),
            fmt_ts(&contact.stage_entered_at),
            contact.referrer_username,
            contact.referrer_type,
            contact.attribution_method,
            contact.attribution_confidence,
            contact.commission_rate,
            fmt_opt_ts(&contact.commission_rate_locked_at),
            contact.assigned_preparer_id,
            fmt_opt_ts(&contact.assigned_at),
            fmt_opt_ts(&contact.last_contacted_at),
            contact.lead_score,
            fmt_ts(&contact.created_at),
            fmt_ts(&contact.updated_at),
            fmt_opt_ts(&contact.deleted_at),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(duplicate_email()),
        Err(e) => Err(e.into()),
    }
}

/// Full profile write used by upsert merges, which may also restore a soft-deleted row.
/// Stage, assignment and bookkeeping columns have dedicated writers.
fn write_contact(conn: &Connection, contact: &Contact) -> Result<()> {
    let result = conn.execute(
        r#"UPDATE contacts SET
            user_id = ?, identity_provider_id = ?, contact_type = ?, first_name = ?,
            last_name = ?, email = ?, phone = ?, company = ?, referrer_username = ?,
            referrer_type = ?, attribution_method = ?, attribution_confidence = ?,
            commission_rate = ?, lead_score = ?, updated_at = ?, deleted_at = ?
           WHERE id = ?"#,
        params![
            contact.user_id,
            contact.identity_provider_id,
            contact.contact_type.as_str(),
            contact.first_name,
            contact.last_name,
            contact.email,
            contact.phone,
            contact.company,
            contact.referrer_username,
            contact.referrer_type,
            contact.attribution_method,
            contact.attribution_confidence,
            contact.commission_rate,
            contact.lead_score,
            fmt_ts(&contact.updated_at),
            fmt_opt_ts(&contact.deleted_at),
            contact.id.to_string(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(duplicate_email()),
        Err(e) => Err(e.into()),
    }
}

/// Profile write for a live contact. Never touches `deleted_at`, and leaves a locked
/// commission rate as stored. Returns false if the contact is missing or soft-deleted.
fn write_profile(conn: &Connection, contact: &Contact) -> Result<bool> {
    let result = conn.execute(
        r#"UPDATE contacts SET
            user_id = ?, identity_provider_id = ?, contact_type = ?, first_name = ?,
            last_name = ?, email = ?, phone = ?, company = ?, referrer_username = ?,
            referrer_type = ?, attribution_method = ?, attribution_confidence = ?,
            commission_rate = CASE WHEN commission_rate_locked_at IS NULL THEN ? ELSE commission_rate END,
            lead_score = ?, updated_at = ?
           WHERE id = ? AND deleted_at IS NULL"#,
        params![
            contact.user_id,
            contact.identity_provider_id,
            contact.contact_type.as_str(),
            contact.first_name,
            contact.last_name,
            contact.email,
            contact.phone,
            contact.company,
            contact.referrer_username,
            contact.referrer_type,
            contact.attribution_method,
            contact.attribution_confidence,
            contact.commission_rate,
            contact.lead_score,
            fmt_ts(&contact.updated_at),
            contact.id.to_string(),
        ],
    );

    match result {
        Ok(rows) => Ok(rows > 0),
        Err(e) if is_unique_violation(&e) => Err(duplicate_email()),
        Err(e) => Err(e.into()),
    }
}

fn live_contact(conn: &Connection, id: Uuid) -> Result<Option<Contact>> {
    let mut stmt = conn.prepare("SELECT * FROM contacts WHERE id = ? AND deleted_at IS NULL")?;

    match stmt.query_row([id.to_string()], row_to_contact) {
        Ok(contact) => Ok(Some(contact)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn find_by_email(conn: &Connection, email: &str) -> Result<Option<Contact>> {
    let mut stmt = conn.prepare("SELECT * FROM contacts WHERE email = ? LIMIT 1")?;

    match stmt.query_row([email], row_to_contact) {
        Ok(contact) => Ok(Some(contact)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read the stage of a live contact inside an open transaction.
pub(super) fn current_stage(conn: &Connection, id: Uuid) -> Result<Option<Stage>> {
    let result = conn.query_row(
        "SELECT stage FROM contacts WHERE id = ? AND deleted_at IS NULL",
        [id.to_string()],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(stage) => Ok(Some(parse_enum(&stage)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Escape LIKE metacharacters (% _ \)
fn escape_like(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    result
}

// ==================== ROW MAPPER ====================

pub(super) fn row_to_contact(row: &Row) -> rusqlite::Result<Contact> {
    let id: String = row.get("id")?;
    let contact_type: String = row.get("contact_type")?;
    let stage: String = row.get("stage")?;
    let stage_entered_at: String = row.get("stage_entered_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Contact {
        id: parse_uuid(&id)?,
        user_id: row.get("user_id")?,
        identity_provider_id: row.get("identity_provider_id")?,
        contact_type: parse_enum(&contact_type)?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        company: row.get("company")?,
        stage: parse_enum(&stage)?,
        stage_entered_at: parse_ts(&stage_entered_at)?,
        referrer_username: row.get("referrer_username")?,
        referrer_type: row.get("referrer_type")?,
        attribution_method: row.get("attribution_method")?,
        attribution_confidence: row.get("attribution_confidence")?,
        commission_rate: row.get("commission_rate")?,
        commission_rate_locked_at: parse_opt_ts(row.get("commission_rate_locked_at")?)?,
        assigned_preparer_id: row.get("assigned_preparer_id")?,
        assigned_at: parse_opt_ts(row.get("assigned_at")?)?,
        last_contacted_at: parse_opt_ts(row.get("last_contacted_at")?)?,
        lead_score: row.get("lead_score")?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        deleted_at: parse_opt_ts(row.get("deleted_at")?)?,
    })
}
