use rusqlite::{params, Row};
use uuid::Uuid;

use super::{fmt_ts, parse_enum, parse_ts, parse_uuid, Database};
use crate::error::Result;
use crate::models::*;

impl Database {
    pub fn insert_email_activity(&self, activity: &EmailActivity) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO email_activity (
                id, contact_id, event, recipient, subject, provider_message_id, status, error, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                activity.id.to_string(),
                activity.contact_id.map(|id| id.to_string()),
                activity.event,
                activity.recipient,
                activity.subject,
                activity.provider_message_id,
                activity.status.as_str(),
                activity.error,
                fmt_ts(&activity.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_email_activity_for_contact(&self, contact_id: Uuid, limit: u32) -> Result<Vec<EmailActivity>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT * FROM email_activity WHERE contact_id = ?
               ORDER BY created_at DESC, rowid DESC LIMIT ?"#,
        )?;

        let rows = stmt
            .query_map(params![contact_id.to_string(), limit], row_to_email_activity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    pub fn count_emails_sent(&self, contact_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM email_activity WHERE contact_id = ? AND status = 'SENT'",
            [contact_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn row_to_email_activity(row: &Row) -> rusqlite::Result<EmailActivity> {
    let id: String = row.get("id")?;
    let contact_id: Option<String> = row.get("contact_id")?;
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;

    Ok(EmailActivity {
        id: parse_uuid(&id)?,
        contact_id: contact_id.as_deref().map(parse_uuid).transpose()?,
        event: row.get("event")?,
        recipient: row.get("recipient")?,
        subject: row.get("subject")?,
        provider_message_id: row.get("provider_message_id")?,
        status: parse_enum(&status)?,
        error: row.get("error")?,
        created_at: parse_ts(&created_at)?,
    })
}
