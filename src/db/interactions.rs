use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{conversion_error, fmt_ts, parse_enum, parse_ts, parse_uuid, Database};
use crate::error::{CrmError, Result};
use crate::models::*;

impl Database {
    // ==================== INTERACTION LOG ====================

    /// Append an interaction and bump the contact's `last_contacted_at` in one transaction.
    ///
    /// `last_contacted_at` becomes the latest of its stored value, now and `occurred_at`,
    /// so it never moves backwards. Returns the contact's new `last_contacted_at`.
    pub fn record_interaction(&self, interaction: &Interaction) -> Result<DateTime<Utc>> {
        let attachments = serde_json::to_string(&interaction.attachments)?;

        self.transaction(|tx| {
            let now = Utc::now();
            let touched_at = now.max(interaction.occurred_at);

            // Fixed-width timestamps compare correctly as text
            let rows = tx.execute(
                r#"UPDATE contacts SET last_contacted_at = MAX(COALESCE(last_contacted_at, ''), ?1), updated_at = ?2
                   WHERE id = ?3 AND deleted_at IS NULL"#,
                params![
                    fmt_ts(&touched_at),
                    fmt_ts(&now),
                    interaction.contact_id.to_string()
                ],
            )?;
            if rows == 0 {
                return Err(CrmError::not_found("Contact", interaction.contact_id));
            }

            tx.execute(
                r#"INSERT INTO interactions (
                    id, contact_id, interaction_type, direction, subject, body,
                    occurred_at, attachments, created_by, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    interaction.id.to_string(),
                    interaction.contact_id.to_string(),
                    interaction.interaction_type.as_str(),
                    interaction.direction.as_str(),
                    interaction.subject,
                    interaction.body,
                    fmt_ts(&interaction.occurred_at),
                    attachments,
                    interaction.created_by,
                    fmt_ts(&interaction.created_at),
                ],
            )?;

            let contacted_at: String = tx.query_row(
                "SELECT last_contacted_at FROM contacts WHERE id = ?",
                [interaction.contact_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(parse_ts(&contacted_at)?)
        })
    }

    /// Most recent interactions first.
    pub fn get_interactions_for_contact(&self, contact_id: Uuid, limit: u32) -> Result<Vec<Interaction>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT * FROM interactions WHERE contact_id = ?
               ORDER BY occurred_at DESC, created_at DESC LIMIT ?"#,
        )?;

        let interactions = stmt
            .query_map(params![contact_id.to_string(), limit], row_to_interaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(interactions)
    }

    pub fn count_interactions(&self, contact_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM interactions WHERE contact_id = ?",
            [contact_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn row_to_interaction(row: &Row) -> rusqlite::Result<Interaction> {
    let id: String = row.get("id")?;
    let contact_id: String = row.get("contact_id")?;
    let interaction_type: String = row.get("interaction_type")?;
    let direction: String = row.get("direction")?;
    let occurred_at: String = row.get("occurred_at")?;
    let attachments: String = row.get("attachments")?;
    let created_at: String = row.get("created_at")?;

    Ok(Interaction {
        id: parse_uuid(&id)?,
        contact_id: parse_uuid(&contact_id)?,
        interaction_type: parse_enum(&interaction_type)?,
        direction: parse_enum(&direction)?,
        subject: row.get("subject")?,
        body: row.get("body")?,
        occurred_at: parse_ts(&occurred_at)?,
        attachments: serde_json::from_str(&attachments).map_err(|e| conversion_error(0, e))?,
        created_by: row.get("created_by")?,
        created_at: parse_ts(&created_at)?,
    })
}
