use rusqlite::{params, Row};
use uuid::Uuid;

use super::contacts::current_stage;
use super::{fmt_ts, parse_enum, parse_ts, parse_uuid, Database};
use crate::error::{CrmError, Result};
use crate::models::*;

impl Database {
    // ==================== STAGE TRANSITIONS ====================

    /// Move a contact to `to_stage` and append the matching history row, atomically.
    ///
    /// `from_stage` is read inside the same transaction. A history row is written even when
    /// `to_stage` equals the current stage.
    pub fn apply_stage_change(
        &self,
        contact_id: Uuid,
        to_stage: Stage,
        changed_by: &str,
        reason: Option<String>,
    ) -> Result<StageHistory> {
        self.transaction(|tx| {
            let from_stage = current_stage(tx, contact_id)?
                .ok_or_else(|| CrmError::not_found("Contact", contact_id))?;

            let mut entry = StageHistory::new(contact_id, from_stage, to_stage, changed_by.to_string());
            entry.reason = reason;
            let now = fmt_ts(&entry.created_at);

            tx.execute(
                "UPDATE contacts SET stage = ?1, stage_entered_at = ?2, updated_at = ?2 WHERE id = ?3",
                params![to_stage.as_str(), now, contact_id.to_string()],
            )?;

            tx.execute(
                r#"INSERT INTO stage_history (id, contact_id, from_stage, to_stage, changed_by, reason, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    entry.id.to_string(),
                    contact_id.to_string(),
                    from_stage.as_str(),
                    to_stage.as_str(),
                    entry.changed_by,
                    entry.reason,
                    now,
                ],
            )?;

            Ok(entry)
        })
    }

    /// Most recent transitions first.
    pub fn get_stage_history(&self, contact_id: Uuid, limit: u32) -> Result<Vec<StageHistory>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT * FROM stage_history WHERE contact_id = ?
               ORDER BY created_at DESC, rowid DESC LIMIT ?"#,
        )?;

        let entries = stmt
            .query_map(params![contact_id.to_string(), limit], row_to_stage_history)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    pub fn count_stage_changes(&self, contact_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM stage_history WHERE contact_id = ?",
            [contact_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn row_to_stage_history(row: &Row) -> rusqlite::Result<StageHistory> {
    let id: String = row.get("id")?;
    let contact_id: String = row.get("contact_id")?;
    let from_stage: String = row.get("from_stage")?;
    let to_stage: String = row.get("to_stage")?;
    let created_at: String = row.get("created_at")?;

    Ok(StageHistory {
        id: parse_uuid(&id)?,
        contact_id: parse_uuid(&contact_id)?,
        from_stage: parse_enum(&from_stage)?,
        to_stage: parse_enum(&to_stage)?,
        changed_by: row.get("changed_by")?,
        reason: row.get("reason")?,
        created_at: parse_ts(&created_at)?,
    })
}
