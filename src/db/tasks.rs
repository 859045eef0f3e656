use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{fmt_opt_ts, fmt_ts, parse_opt_ts, parse_ts, parse_uuid, Database};
use crate::error::Result;
use crate::models::*;

impl Database {
    pub fn insert_task(&self, task: &Task) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO tasks (
                id, contact_id, title, description, due_at, completed_at,
                assigned_to, created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                task.id.to_string(),
                task.contact_id.to_string(),
                task.title,
                task.description,
                fmt_opt_ts(&task.due_at),
                fmt_opt_ts(&task.completed_at),
                task.assigned_to,
                task.created_by,
                fmt_ts(&task.created_at),
                fmt_ts(&task.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let mut stmt = self.conn.prepare("SELECT * FROM tasks WHERE id = ?")?;

        match stmt.query_row([id.to_string()], row_to_task) {
            Ok(task) => Ok(Some(task)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Mark a task complete. Returns false if it was already complete or does not exist.
    pub fn complete_task(&self, id: Uuid) -> Result<bool> {
        let now = fmt_ts(&Utc::now());
        let rows = self.conn.execute(
            "UPDATE tasks SET completed_at = ?1, updated_at = ?1 WHERE id = ?2 AND completed_at IS NULL",
            params![now, id.to_string()],
        )?;
        Ok(rows > 0)
    }

    /// Tasks for a contact: open ones first by due date (undated last), then completed.
    pub fn get_tasks_for_contact(&self, contact_id: Uuid, include_completed: bool) -> Result<Vec<Task>> {
        let sql = if include_completed {
            r#"SELECT * FROM tasks WHERE contact_id = ?
               ORDER BY completed_at IS NOT NULL, due_at IS NULL, due_at, created_at"#
        } else {
            r#"SELECT * FROM tasks WHERE contact_id = ? AND completed_at IS NULL
               ORDER BY due_at IS NULL, due_at, created_at"#
        };
        let mut stmt = self.conn.prepare(sql)?;

        let tasks = stmt
            .query_map([contact_id.to_string()], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tasks)
    }

    /// (total, open) task counts for a contact.
    pub fn count_tasks(&self, contact_id: Uuid) -> Result<(u64, u64)> {
        let (total, open): (i64, i64) = self.conn.query_row(
            r#"SELECT COUNT(*), COALESCE(SUM(CASE WHEN completed_at IS NULL THEN 1 ELSE 0 END), 0)
               FROM tasks WHERE contact_id = ?"#,
            [contact_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((total as u64, open as u64))
    }
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let id: String = row.get("id")?;
    let contact_id: String = row.get("contact_id")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Task {
        id: parse_uuid(&id)?,
        contact_id: parse_uuid(&contact_id)?,
        title: row.get("title")?,
        description: row.get("description")?,
        due_at: parse_opt_ts(row.get("due_at")?)?,
        completed_at: parse_opt_ts(row.get("completed_at")?)?,
        assigned_to: row.get("assigned_to")?,
        created_by: row.get("created_by")?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}
