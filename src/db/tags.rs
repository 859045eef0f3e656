use rusqlite::params;
use uuid::Uuid;

use super::{fmt_ts, parse_uuid, Database};
use crate::error::Result;
use crate::models::*;

impl Database {
    /// Get or create a tag by name (case-insensitive).
    pub fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        self.transaction(|tx| {
            let existing = tx.query_row(
                "SELECT id, name, color FROM tags WHERE name = ? COLLATE NOCASE",
                [name],
                |row| {
                    let id: String = row.get(0)?;
                    Ok(Tag {
                        id: parse_uuid(&id)?,
                        name: row.get(1)?,
                        color: row.get(2)?,
                    })
                },
            );

            match existing {
                Ok(tag) => Ok(tag),
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    let tag = Tag::new(name.to_string());
                    tx.execute(
                        "INSERT INTO tags (id, name, color) VALUES (?, ?, ?)",
                        params![tag.id.to_string(), tag.name, tag.color],
                    )?;
                    Ok(tag)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Link a tag to a contact. Returns false if the link already existed.
    pub fn add_tag_to_contact(&self, contact_id: Uuid, tag_id: Uuid) -> Result<bool> {
        let link = ContactTag::new(contact_id, tag_id);
        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO contact_tags (id, contact_id, tag_id, added_at) VALUES (?, ?, ?, ?)",
            params![
                link.id.to_string(),
                link.contact_id.to_string(),
                link.tag_id.to_string(),
                fmt_ts(&link.added_at),
            ],
        )?;
        Ok(rows > 0)
    }

    /// Unlink a tag from a contact by tag name. Returns false if it was not linked.
    pub fn remove_tag_from_contact(&self, contact_id: Uuid, name: &str) -> Result<bool> {
        let rows = self.conn.execute(
            r#"DELETE FROM contact_tags
               WHERE contact_id = ? AND tag_id IN (SELECT id FROM tags WHERE name = ? COLLATE NOCASE)"#,
            params![contact_id.to_string(), name],
        )?;
        Ok(rows > 0)
    }

    /// Get tags for a contact
    pub fn get_tags_for_contact(&self, contact_id: Uuid) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT t.id, t.name, t.color
               FROM tags t
               JOIN contact_tags ct ON ct.tag_id = t.id
               WHERE ct.contact_id = ?
               ORDER BY t.name"#,
        )?;

        let tags = stmt
            .query_map([contact_id.to_string()], |row| {
                let id: String = row.get(0)?;
                Ok(Tag {
                    id: parse_uuid(&id)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lifecycle() {
        let db = Database::open_memory().unwrap();
        let contact = Contact::new("T".into(), "G".into(), "tg@x.com".into());
        db.insert_contact(&contact).unwrap();

        let vip = db.get_or_create_tag("VIP").unwrap();
        assert_eq!(db.get_or_create_tag("vip").unwrap().id, vip.id);

        assert!(db.add_tag_to_contact(contact.id, vip.id).unwrap());
        assert!(!db.add_tag_to_contact(contact.id, vip.id).unwrap());
        assert_eq!(db.get_tags_for_contact(contact.id).unwrap().len(), 1);

        assert!(db.remove_tag_from_contact(contact.id, "vip").unwrap());
        assert!(!db.remove_tag_from_contact(contact.id, "vip").unwrap());
        assert!(db.get_tags_for_contact(contact.id).unwrap().is_empty());
    }
}
