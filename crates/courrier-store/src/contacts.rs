//! CRUD operations for [`Contact`] records.
//!
//! Contact and presence events merge last-write-wins on `updated_at`: an
//! older event never clobbers a newer row.

use chrono::{DateTime, Utc};
use rusqlite::params;

use courrier_shared::types::UserId;

use crate::convert::{parse_opt_ts, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Contact;

impl Database {
    /// Upsert a contact, last-write-wins on `updated_at`.
    pub fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        self.conn().execute(
            "INSERT INTO contacts (id, display_name, avatar_url, is_friend, is_online, last_seen, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 avatar_url   = excluded.avatar_url,
                 is_friend    = excluded.is_friend,
                 is_online    = excluded.is_online,
                 last_seen    = excluded.last_seen,
                 updated_at   = excluded.updated_at
             WHERE excluded.updated_at >= contacts.updated_at",
            params![
                contact.id.to_string(),
                contact.display_name,
                contact.avatar_url,
                contact.is_friend as i32,
                contact.is_online as i32,
                contact.last_seen.map(|t| t.to_rfc3339()),
                contact.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Apply a presence change, last-write-wins on `updated_at`.
    pub fn set_contact_presence(
        &self,
        id: UserId,
        online: bool,
        last_seen: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE contacts SET is_online = ?2, last_seen = ?3, updated_at = ?4
             WHERE id = ?1 AND updated_at <= ?4",
            params![
                id.to_string(),
                online as i32,
                last_seen.to_rfc3339(),
                updated_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get_contact(&self, id: UserId) -> Result<Contact> {
        self.conn()
            .query_row(
                "SELECT id, display_name, avatar_url, is_friend, is_online, last_seen, updated_at
                 FROM contacts WHERE id = ?1",
                params![id.to_string()],
                row_to_contact,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })
    }

    /// List contacts, friends first, then by display name.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, display_name, avatar_url, is_friend, is_online, last_seen, updated_at
             FROM contacts
             ORDER BY is_friend DESC, display_name ASC",
        )?;

        let rows = stmt.query_map([], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    pub fn delete_contact(&self, id: UserId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM contacts WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let id_str: String = row.get(0)?;
    let display_name: Option<String> = row.get(1)?;
    let avatar_url: Option<String> = row.get(2)?;
    let is_friend: i32 = row.get(3)?;
    let is_online: i32 = row.get(4)?;
    let last_seen_str: Option<String> = row.get(5)?;
    let updated_str: String = row.get(6)?;

    Ok(Contact {
        id: UserId(parse_uuid(0, &id_str)?),
        display_name,
        avatar_url,
        is_friend: is_friend != 0,
        is_online: is_online != 0,
        last_seen: parse_opt_ts(5, last_seen_str)?,
        updated_at: parse_ts(6, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_contact(updated_at: DateTime<Utc>) -> Contact {
        Contact {
            id: UserId::new(),
            display_name: Some("Amélie".to_string()),
            avatar_url: None,
            is_friend: true,
            is_online: false,
            last_seen: None,
            updated_at,
        }
    }

    #[test]
    fn stale_update_loses() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let mut contact = test_contact(now);
        db.upsert_contact(&contact).unwrap();

        // An older snapshot must not clobber the newer row.
        contact.display_name = Some("Old name".to_string());
        contact.updated_at = now - Duration::hours(1);
        db.upsert_contact(&contact).unwrap();

        let stored = db.get_contact(contact.id).unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("Amélie"));
    }

    #[test]
    fn presence_merges_forward() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let contact = test_contact(now);
        db.upsert_contact(&contact).unwrap();

        assert!(db
            .set_contact_presence(contact.id, true, now, now + Duration::seconds(5))
            .unwrap());
        assert!(db.get_contact(contact.id).unwrap().is_online);

        // Out-of-date presence is ignored.
        assert!(!db
            .set_contact_presence(contact.id, false, now, now - Duration::hours(2))
            .unwrap());
        assert!(db.get_contact(contact.id).unwrap().is_online);
    }
}
