//! Key/value settings.
//!
//! The schema version lives in `PRAGMA user_version`; everything else a
//! running install needs to remember (encryption key blob, feature toggles,
//! last-cleanup timestamp) goes through here.

use chrono::{DateTime, Utc};
use rusqlite::params;

use courrier_shared::constants::{SETTING_DURABLE_STORAGE, SETTING_LAST_CLEANUP};

use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT value FROM settings WHERE key = ?1")?;

        let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(value) => Ok(Some(value?)),
            None => Ok(None),
        }
    }

    /// Set (or replace) a settings value.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    pub fn get_bool_setting(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.get_setting(key)?.map(|v| v == "true"))
    }

    pub fn set_bool_setting(&self, key: &str, value: bool) -> Result<()> {
        self.set_setting(key, if value { "true" } else { "false" })
    }

    pub fn record_cleanup_run(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_setting(SETTING_LAST_CLEANUP, &at.to_rfc3339())
    }

    pub fn last_cleanup_run(&self) -> Result<Option<DateTime<Utc>>> {
        match self.get_setting(SETTING_LAST_CLEANUP)? {
            Some(value) => Ok(Some(
                DateTime::parse_from_rfc3339(&value).map(|dt| dt.with_timezone(&Utc))?,
            )),
            None => Ok(None),
        }
    }

    pub fn set_durable_storage(&self, granted: bool) -> Result<()> {
        self.set_bool_setting(SETTING_DURABLE_STORAGE, granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let db = Database::open_in_memory().unwrap();

        assert!(db.get_setting("missing").unwrap().is_none());

        db.set_setting("theme", "dark").unwrap();
        db.set_setting("theme", "light").unwrap();
        assert_eq!(db.get_setting("theme").unwrap().as_deref(), Some("light"));

        assert!(db.delete_setting("theme").unwrap());
        assert!(db.get_setting("theme").unwrap().is_none());
    }

    #[test]
    fn cleanup_timestamp_round_trip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.last_cleanup_run().unwrap().is_none());

        let now = Utc::now();
        db.record_cleanup_run(now).unwrap();

        let stored = db.last_cleanup_run().unwrap().unwrap();
        assert_eq!(stored.timestamp_millis(), now.timestamp_millis());
    }
}
