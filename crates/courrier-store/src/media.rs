//! Media file metadata.  Media is exclusively owned by a message or story
//! and removed when its owner is removed.

use rusqlite::params;
use uuid::Uuid;

use courrier_shared::types::MessageKind;

use crate::convert::{parse_tag, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{MediaFile, MediaOwner};

impl Database {
    pub fn insert_media(&self, media: &MediaFile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO media_files (id, owner_kind, owner_id, kind, mime_type, size_bytes,
                                      checksum, thumbnail, local_path, remote_url, downloaded,
                                      progress, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO NOTHING",
            params![
                media.id.to_string(),
                media.owner_kind.as_str(),
                media.owner_id.to_string(),
                media.kind.as_str(),
                media.mime_type,
                media.size_bytes,
                media.checksum,
                media.thumbnail,
                media.local_path,
                media.remote_url,
                media.downloaded as i32,
                media.progress,
                media.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_media(&self, id: Uuid) -> Result<MediaFile> {
        self.conn()
            .query_row(
                &format!("SELECT {MEDIA_COLUMNS} FROM media_files WHERE id = ?1"),
                params![id.to_string()],
                row_to_media,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })
    }

    pub fn set_media_progress(&self, id: Uuid, progress: f64) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE media_files SET progress = ?2 WHERE id = ?1",
            params![id.to_string(), progress],
        )?;
        Ok(affected > 0)
    }

    /// Record a completed download: local path set, progress pinned to 1.
    pub fn mark_media_downloaded(&self, id: Uuid, local_path: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE media_files SET downloaded = 1, progress = 1.0, local_path = ?2 WHERE id = ?1",
            params![id.to_string(), local_path],
        )?;
        Ok(affected > 0)
    }

    /// Remove all media owned by one message/story.
    pub fn delete_media_for_owner(&self, owner_kind: MediaOwner, owner_id: Uuid) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM media_files WHERE owner_kind = ?1 AND owner_id = ?2",
            params![owner_kind.as_str(), owner_id.to_string()],
        )?;
        Ok(affected)
    }
}

const MEDIA_COLUMNS: &str = "id, owner_kind, owner_id, kind, mime_type, size_bytes, checksum, \
     thumbnail, local_path, remote_url, downloaded, progress, created_at";

fn row_to_media(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaFile> {
    let id_str: String = row.get(0)?;
    let owner_kind_str: String = row.get(1)?;
    let owner_id_str: String = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let mime_type: String = row.get(4)?;
    let size_bytes: i64 = row.get(5)?;
    let checksum: Option<String> = row.get(6)?;
    let thumbnail: Option<String> = row.get(7)?;
    let local_path: Option<String> = row.get(8)?;
    let remote_url: Option<String> = row.get(9)?;
    let downloaded: i32 = row.get(10)?;
    let progress: f64 = row.get(11)?;
    let created_str: String = row.get(12)?;

    Ok(MediaFile {
        id: parse_uuid(0, &id_str)?,
        owner_kind: parse_tag(1, &owner_kind_str, MediaOwner::from_str)?,
        owner_id: parse_uuid(2, &owner_id_str)?,
        kind: parse_tag(3, &kind_str, MessageKind::from_str)?,
        mime_type,
        size_bytes,
        checksum,
        thumbnail,
        local_path,
        remote_url,
        downloaded: downloaded != 0,
        progress,
        created_at: parse_ts(12, &created_str)?,
    })
}

/// BLAKE3 checksum of raw file bytes, hex-encoded for the `checksum` column.
pub fn checksum_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_media(owner_id: Uuid) -> MediaFile {
        MediaFile {
            id: Uuid::new_v4(),
            owner_kind: MediaOwner::Message,
            owner_id,
            kind: MessageKind::Image,
            mime_type: "image/png".to_string(),
            size_bytes: 2048,
            checksum: Some(checksum_bytes(b"fake image bytes")),
            thumbnail: None,
            local_path: None,
            remote_url: Some("https://example.org/img.png".to_string()),
            downloaded: false,
            progress: 0.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn download_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let media = test_media(Uuid::new_v4());
        db.insert_media(&media).unwrap();

        db.set_media_progress(media.id, 0.5).unwrap();
        db.mark_media_downloaded(media.id, "/tmp/img.png").unwrap();

        let stored = db.get_media(media.id).unwrap();
        assert!(stored.downloaded);
        assert_eq!(stored.progress, 1.0);
        assert_eq!(stored.local_path.as_deref(), Some("/tmp/img.png"));
    }

    #[test]
    fn owner_cascade() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();

        db.insert_media(&test_media(owner)).unwrap();
        db.insert_media(&test_media(owner)).unwrap();
        db.insert_media(&test_media(Uuid::new_v4())).unwrap();

        assert_eq!(
            db.delete_media_for_owner(MediaOwner::Message, owner).unwrap(),
            2
        );
    }

    #[test]
    fn checksum_is_stable() {
        assert_eq!(checksum_bytes(b"abc"), checksum_bytes(b"abc"));
        assert_ne!(checksum_bytes(b"abc"), checksum_bytes(b"abd"));
    }
}
