//! Pending large-binary uploads, tracked apart from the sync queue so a
//! stalled transfer never blocks small control messages.

use rusqlite::params;
use uuid::Uuid;

use courrier_shared::types::UploadStatus;

use crate::convert::{parse_tag, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::Result;
use crate::models::{MediaOwner, PendingUpload};

impl Database {
    pub fn insert_upload(&self, upload: &PendingUpload) -> Result<()> {
        self.conn().execute(
            "INSERT INTO pending_uploads (id, owner_kind, owner_id, media_id, status, retry_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO NOTHING",
            params![
                upload.id.to_string(),
                upload.owner_kind.as_str(),
                upload.owner_id.to_string(),
                upload.media_id.to_string(),
                upload.status.as_str(),
                upload.retry_count,
                upload.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn set_upload_status(&self, id: Uuid, status: UploadStatus) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE pending_uploads SET status = ?2 WHERE id = ?1",
            params![id.to_string(), status.as_str()],
        )?;
        Ok(affected > 0)
    }

    pub fn bump_upload_retry(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE pending_uploads SET retry_count = retry_count + 1, status = 'failed'
             WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Uploads still waiting for transfer (pending or previously failed),
    /// oldest first.
    pub fn open_uploads(&self, limit: u32) -> Result<Vec<PendingUpload>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, owner_kind, owner_id, media_id, status, retry_count, created_at
             FROM pending_uploads
             WHERE status IN ('pending', 'failed')
             ORDER BY created_at ASC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], row_to_upload)?;

        let mut uploads = Vec::new();
        for row in rows {
            uploads.push(row?);
        }
        Ok(uploads)
    }

    pub fn delete_upload(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM pending_uploads WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_upload(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingUpload> {
    let id_str: String = row.get(0)?;
    let owner_kind_str: String = row.get(1)?;
    let owner_id_str: String = row.get(2)?;
    let media_id_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let retry_count: i64 = row.get(5)?;
    let created_str: String = row.get(6)?;

    Ok(PendingUpload {
        id: parse_uuid(0, &id_str)?,
        owner_kind: parse_tag(1, &owner_kind_str, MediaOwner::from_str)?,
        owner_id: parse_uuid(2, &owner_id_str)?,
        media_id: parse_uuid(3, &media_id_str)?,
        status: parse_tag(4, &status_str, UploadStatus::from_str)?,
        retry_count,
        created_at: parse_ts(6, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaFile;
    use chrono::Utc;
    use courrier_shared::types::MessageKind;

    fn seed_media(db: &Database) -> Uuid {
        let media = MediaFile {
            id: Uuid::new_v4(),
            owner_kind: MediaOwner::Message,
            owner_id: Uuid::new_v4(),
            kind: MessageKind::Video,
            mime_type: "video/mp4".to_string(),
            size_bytes: 1 << 20,
            checksum: None,
            thumbnail: None,
            local_path: Some("/tmp/clip.mp4".to_string()),
            remote_url: None,
            downloaded: true,
            progress: 1.0,
            created_at: Utc::now(),
        };
        db.insert_media(&media).unwrap();
        media.id
    }

    #[test]
    fn upload_retry_flow() {
        let db = Database::open_in_memory().unwrap();
        let media_id = seed_media(&db);

        let upload = PendingUpload {
            id: Uuid::new_v4(),
            owner_kind: MediaOwner::Message,
            owner_id: Uuid::new_v4(),
            media_id,
            status: UploadStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
        };
        db.insert_upload(&upload).unwrap();

        db.bump_upload_retry(upload.id).unwrap();

        let open = db.open_uploads(10).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].status, UploadStatus::Failed);
        assert_eq!(open[0].retry_count, 1);

        db.set_upload_status(upload.id, UploadStatus::Completed)
            .unwrap();
        assert!(db.open_uploads(10).unwrap().is_empty());
    }
}
