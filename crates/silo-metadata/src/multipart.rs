//! Multipart upload and part operations

use silo_core::types::{MultipartUpload, UploadPart};
use silo_core::Result;
use tracing::debug;

use crate::store::{db_err, parse_ts, MetadataStore};

type UploadRow = (String, String, String, String, Option<String>, String);

fn upload_row(r: UploadRow) -> MultipartUpload {
    MultipartUpload {
        upload_id: r.0,
        bucket: r.1,
        key: r.2,
        content_type: r.3,
        metadata: r
            .4
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_default(),
        initiated_at: parse_ts(&r.5),
    }
}

impl MetadataStore {
    pub async fn create_multipart_upload(&self, upload: &MultipartUpload) -> Result<()> {
        let metadata: Option<String> = if upload.metadata.is_empty() {
            None
        } else {
            serde_json::to_string(&upload.metadata).ok()
        };

        sqlx::query(
            r#"
            INSERT INTO multipart_uploads
                (upload_id, bucket, key, content_type, metadata, initiated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&upload.upload_id)
        .bind(&upload.bucket)
        .bind(&upload.key)
        .bind(&upload.content_type)
        .bind(metadata)
        .bind(upload.initiated_at.to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        debug!(
            "Created multipart upload {} for {}/{}",
            upload.upload_id, upload.bucket, upload.key
        );
        Ok(())
    }

    pub async fn get_multipart_upload(&self, upload_id: &str) -> Result<Option<MultipartUpload>> {
        let row: Option<UploadRow> = sqlx::query_as(
            r#"
            SELECT upload_id, bucket, key, content_type, metadata, initiated_at
            FROM multipart_uploads WHERE upload_id = ?
            "#,
        )
        .bind(upload_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(upload_row))
    }

    /// Remove the upload and all its part records.
    pub async fn delete_multipart_upload(&self, upload_id: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM multipart_uploads WHERE upload_id = ?"#)
            .bind(upload_id)
            .execute(self.pool())
            .await
            .map_err(db_err)?;

        sqlx::query(r#"DELETE FROM upload_parts WHERE upload_id = ?"#)
            .bind(upload_id)
            .execute(self.pool())
            .await
            .map_err(db_err)?;

        Ok(())
    }

    /// Uploads in a bucket under `prefix`, ordered by `(key, upload_id)`.
    pub async fn list_multipart_uploads_by_bucket(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<MultipartUpload>> {
        let rows: Vec<UploadRow> = sqlx::query_as(
            r#"
            SELECT upload_id, bucket, key, content_type, metadata, initiated_at
            FROM multipart_uploads
            WHERE bucket = ? AND key LIKE ? ESCAPE '\'
            ORDER BY key, upload_id
            "#,
        )
        .bind(bucket)
        .bind(format!(
            "{}%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        ))
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(upload_row).collect())
    }

    /// Insert or replace a part record. Re-uploading a part number replaces
    /// the prior record.
    pub async fn put_part(&self, upload_id: &str, part: &UploadPart) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_parts (upload_id, part_number, size, etag, last_modified)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(upload_id, part_number) DO UPDATE SET
                size = excluded.size,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(upload_id)
        .bind(part.part_number)
        .bind(part.size)
        .bind(&part.etag)
        .bind(part.last_modified.to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    pub async fn get_part(
        &self,
        upload_id: &str,
        part_number: i32,
    ) -> Result<Option<UploadPart>> {
        let row: Option<(i32, i64, String, String)> = sqlx::query_as(
            r#"
            SELECT part_number, size, etag, last_modified
            FROM upload_parts WHERE upload_id = ? AND part_number = ?
            "#,
        )
        .bind(upload_id)
        .bind(part_number)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| UploadPart {
            part_number: r.0,
            size: r.1,
            etag: r.2,
            last_modified: parse_ts(&r.3),
        }))
    }

    /// All parts of an upload ordered by part number.
    pub async fn list_parts(&self, upload_id: &str) -> Result<Vec<UploadPart>> {
        let rows: Vec<(i32, i64, String, String)> = sqlx::query_as(
            r#"
            SELECT part_number, size, etag, last_modified
            FROM upload_parts WHERE upload_id = ?
            ORDER BY part_number
            "#,
        )
        .bind(upload_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| UploadPart {
                part_number: r.0,
                size: r.1,
                etag: r.2,
                last_modified: parse_ts(&r.3),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn upload(bucket: &str, key: &str) -> MultipartUpload {
        MultipartUpload {
            upload_id: MultipartUpload::generate_upload_id(),
            bucket: bucket.into(),
            key: key.into(),
            content_type: "application/octet-stream".into(),
            metadata: HashMap::new(),
            initiated_at: Utc::now(),
        }
    }

    fn part(n: i32, size: i64) -> UploadPart {
        UploadPart {
            part_number: n,
            size,
            etag: format!("etag-{n}"),
            last_modified: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upload_lifecycle() {
        let store = MetadataStore::in_memory().await.unwrap();
        let up = upload("b", "k");
        store.create_multipart_upload(&up).await.unwrap();

        let fetched = store
            .get_multipart_upload(&up.upload_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.key, "k");

        store.put_part(&up.upload_id, &part(1, 10)).await.unwrap();
        store.put_part(&up.upload_id, &part(2, 20)).await.unwrap();
        // Re-upload replaces
        store.put_part(&up.upload_id, &part(1, 15)).await.unwrap();

        let parts = store.list_parts(&up.upload_id).await.unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].size, 15);

        store.delete_multipart_upload(&up.upload_id).await.unwrap();
        assert!(store
            .get_multipart_upload(&up.upload_id)
            .await
            .unwrap()
            .is_none());
        assert!(store.list_parts(&up.upload_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_uploads_ordering() {
        let store = MetadataStore::in_memory().await.unwrap();
        let mut ids = Vec::new();
        for key in ["b-key", "a-key", "a-key"] {
            let up = upload("b", key);
            ids.push((key, up.upload_id.clone()));
            store.create_multipart_upload(&up).await.unwrap();
        }

        let uploads = store
            .list_multipart_uploads_by_bucket("b", "")
            .await
            .unwrap();
        assert_eq!(uploads.len(), 3);
        assert_eq!(uploads[0].key, "a-key");
        assert_eq!(uploads[2].key, "b-key");

        let filtered = store
            .list_multipart_uploads_by_bucket("b", "b-")
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }
}
