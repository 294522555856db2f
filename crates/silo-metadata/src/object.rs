//! Object and object-version operations

use chrono::Utc;
use silo_core::types::ObjectRecord;
use silo_core::Result;
use std::collections::HashMap;
use tracing::debug;

use crate::store::{db_err, parse_ts, MetadataStore};

type ObjectRow = (
    String,         // bucket
    String,         // key
    i64,            // size
    String,         // etag
    String,         // content_type
    Option<String>, // metadata
    String,         // version_id
    String,         // last_modified
);

fn row_to_record(r: ObjectRow) -> ObjectRecord {
    ObjectRecord {
        bucket: r.0,
        key: r.1,
        size: r.2,
        etag: r.3,
        content_type: r.4,
        metadata: r
            .5
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_default(),
        version_id: r.6,
        last_modified: parse_ts(&r.7),
        is_delete_marker: false,
    }
}

type VersionRow = (
    String,         // bucket
    String,         // key
    String,         // version_id
    i64,            // size
    String,         // etag
    String,         // content_type
    Option<String>, // metadata
    bool,           // is_delete_marker
    String,         // last_modified
);

fn version_row_to_record(r: VersionRow) -> ObjectRecord {
    ObjectRecord {
        bucket: r.0,
        key: r.1,
        version_id: r.2,
        size: r.3,
        etag: r.4,
        content_type: r.5,
        metadata: r
            .6
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_default(),
        is_delete_marker: r.7,
        last_modified: parse_ts(&r.8),
    }
}

fn metadata_json(metadata: &HashMap<String, String>) -> Option<String> {
    if metadata.is_empty() {
        None
    } else {
        serde_json::to_string(metadata).ok()
    }
}

impl MetadataStore {
    /// Insert or replace the current-object record. Last write wins.
    pub async fn put_object(&self, object: &ObjectRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO objects
                (bucket, key, size, etag, content_type, metadata, version_id, last_modified)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, key) DO UPDATE SET
                size = excluded.size,
                etag = excluded.etag,
                content_type = excluded.content_type,
                metadata = excluded.metadata,
                version_id = excluded.version_id,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(&object.bucket)
        .bind(&object.key)
        .bind(object.size)
        .bind(&object.etag)
        .bind(&object.content_type)
        .bind(metadata_json(&object.metadata))
        .bind(&object.version_id)
        .bind(object.last_modified.to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        debug!("Put object {}/{}", object.bucket, object.key);
        Ok(())
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectRecord>> {
        let row: Option<ObjectRow> = sqlx::query_as(
            r#"
            SELECT bucket, key, size, etag, content_type, metadata, version_id, last_modified
            FROM objects WHERE bucket = ? AND key = ?
            "#,
        )
        .bind(bucket)
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(row_to_record))
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM objects WHERE bucket = ? AND key = ?"#)
            .bind(bucket)
            .bind(key)
            .execute(self.pool())
            .await
            .map_err(db_err)?;

        // Per-object satellite rows go with the object
        for table in ["object_tags", "object_acl", "object_retention", "object_legal_hold"] {
            sqlx::query(&format!(
                "DELETE FROM {} WHERE bucket = ? AND key = ?",
                table
            ))
            .bind(bucket)
            .bind(key)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        }

        Ok(())
    }

    /// All current objects in a bucket whose key starts with `prefix`,
    /// ordered lexicographically by key. The engine folds delimiters and
    /// trims pages on top of this.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectRecord>> {
        let rows: Vec<ObjectRow> = sqlx::query_as(
            r#"
            SELECT bucket, key, size, etag, content_type, metadata, version_id, last_modified
            FROM objects
            WHERE bucket = ? AND key >= ? AND key LIKE ? ESCAPE '\'
            ORDER BY key
            "#,
        )
        .bind(bucket)
        .bind(prefix)
        .bind(format!("{}%", escape_like(prefix)))
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }

    // Version operations

    pub async fn put_object_version(&self, version: &ObjectRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO object_versions
                (bucket, key, version_id, size, etag, content_type, metadata,
                 is_delete_marker, last_modified)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&version.bucket)
        .bind(&version.key)
        .bind(&version.version_id)
        .bind(version.size)
        .bind(&version.etag)
        .bind(&version.content_type)
        .bind(metadata_json(&version.metadata))
        .bind(version.is_delete_marker)
        .bind(version.last_modified.to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    pub async fn get_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<Option<ObjectRecord>> {
        let row: Option<VersionRow> = sqlx::query_as(
            r#"
            SELECT bucket, key, version_id, size, etag, content_type, metadata,
                   is_delete_marker, last_modified
            FROM object_versions
            WHERE bucket = ? AND key = ? AND version_id = ?
            "#,
        )
        .bind(bucket)
        .bind(key)
        .bind(version_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(row.map(version_row_to_record))
    }

    pub async fn delete_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"DELETE FROM object_versions WHERE bucket = ? AND key = ? AND version_id = ?"#,
        )
        .bind(bucket)
        .bind(key)
        .bind(version_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// All versions in a bucket under `prefix`, ordered by `(key,
    /// last_modified DESC)` so the newest version of each key comes first.
    pub async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectRecord>> {
        let rows: Vec<VersionRow> = sqlx::query_as(
            r#"
            SELECT bucket, key, version_id, size, etag, content_type, metadata,
                   is_delete_marker, last_modified
            FROM object_versions
            WHERE bucket = ? AND key LIKE ? ESCAPE '\'
            ORDER BY key, last_modified DESC, version_id
            "#,
        )
        .bind(bucket)
        .bind(format!("{}%", escape_like(prefix)))
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(version_row_to_record).collect())
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::types::Bucket;

    async fn store_with_bucket(name: &str) -> MetadataStore {
        let store = MetadataStore::in_memory().await.unwrap();
        store.create_bucket(&Bucket::new(name.into())).await.unwrap();
        store
    }

    fn record(bucket: &str, key: &str, size: i64) -> ObjectRecord {
        ObjectRecord::new(
            bucket.into(),
            key.into(),
            size,
            "etag".into(),
            "application/octet-stream".into(),
        )
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = store_with_bucket("b").await;
        store.put_object(&record("b", "k", 3)).await.unwrap();

        let obj = store.get_object("b", "k").await.unwrap().unwrap();
        assert_eq!(obj.size, 3);

        // Overwrite wins
        store.put_object(&record("b", "k", 9)).await.unwrap();
        assert_eq!(store.get_object("b", "k").await.unwrap().unwrap().size, 9);

        store.delete_object("b", "k").await.unwrap();
        assert!(store.get_object("b", "k").await.unwrap().is_none());
        // Idempotent
        store.delete_object("b", "k").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_prefix_ordering() {
        let store = store_with_bucket("b").await;
        for key in ["images/b.jpg", "docs/f.txt", "images/a.jpg", "root.txt"] {
            store.put_object(&record("b", key, 1)).await.unwrap();
        }

        let all = store.list_objects("b", "").await.unwrap();
        let keys: Vec<&str> = all.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["docs/f.txt", "images/a.jpg", "images/b.jpg", "root.txt"]);

        let images = store.list_objects("b", "images/").await.unwrap();
        assert_eq!(images.len(), 2);
    }

    #[tokio::test]
    async fn test_like_escaping() {
        let store = store_with_bucket("b").await;
        store.put_object(&record("b", "100%_done", 1)).await.unwrap();
        store.put_object(&record("b", "100xdone", 1)).await.unwrap();

        let matched = store.list_objects("b", "100%").await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].key, "100%_done");
    }

    #[tokio::test]
    async fn test_version_rows() {
        let store = store_with_bucket("b").await;
        let mut v1 = record("b", "k", 2).with_version("v1".into());
        v1.last_modified = chrono::Utc::now() - chrono::Duration::seconds(5);
        let v2 = record("b", "k", 4).with_version("v2".into());

        store.put_object_version(&v1).await.unwrap();
        store.put_object_version(&v2).await.unwrap();

        let versions = store.list_object_versions("b", "").await.unwrap();
        assert_eq!(versions.len(), 2);
        // Newest first within the key
        assert_eq!(versions[0].version_id, "v2");

        store.delete_object_version("b", "k", "v1").await.unwrap();
        assert!(store
            .get_object_version("b", "k", "v1")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_object_version("b", "k", "v2")
            .await
            .unwrap()
            .is_some());
    }
}
