//! Pool setup, schema, and bucket operations

use chrono::{DateTime, Utc};
use silo_core::types::{Bucket, BucketInfo, VersioningStatus};
use silo_core::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub struct MetadataStore {
    pool: SqlitePool,
}

pub(crate) fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

impl MetadataStore {
    /// Open (creating if missing) the database at `url` with WAL journaling
    /// and a busy timeout so concurrent request handlers coexist.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// In-memory store for tests. A single connection, so every caller sees
    /// the same database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1, Duration::from_secs(1)).await
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS buckets (
                name TEXT PRIMARY KEY,
                region TEXT NOT NULL,
                object_lock_enabled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                size INTEGER NOT NULL,
                etag TEXT NOT NULL,
                content_type TEXT NOT NULL,
                metadata TEXT,
                version_id TEXT NOT NULL DEFAULT '',
                last_modified TEXT NOT NULL,
                PRIMARY KEY (bucket, key),
                FOREIGN KEY (bucket) REFERENCES buckets(name) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS object_versions (
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                version_id TEXT NOT NULL,
                size INTEGER NOT NULL,
                etag TEXT NOT NULL,
                content_type TEXT NOT NULL,
                metadata TEXT,
                is_delete_marker INTEGER NOT NULL DEFAULT 0,
                last_modified TEXT NOT NULL,
                PRIMARY KEY (bucket, key, version_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS multipart_uploads (
                upload_id TEXT PRIMARY KEY,
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                content_type TEXT NOT NULL,
                metadata TEXT,
                initiated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS upload_parts (
                upload_id TEXT NOT NULL,
                part_number INTEGER NOT NULL,
                size INTEGER NOT NULL,
                etag TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                PRIMARY KEY (upload_id, part_number)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bucket_versioning (
                bucket TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bucket_tags (
                bucket TEXT PRIMARY KEY,
                tags TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS object_tags (
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                tags TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (bucket, key)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bucket_acl (
                bucket TEXT PRIMARY KEY,
                acl TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS object_acl (
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                acl TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (bucket, key)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bucket_cors (
                bucket TEXT PRIMARY KEY,
                configuration TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bucket_encryption (
                bucket TEXT PRIMARY KEY,
                configuration TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bucket_lifecycle (
                bucket TEXT PRIMARY KEY,
                configuration TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bucket_policy (
                bucket TEXT PRIMARY KEY,
                policy_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bucket_website (
                bucket TEXT PRIMARY KEY,
                configuration TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bucket_object_lock (
                bucket TEXT PRIMARY KEY,
                configuration TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS object_retention (
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                retention TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (bucket, key)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS object_legal_hold (
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                status TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (bucket, key)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_objects_bucket_key ON objects(bucket, key)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_versions_bucket_key
                ON object_versions(bucket, key, version_id)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_uploads_bucket_key
                ON multipart_uploads(bucket, key, upload_id)
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }

        info!("Metadata store initialized");
        Ok(())
    }

    // Bucket operations

    pub async fn create_bucket(&self, bucket: &Bucket) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO buckets (name, region, object_lock_enabled, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&bucket.name)
        .bind(&bucket.region)
        .bind(bucket.object_lock_enabled)
        .bind(bucket.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                Error::BucketAlreadyOwnedByYou
            } else {
                db_err(e)
            }
        })?;

        if bucket.versioning.was_ever_enabled() {
            if let Err(e) = self
                .set_bucket_versioning(&bucket.name, bucket.versioning)
                .await
            {
                // A half-created locked bucket must not survive
                let _ = sqlx::query(r#"DELETE FROM buckets WHERE name = ?"#)
                    .bind(&bucket.name)
                    .execute(&self.pool)
                    .await;
                return Err(e);
            }
        }

        debug!("Created bucket: {}", bucket.name);
        Ok(())
    }

    pub async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>> {
        let row: Option<(String, String, bool, String)> = sqlx::query_as(
            r#"
            SELECT name, region, object_lock_enabled, created_at
            FROM buckets WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(r) = row else {
            return Ok(None);
        };

        let versioning = self
            .get_bucket_versioning(&r.0)
            .await?
            .unwrap_or(VersioningStatus::Unversioned);

        Ok(Some(Bucket {
            name: r.0,
            region: r.1,
            object_lock_enabled: r.2,
            created_at: parse_ts(&r.3),
            versioning,
        }))
    }

    pub async fn bucket_exists(&self, name: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(r#"SELECT 1 FROM buckets WHERE name = ?"#)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM buckets WHERE name = ?"#)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        // Per-bucket satellite rows (no FK on these tables)
        for table in [
            "bucket_versioning",
            "bucket_tags",
            "bucket_acl",
            "bucket_cors",
            "bucket_encryption",
            "bucket_lifecycle",
            "bucket_policy",
            "bucket_website",
            "bucket_object_lock",
        ] {
            sqlx::query(&format!("DELETE FROM {} WHERE bucket = ?", table))
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }

        debug!("Deleted bucket: {}", name);
        Ok(())
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"SELECT name, created_at FROM buckets ORDER BY name"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| BucketInfo {
                name: r.0,
                creation_date: parse_ts(&r.1),
            })
            .collect())
    }

    /// Count current objects and versions in a bucket (the delete-bucket
    /// emptiness check counts both).
    pub async fn count_objects(&self, bucket: &str) -> Result<i64> {
        let current: (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM objects WHERE bucket = ?"#)
            .bind(bucket)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let versions: (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM object_versions WHERE bucket = ?"#)
                .bind(bucket)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(current.0 + versions.0)
    }

    pub async fn count_uploads(&self, bucket: &str) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM multipart_uploads WHERE bucket = ?"#)
                .bind(bucket)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(count.0)
    }

    pub async fn set_bucket_versioning(
        &self,
        bucket: &str,
        status: VersioningStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bucket_versioning (bucket, status, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(bucket) DO UPDATE SET status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(bucket)
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("Set bucket {} versioning to {:?}", bucket, status);
        Ok(())
    }

    pub async fn get_bucket_versioning(&self, bucket: &str) -> Result<Option<VersioningStatus>> {
        let row: Option<(String,)> =
            sqlx::query_as(r#"SELECT status FROM bucket_versioning WHERE bucket = ?"#)
                .bind(bucket)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(row.map(|r| VersioningStatus::parse(&r.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_round_trip() {
        let store = MetadataStore::in_memory().await.unwrap();

        let bucket = Bucket::new("test-bucket".into());
        store.create_bucket(&bucket).await.unwrap();

        assert!(store.bucket_exists("test-bucket").await.unwrap());
        let fetched = store.get_bucket("test-bucket").await.unwrap().unwrap();
        assert_eq!(fetched.name, "test-bucket");
        assert_eq!(fetched.versioning, VersioningStatus::Unversioned);

        assert!(store.get_bucket("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_bucket_rejected() {
        let store = MetadataStore::in_memory().await.unwrap();
        let bucket = Bucket::new("dup".into());
        store.create_bucket(&bucket).await.unwrap();
        assert!(matches!(
            store.create_bucket(&bucket).await,
            Err(Error::BucketAlreadyOwnedByYou)
        ));
    }

    #[tokio::test]
    async fn test_list_buckets_sorted() {
        let store = MetadataStore::in_memory().await.unwrap();
        for name in ["zebra", "alpha", "mango"] {
            store.create_bucket(&Bucket::new(name.into())).await.unwrap();
        }
        let names: Vec<String> = store
            .list_buckets()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mango", "zebra"]);
    }

    #[tokio::test]
    async fn test_versioning_state() {
        let store = MetadataStore::in_memory().await.unwrap();
        store
            .create_bucket(&Bucket::new("versioned".into()))
            .await
            .unwrap();

        assert!(store
            .get_bucket_versioning("versioned")
            .await
            .unwrap()
            .is_none());

        store
            .set_bucket_versioning("versioned", VersioningStatus::Enabled)
            .await
            .unwrap();
        assert_eq!(
            store.get_bucket_versioning("versioned").await.unwrap(),
            Some(VersioningStatus::Enabled)
        );

        store
            .set_bucket_versioning("versioned", VersioningStatus::Suspended)
            .await
            .unwrap();
        assert_eq!(
            store.get_bucket("versioned").await.unwrap().unwrap().versioning,
            VersioningStatus::Suspended
        );
    }
}
