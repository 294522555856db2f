//! Per-bucket and per-object configuration records
//!
//! Each configuration kind lives in its own one-row-per-resource table with
//! the document serialized as JSON in a single column. Absence is `None`;
//! the engine maps that to the matching NoSuch… error.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use silo_core::types::{
    AccessControlList, CorsConfiguration, EncryptionConfiguration, LegalHold,
    LifecycleConfiguration, ObjectLockConfiguration, Retention, TagSet, WebsiteConfiguration,
};
use silo_core::{Error, Result};

use crate::store::{db_err, MetadataStore};

impl MetadataStore {
    async fn put_bucket_doc<T: Serialize>(
        &self,
        table: &str,
        column: &str,
        bucket: &str,
        doc: &T,
    ) -> Result<()> {
        let json = serde_json::to_string(doc)
            .map_err(|e| Error::Internal(format!("serialize {}: {}", table, e)))?;

        sqlx::query(&format!(
            "INSERT INTO {table} (bucket, {column}, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(bucket) DO UPDATE SET {column} = excluded.{column}, \
             updated_at = excluded.updated_at"
        ))
        .bind(bucket)
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_bucket_doc<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        bucket: &str,
    ) -> Result<Option<T>> {
        let row: Option<(String,)> =
            sqlx::query_as(&format!("SELECT {column} FROM {table} WHERE bucket = ?"))
                .bind(bucket)
                .fetch_optional(self.pool())
                .await
                .map_err(db_err)?;

        match row {
            Some((json,)) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| Error::Internal(format!("deserialize {}: {}", table, e))),
            None => Ok(None),
        }
    }

    async fn delete_bucket_doc(&self, table: &str, bucket: &str) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {table} WHERE bucket = ?"))
            .bind(bucket)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn put_object_doc<T: Serialize>(
        &self,
        table: &str,
        column: &str,
        bucket: &str,
        key: &str,
        doc: &T,
    ) -> Result<()> {
        let json = serde_json::to_string(doc)
            .map_err(|e| Error::Internal(format!("serialize {}: {}", table, e)))?;

        sqlx::query(&format!(
            "INSERT INTO {table} (bucket, key, {column}, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(bucket, key) DO UPDATE SET {column} = excluded.{column}, \
             updated_at = excluded.updated_at"
        ))
        .bind(bucket)
        .bind(key)
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_object_doc<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        bucket: &str,
        key: &str,
    ) -> Result<Option<T>> {
        let row: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT {column} FROM {table} WHERE bucket = ? AND key = ?"
        ))
        .bind(bucket)
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        match row {
            Some((json,)) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| Error::Internal(format!("deserialize {}: {}", table, e))),
            None => Ok(None),
        }
    }

    async fn delete_object_doc(&self, table: &str, bucket: &str, key: &str) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {table} WHERE bucket = ? AND key = ?"))
            .bind(bucket)
            .bind(key)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // Tags

    pub async fn put_bucket_tags(&self, bucket: &str, tags: &TagSet) -> Result<()> {
        self.put_bucket_doc("bucket_tags", "tags", bucket, tags).await
    }

    pub async fn get_bucket_tags(&self, bucket: &str) -> Result<Option<TagSet>> {
        self.get_bucket_doc("bucket_tags", "tags", bucket).await
    }

    pub async fn delete_bucket_tags(&self, bucket: &str) -> Result<()> {
        self.delete_bucket_doc("bucket_tags", bucket).await
    }

    pub async fn put_object_tags(&self, bucket: &str, key: &str, tags: &TagSet) -> Result<()> {
        self.put_object_doc("object_tags", "tags", bucket, key, tags)
            .await
    }

    pub async fn get_object_tags(&self, bucket: &str, key: &str) -> Result<Option<TagSet>> {
        self.get_object_doc("object_tags", "tags", bucket, key).await
    }

    pub async fn delete_object_tags(&self, bucket: &str, key: &str) -> Result<()> {
        self.delete_object_doc("object_tags", bucket, key).await
    }

    // ACLs

    pub async fn put_bucket_acl(&self, bucket: &str, acl: &AccessControlList) -> Result<()> {
        self.put_bucket_doc("bucket_acl", "acl", bucket, acl).await
    }

    pub async fn get_bucket_acl(&self, bucket: &str) -> Result<Option<AccessControlList>> {
        self.get_bucket_doc("bucket_acl", "acl", bucket).await
    }

    pub async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        acl: &AccessControlList,
    ) -> Result<()> {
        self.put_object_doc("object_acl", "acl", bucket, key, acl).await
    }

    pub async fn get_object_acl(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<AccessControlList>> {
        self.get_object_doc("object_acl", "acl", bucket, key).await
    }

    // CORS

    pub async fn put_bucket_cors(&self, bucket: &str, cors: &CorsConfiguration) -> Result<()> {
        self.put_bucket_doc("bucket_cors", "configuration", bucket, cors)
            .await
    }

    pub async fn get_bucket_cors(&self, bucket: &str) -> Result<Option<CorsConfiguration>> {
        self.get_bucket_doc("bucket_cors", "configuration", bucket).await
    }

    pub async fn delete_bucket_cors(&self, bucket: &str) -> Result<()> {
        self.delete_bucket_doc("bucket_cors", bucket).await
    }

    // Encryption

    pub async fn put_bucket_encryption(
        &self,
        bucket: &str,
        config: &EncryptionConfiguration,
    ) -> Result<()> {
        self.put_bucket_doc("bucket_encryption", "configuration", bucket, config)
            .await
    }

    pub async fn get_bucket_encryption(
        &self,
        bucket: &str,
    ) -> Result<Option<EncryptionConfiguration>> {
        self.get_bucket_doc("bucket_encryption", "configuration", bucket)
            .await
    }

    pub async fn delete_bucket_encryption(&self, bucket: &str) -> Result<()> {
        self.delete_bucket_doc("bucket_encryption", bucket).await
    }

    // Lifecycle

    pub async fn put_bucket_lifecycle(
        &self,
        bucket: &str,
        config: &LifecycleConfiguration,
    ) -> Result<()> {
        self.put_bucket_doc("bucket_lifecycle", "configuration", bucket, config)
            .await
    }

    pub async fn get_bucket_lifecycle(
        &self,
        bucket: &str,
    ) -> Result<Option<LifecycleConfiguration>> {
        self.get_bucket_doc("bucket_lifecycle", "configuration", bucket)
            .await
    }

    pub async fn delete_bucket_lifecycle(&self, bucket: &str) -> Result<()> {
        self.delete_bucket_doc("bucket_lifecycle", bucket).await
    }

    // Policy (stored as the raw JSON document, not re-serialized)

    pub async fn put_bucket_policy(&self, bucket: &str, policy_json: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bucket_policy (bucket, policy_json, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(bucket) DO UPDATE SET policy_json = excluded.policy_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(bucket)
        .bind(policy_json)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_bucket_policy(&self, bucket: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as(r#"SELECT policy_json FROM bucket_policy WHERE bucket = ?"#)
                .bind(bucket)
                .fetch_optional(self.pool())
                .await
                .map_err(db_err)?;
        Ok(row.map(|r| r.0))
    }

    pub async fn delete_bucket_policy(&self, bucket: &str) -> Result<()> {
        self.delete_bucket_doc("bucket_policy", bucket).await
    }

    // Website

    pub async fn put_bucket_website(
        &self,
        bucket: &str,
        config: &WebsiteConfiguration,
    ) -> Result<()> {
        self.put_bucket_doc("bucket_website", "configuration", bucket, config)
            .await
    }

    pub async fn get_bucket_website(&self, bucket: &str) -> Result<Option<WebsiteConfiguration>> {
        self.get_bucket_doc("bucket_website", "configuration", bucket)
            .await
    }

    pub async fn delete_bucket_website(&self, bucket: &str) -> Result<()> {
        self.delete_bucket_doc("bucket_website", bucket).await
    }

    // Object lock

    pub async fn put_bucket_object_lock(
        &self,
        bucket: &str,
        config: &ObjectLockConfiguration,
    ) -> Result<()> {
        self.put_bucket_doc("bucket_object_lock", "configuration", bucket, config)
            .await
    }

    pub async fn get_bucket_object_lock(
        &self,
        bucket: &str,
    ) -> Result<Option<ObjectLockConfiguration>> {
        self.get_bucket_doc("bucket_object_lock", "configuration", bucket)
            .await
    }

    pub async fn put_object_retention(
        &self,
        bucket: &str,
        key: &str,
        retention: &Retention,
    ) -> Result<()> {
        self.put_object_doc("object_retention", "retention", bucket, key, retention)
            .await
    }

    pub async fn get_object_retention(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<Retention>> {
        self.get_object_doc("object_retention", "retention", bucket, key)
            .await
    }

    pub async fn put_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        hold: &LegalHold,
    ) -> Result<()> {
        self.put_object_doc("object_legal_hold", "status", bucket, key, hold)
            .await
    }

    pub async fn get_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<LegalHold>> {
        self.get_object_doc("object_legal_hold", "status", bucket, key)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::types::{Bucket, Tag};

    #[tokio::test]
    async fn test_tag_round_trip() {
        let store = MetadataStore::in_memory().await.unwrap();
        store.create_bucket(&Bucket::new("b".into())).await.unwrap();

        assert!(store.get_bucket_tags("b").await.unwrap().is_none());

        let tags = TagSet::new(vec![Tag::new("env", "prod")]).unwrap();
        store.put_bucket_tags("b", &tags).await.unwrap();
        assert_eq!(store.get_bucket_tags("b").await.unwrap().unwrap(), tags);

        store.delete_bucket_tags("b").await.unwrap();
        assert!(store.get_bucket_tags("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_policy_stored_verbatim() {
        let store = MetadataStore::in_memory().await.unwrap();
        let policy = r#"{"Version":"2012-10-17","Statement":[]}"#;
        store.put_bucket_policy("b", policy).await.unwrap();
        assert_eq!(
            store.get_bucket_policy("b").await.unwrap().as_deref(),
            Some(policy)
        );
        store.delete_bucket_policy("b").await.unwrap();
        assert!(store.get_bucket_policy("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retention_and_hold() {
        let store = MetadataStore::in_memory().await.unwrap();
        use silo_core::types::RetentionMode;

        let retention = Retention {
            mode: RetentionMode::Governance,
            retain_until_date: chrono::Utc::now(),
        };
        store
            .put_object_retention("b", "k", &retention)
            .await
            .unwrap();
        assert!(store.get_object_retention("b", "k").await.unwrap().is_some());
        assert!(store.get_object_retention("b", "other").await.unwrap().is_none());

        let hold = LegalHold { status: "ON".into() };
        store.put_object_legal_hold("b", "k", &hold).await.unwrap();
        assert_eq!(
            store
                .get_object_legal_hold("b", "k")
                .await
                .unwrap()
                .unwrap()
                .status,
            "ON"
        );
    }
}
