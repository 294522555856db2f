//! Storage engine capability surface
//!
//! `Storage` is the contract layer between the HTTP handlers and
//! persistence. Two implementations exist: [`fs::FsStorage`] (filesystem
//! blobs + SQLite metadata) and [`memory::MemStorage`] (for tests).

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use silo_core::types::{
    AccessControlList, Bucket, BucketInfo, ByteRange, CorsConfiguration, DeleteMarkerEntry,
    EncryptionConfiguration, LegalHold, LifecycleConfiguration, ListMultipartUploadsPage,
    ListObjectsPage, ListPartsPage, ListVersionsPage, MetadataDirective, MultipartUpload,
    ObjectLockConfiguration, ObjectRecord, ObjectVersionEntry, Owner, Retention, TagSet,
    UploadPart, VersioningStatus, WebsiteConfiguration,
};
use silo_core::Result;
use std::collections::HashMap;
use tokio::io::AsyncRead;

/// A streaming object body; the caller reads to EOF and drops.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, Default)]
pub struct PutObjectOptions {
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub tags: Option<TagSet>,
}

#[derive(Debug, Clone)]
pub struct PutObjectResult {
    pub etag: String,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeleteObjectResult {
    pub delete_marker: bool,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CopyObjectOptions {
    pub directive: MetadataDirective,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListObjectsV2Params {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub max_keys: i32,
    pub continuation_token: Option<String>,
    pub start_after: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListVersionsParams {
    pub prefix: String,
    pub key_marker: Option<String>,
    pub version_id_marker: Option<String>,
    pub max_keys: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ListPartsParams {
    pub max_parts: i32,
    pub part_number_marker: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct ListUploadsParams {
    pub prefix: String,
    pub max_uploads: i32,
    pub key_marker: Option<String>,
    pub upload_id_marker: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

#[derive(Debug, Clone)]
pub struct ObjectIdentifier {
    pub key: String,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeletedObject {
    pub key: String,
    pub version_id: Option<String>,
    pub delete_marker: bool,
    pub delete_marker_version_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FailedDelete {
    pub key: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteObjectsResult {
    pub deleted: Vec<DeletedObject>,
    pub errors: Vec<FailedDelete>,
}

/// The storage capability set. Every operation returns a typed error from
/// the silo-core taxonomy; handlers translate to wire codes.
#[async_trait]
pub trait Storage: Send + Sync {
    // Buckets
    async fn create_bucket(&self, name: &str, object_lock: bool) -> Result<()>;
    async fn head_bucket(&self, name: &str) -> Result<Bucket>;
    async fn delete_bucket(&self, name: &str) -> Result<()>;
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    // Objects
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        opts: PutObjectOptions,
    ) -> Result<PutObjectResult>;
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<(ObjectRecord, ByteStream)>;
    /// Ranged read: resolves `range` against the object size and returns a
    /// body bounded to the inclusive `(start, end)` pair it also returns.
    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        range: ByteRange,
    ) -> Result<(ObjectRecord, ByteStream, (i64, i64))>;
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectRecord>;
    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<DeleteObjectResult>;
    async fn delete_objects(
        &self,
        bucket: &str,
        objects: Vec<ObjectIdentifier>,
    ) -> Result<DeleteObjectsResult>;
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        opts: CopyObjectOptions,
    ) -> Result<ObjectRecord>;
    async fn list_objects_v2(
        &self,
        bucket: &str,
        params: ListObjectsV2Params,
    ) -> Result<ListObjectsPage>;
    async fn list_object_versions(
        &self,
        bucket: &str,
        params: ListVersionsParams,
    ) -> Result<ListVersionsPage>;

    // Multipart
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<MultipartUpload>;
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String>;
    async fn upload_part_copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        range: Option<ByteRange>,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
    ) -> Result<UploadPart>;
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<ObjectRecord>;
    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str)
        -> Result<()>;
    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        params: ListPartsParams,
    ) -> Result<(MultipartUpload, ListPartsPage)>;
    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        params: ListUploadsParams,
    ) -> Result<ListMultipartUploadsPage>;

    // Versioning
    async fn put_bucket_versioning(&self, bucket: &str, status: VersioningStatus) -> Result<()>;
    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningStatus>;

    // Tagging
    async fn put_bucket_tagging(&self, bucket: &str, tags: TagSet) -> Result<()>;
    async fn get_bucket_tagging(&self, bucket: &str) -> Result<TagSet>;
    async fn delete_bucket_tagging(&self, bucket: &str) -> Result<()>;
    async fn put_object_tagging(&self, bucket: &str, key: &str, tags: TagSet) -> Result<()>;
    async fn get_object_tagging(&self, bucket: &str, key: &str) -> Result<TagSet>;
    async fn delete_object_tagging(&self, bucket: &str, key: &str) -> Result<()>;

    // ACLs
    async fn put_bucket_acl(&self, bucket: &str, acl: AccessControlList) -> Result<()>;
    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlList>;
    async fn put_object_acl(&self, bucket: &str, key: &str, acl: AccessControlList)
        -> Result<()>;
    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlList>;

    // CORS
    async fn put_bucket_cors(&self, bucket: &str, cors: CorsConfiguration) -> Result<()>;
    async fn get_bucket_cors(&self, bucket: &str) -> Result<CorsConfiguration>;
    async fn delete_bucket_cors(&self, bucket: &str) -> Result<()>;

    // Lifecycle
    async fn put_bucket_lifecycle(
        &self,
        bucket: &str,
        config: LifecycleConfiguration,
    ) -> Result<()>;
    async fn get_bucket_lifecycle(&self, bucket: &str) -> Result<LifecycleConfiguration>;
    async fn delete_bucket_lifecycle(&self, bucket: &str) -> Result<()>;

    // Encryption
    async fn put_bucket_encryption(
        &self,
        bucket: &str,
        config: EncryptionConfiguration,
    ) -> Result<()>;
    async fn get_bucket_encryption(&self, bucket: &str) -> Result<EncryptionConfiguration>;
    async fn delete_bucket_encryption(&self, bucket: &str) -> Result<()>;

    // Policy
    async fn put_bucket_policy(&self, bucket: &str, policy: String) -> Result<()>;
    async fn get_bucket_policy(&self, bucket: &str) -> Result<String>;
    async fn delete_bucket_policy(&self, bucket: &str) -> Result<()>;

    // Website
    async fn put_bucket_website(&self, bucket: &str, config: WebsiteConfiguration) -> Result<()>;
    async fn get_bucket_website(&self, bucket: &str) -> Result<WebsiteConfiguration>;
    async fn delete_bucket_website(&self, bucket: &str) -> Result<()>;

    // Object lock
    async fn put_object_lock_configuration(
        &self,
        bucket: &str,
        config: ObjectLockConfiguration,
    ) -> Result<()>;
    async fn get_object_lock_configuration(&self, bucket: &str)
        -> Result<ObjectLockConfiguration>;
    async fn put_object_retention(
        &self,
        bucket: &str,
        key: &str,
        retention: Retention,
    ) -> Result<()>;
    async fn get_object_retention(&self, bucket: &str, key: &str) -> Result<Retention>;
    async fn put_object_legal_hold(&self, bucket: &str, key: &str, hold: LegalHold)
        -> Result<()>;
    async fn get_object_legal_hold(&self, bucket: &str, key: &str) -> Result<LegalHold>;

    /// The canonical owner reported in listings and default ACLs.
    fn owner(&self) -> Owner;
}

/// Fold a key-ordered row set into one ListObjectsV2 page: group keys that
/// share a delimiter segment after the prefix into common prefixes, advance
/// past the cursor, and cap at `max_keys` entries (contents plus prefixes).
/// The continuation token is the last key consumed by an emitted entry, so
/// repeated calls reconstruct the full listing without duplicates.
pub(crate) fn fold_object_listing(
    rows: Vec<ObjectRecord>,
    prefix: &str,
    delimiter: Option<&str>,
    max_keys: i32,
    after: Option<&str>,
) -> ListObjectsPage {
    let mut contents = Vec::new();
    let mut common_prefixes: Vec<String> = Vec::new();
    let mut emitted = 0;
    let mut is_truncated = false;
    let mut last_consumed: Option<String> = None;

    let mut iter = rows.into_iter().peekable();
    while let Some(obj) = iter.next() {
        if let Some(marker) = after {
            if obj.key.as_str() <= marker {
                continue;
            }
        }

        if emitted >= max_keys {
            is_truncated = true;
            break;
        }

        if let Some(delim) = delimiter.filter(|d| !d.is_empty()) {
            let rest = &obj.key[prefix.len()..];
            if let Some(idx) = rest.find(delim) {
                let common = format!("{}{}{}", prefix, &rest[..idx], delim);
                last_consumed = Some(obj.key.clone());
                // Consume every following key under this common prefix
                while let Some(next) = iter.peek() {
                    if next.key.starts_with(&common) {
                        last_consumed = Some(next.key.clone());
                        iter.next();
                    } else {
                        break;
                    }
                }
                common_prefixes.push(common);
                emitted += 1;
                continue;
            }
        }

        last_consumed = Some(obj.key.clone());
        contents.push(obj);
        emitted += 1;
    }

    ListObjectsPage {
        contents,
        common_prefixes,
        is_truncated,
        next_continuation_token: if is_truncated { last_consumed } else { None },
    }
}

/// Fold version rows ordered by `(key, last_modified DESC)` into one
/// ListObjectVersions page. The first row of each key is the latest.
pub(crate) fn fold_version_listing(
    rows: Vec<ObjectRecord>,
    key_marker: Option<&str>,
    version_id_marker: Option<&str>,
    max_keys: i32,
    owner: &Owner,
) -> ListVersionsPage {
    let mut versions = Vec::new();
    let mut delete_markers = Vec::new();
    let mut emitted = 0;
    let mut is_truncated = false;
    let mut next_key_marker = None;
    let mut next_version_id_marker = None;

    let mut prev_key: Option<String> = None;
    // With a version-id marker the cursor points inside key_marker's version
    // list; without one, the whole marker key is skipped.
    let mut skipping_versions = version_id_marker.is_some();

    for row in rows {
        if let Some(marker) = key_marker {
            if row.key.as_str() < marker {
                continue;
            }
            if row.key.as_str() == marker {
                if version_id_marker.is_none() {
                    continue;
                }
                if skipping_versions {
                    if row.version_id == version_id_marker.unwrap_or_default() {
                        skipping_versions = false;
                    }
                    continue;
                }
            }
        }

        if emitted >= max_keys {
            is_truncated = true;
            break;
        }

        let is_latest = prev_key.as_deref() != Some(row.key.as_str());
        prev_key = Some(row.key.clone());

        next_key_marker = Some(row.key.clone());
        next_version_id_marker = Some(row.version_id.clone());

        if row.is_delete_marker {
            delete_markers.push(DeleteMarkerEntry {
                key: row.key,
                version_id: row.version_id,
                is_latest,
                last_modified: row.last_modified,
                owner: Some(owner.clone()),
            });
        } else {
            versions.push(ObjectVersionEntry {
                key: row.key,
                version_id: row.version_id,
                is_latest,
                last_modified: row.last_modified,
                etag: row.etag,
                size: row.size,
                owner: Some(owner.clone()),
            });
        }
        emitted += 1;
    }

    ListVersionsPage {
        versions,
        delete_markers,
        is_truncated,
        next_key_marker: if is_truncated { next_key_marker } else { None },
        next_version_id_marker: if is_truncated { next_version_id_marker } else { None },
    }
}

/// Page a part list (already ordered by part number) past the marker.
pub(crate) fn fold_part_listing(
    parts: Vec<UploadPart>,
    part_number_marker: Option<i32>,
    max_parts: i32,
) -> ListPartsPage {
    let marker = part_number_marker.unwrap_or(0);
    let mut page: Vec<UploadPart> = Vec::new();
    let mut is_truncated = false;

    for part in parts {
        if part.part_number <= marker {
            continue;
        }
        if page.len() as i32 >= max_parts {
            is_truncated = true;
            break;
        }
        page.push(part);
    }

    let next_part_number_marker = if is_truncated {
        page.last().map(|p| p.part_number)
    } else {
        None
    };

    ListPartsPage {
        parts: page,
        is_truncated,
        next_part_number_marker,
    }
}

/// Page an upload list (already ordered by `(key, upload_id)`) past the
/// `(key_marker, upload_id_marker)` cursor.
pub(crate) fn fold_upload_listing(
    uploads: Vec<MultipartUpload>,
    key_marker: Option<&str>,
    upload_id_marker: Option<&str>,
    max_uploads: i32,
) -> ListMultipartUploadsPage {
    let mut page: Vec<MultipartUpload> = Vec::new();
    let mut is_truncated = false;

    for upload in uploads {
        if let Some(marker) = key_marker {
            match upload.key.as_str().cmp(marker) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => {
                    if upload_id_marker.map_or(true, |m| upload.upload_id.as_str() <= m) {
                        continue;
                    }
                }
                std::cmp::Ordering::Greater => {}
            }
        }
        if page.len() as i32 >= max_uploads {
            is_truncated = true;
            break;
        }
        page.push(upload);
    }

    let (next_key_marker, next_upload_id_marker) = if is_truncated {
        match page.last() {
            Some(last) => (Some(last.key.clone()), Some(last.upload_id.clone())),
            None => (None, None),
        }
    } else {
        (None, None)
    };

    ListMultipartUploadsPage {
        uploads: page,
        is_truncated,
        next_key_marker,
        next_upload_id_marker,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obj(key: &str) -> ObjectRecord {
        ObjectRecord::new("b".into(), key.into(), 1, "e".into(), "text/plain".into())
    }

    fn rows(keys: &[&str]) -> Vec<ObjectRecord> {
        let mut keys: Vec<&str> = keys.to_vec();
        keys.sort_unstable();
        keys.into_iter().map(obj).collect()
    }

    #[test]
    fn test_delimiter_folding() {
        let page = fold_object_listing(
            rows(&["images/a.jpg", "images/b.jpg", "docs/f.txt", "root.txt"]),
            "",
            Some("/"),
            1000,
            None,
        );
        let keys: Vec<&str> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["root.txt"]);
        assert_eq!(page.common_prefixes, vec!["docs/", "images/"]);
        assert!(!page.is_truncated);
    }

    #[test]
    fn test_prefix_with_delimiter() {
        let page = fold_object_listing(
            rows(&["photos/2024/a.jpg", "photos/2024/b.jpg", "photos/c.jpg"]),
            "photos/",
            Some("/"),
            1000,
            None,
        );
        assert_eq!(page.common_prefixes, vec!["photos/2024/"]);
        assert_eq!(page.contents.len(), 1);
        assert_eq!(page.contents[0].key, "photos/c.jpg");
    }

    #[test]
    fn test_pagination_reconstructs_full_listing() {
        let all = ["a/1", "a/2", "b", "c/1", "d", "e/9"];
        let mut contents = Vec::new();
        let mut prefixes = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = fold_object_listing(rows(&all), "", Some("/"), 2, token.as_deref());
            contents.extend(page.contents.into_iter().map(|o| o.key));
            prefixes.extend(page.common_prefixes);
            if !page.is_truncated {
                break;
            }
            token = page.next_continuation_token;
            assert!(token.is_some());
        }

        assert_eq!(contents, vec!["b", "d"]);
        assert_eq!(prefixes, vec!["a/", "c/", "e/"]);
    }

    #[test]
    fn test_start_after() {
        let page = fold_object_listing(rows(&["a", "b", "c"]), "", None, 1000, Some("a"));
        let keys: Vec<&str> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn test_truncation_token_is_last_key() {
        let page = fold_object_listing(rows(&["a", "b", "c"]), "", None, 2, None);
        assert!(page.is_truncated);
        assert_eq!(page.next_continuation_token.as_deref(), Some("b"));
    }

    #[test]
    fn test_part_listing_pagination() {
        let parts: Vec<UploadPart> = (1..=5)
            .map(|n| UploadPart {
                part_number: n,
                size: 1,
                etag: "e".into(),
                last_modified: Utc::now(),
            })
            .collect();

        let page = fold_part_listing(parts.clone(), None, 2);
        assert_eq!(page.parts.len(), 2);
        assert!(page.is_truncated);
        assert_eq!(page.next_part_number_marker, Some(2));

        let page = fold_part_listing(parts, Some(2), 100);
        assert_eq!(page.parts.first().map(|p| p.part_number), Some(3));
        assert!(!page.is_truncated);
    }

    #[test]
    fn test_version_listing_latest_flag() {
        let mut v2 = obj("k").with_version("v2".into());
        v2.last_modified = Utc::now();
        let mut v1 = obj("k").with_version("v1".into());
        v1.last_modified = Utc::now() - chrono::Duration::seconds(10);

        let owner = Owner::new("silo");
        let page = fold_version_listing(vec![v2, v1], None, None, 1000, &owner);
        assert_eq!(page.versions.len(), 2);
        assert!(page.versions[0].is_latest);
        assert!(!page.versions[1].is_latest);
    }
}
