//! Filesystem + SQLite storage backend
//!
//! Composes the metadata store and the blob store into the S3 data model.
//! The metadata store is the source of truth for what exists; the blob
//! store holds the bytes. Writes go bytes-first then metadata, with
//! rollback of the bytes when the metadata write fails. Per-upload
//! consistency comes from the metadata store's existence checks: Complete
//! and Abort delete the upload row, after which part writes fail with
//! NoSuchUpload.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use silo_core::types::{
    AccessControlList, Bucket, BucketInfo, ByteRange, CorsConfiguration,
    EncryptionConfiguration, LegalHold, LifecycleConfiguration, ListMultipartUploadsPage,
    ListObjectsPage, ListPartsPage, ListVersionsPage, MetadataDirective, MultipartUpload,
    ObjectLockConfiguration, ObjectRecord, Owner, Retention, TagSet, UploadPart,
    VersioningStatus, WebsiteConfiguration,
};
use silo_core::utils::{generate_version_id, unquote_etag};
use silo_core::{Error, Result, MAX_POLICY_SIZE};
use silo_crypto::multipart_etag;
use silo_metadata::MetadataStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::blob::BlobStore;
use crate::engine::{
    fold_object_listing, fold_part_listing, fold_upload_listing, fold_version_listing,
    ByteStream, CompletedPart, CopyObjectOptions, DeleteObjectResult, DeleteObjectsResult,
    DeletedObject, FailedDelete, ListObjectsV2Params, ListPartsParams, ListUploadsParams,
    ListVersionsParams, ObjectIdentifier, PutObjectOptions, PutObjectResult, Storage,
};

pub struct FsStorage {
    meta: Arc<MetadataStore>,
    blobs: Arc<BlobStore>,
    owner: Owner,
}

impl FsStorage {
    pub fn new(meta: Arc<MetadataStore>, blobs: Arc<BlobStore>, owner: Owner) -> Self {
        Self { meta, blobs, owner }
    }

    async fn require_bucket(&self, name: &str) -> Result<Bucket> {
        self.meta
            .get_bucket(name)
            .await?
            .ok_or(Error::NoSuchBucket)
    }

    async fn require_object(&self, bucket: &str, key: &str) -> Result<ObjectRecord> {
        self.meta
            .get_object(bucket, key)
            .await?
            .ok_or(Error::NoSuchKey)
    }

    /// Fetch the upload and check it belongs to `(bucket, key)`.
    async fn require_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<MultipartUpload> {
        let upload = self
            .meta
            .get_multipart_upload(upload_id)
            .await?
            .ok_or(Error::NoSuchUpload)?;
        if upload.bucket != bucket || upload.key != key {
            return Err(Error::NoSuchUpload);
        }
        Ok(upload)
    }

    /// Mirror the just-written canonical file into the versions area and
    /// record the version row. Returns the new version id.
    async fn record_version(&self, record: &ObjectRecord) -> Result<String> {
        let version_id = generate_version_id();
        let canonical = self.blobs.object_path(&record.bucket, &record.key);
        let versioned = self
            .blobs
            .version_path(&record.bucket, &record.key, &version_id);

        self.blobs.copy(&canonical, &versioned).await?;

        let mut version = record.clone();
        version.version_id = version_id.clone();
        if let Err(e) = self.meta.put_object_version(&version).await {
            let _ = self.blobs.remove(&versioned).await;
            return Err(e);
        }

        Ok(version_id)
    }

    async fn lookup_record(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectRecord> {
        self.require_bucket(bucket).await?;

        match version_id {
            Some(vid) => {
                let record = self
                    .meta
                    .get_object_version(bucket, key, vid)
                    .await?
                    .ok_or(Error::NoSuchKey)?;
                if record.is_delete_marker {
                    return Err(Error::NoSuchKey);
                }
                Ok(record)
            }
            None => self.require_object(bucket, key).await,
        }
    }

    fn data_path(&self, record: &ObjectRecord, version_id: Option<&str>) -> std::path::PathBuf {
        match version_id {
            Some(vid) => self.blobs.version_path(&record.bucket, &record.key, vid),
            None => self.blobs.object_path(&record.bucket, &record.key),
        }
    }

    /// Validate the cited parts against the stored set: strictly increasing
    /// part numbers, every ETag matching. Returns the stored parts in cited
    /// order.
    async fn validate_completed_parts(
        &self,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<Vec<UploadPart>> {
        if parts.is_empty() {
            return Err(Error::InvalidPart("Part list is empty".into()));
        }

        let stored = self.meta.list_parts(upload_id).await?;
        let by_number: HashMap<i32, &UploadPart> =
            stored.iter().map(|p| (p.part_number, p)).collect();

        let mut previous = 0;
        let mut resolved = Vec::with_capacity(parts.len());
        for cited in parts {
            if cited.part_number <= previous {
                return Err(Error::InvalidPartOrder);
            }
            previous = cited.part_number;

            let stored_part = by_number.get(&cited.part_number).ok_or_else(|| {
                Error::InvalidPart(format!("Part {} was not uploaded", cited.part_number))
            })?;
            if unquote_etag(&cited.etag) != stored_part.etag {
                return Err(Error::InvalidPart(format!(
                    "ETag mismatch for part {}",
                    cited.part_number
                )));
            }
            resolved.push((*stored_part).clone());
        }

        Ok(resolved)
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn create_bucket(&self, name: &str, object_lock: bool) -> Result<()> {
        Bucket::validate_name(name)?;

        let mut bucket = Bucket::new(name.to_string());
        if object_lock {
            bucket = bucket.with_object_lock();
        }

        self.meta.create_bucket(&bucket).await?;

        if let Err(e) = self.blobs.create_bucket_dir(name).await {
            error!("Failed to create bucket directory for {}: {}", name, e);
            let _ = self.meta.delete_bucket(name).await;
            return Err(e);
        }

        info!("Created bucket {}", name);
        Ok(())
    }

    async fn head_bucket(&self, name: &str) -> Result<Bucket> {
        self.require_bucket(name).await
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.require_bucket(name).await?;

        if self.meta.count_objects(name).await? > 0 || self.meta.count_uploads(name).await? > 0 {
            return Err(Error::BucketNotEmpty);
        }

        self.meta.delete_bucket(name).await?;
        if let Err(e) = self.blobs.remove_bucket_dir(name).await {
            // Metadata row is gone; a leftover directory is logged, not
            // surfaced.
            error!("Failed to remove bucket directory for {}: {}", name, e);
        }

        info!("Deleted bucket {}", name);
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.meta.list_buckets().await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        opts: PutObjectOptions,
    ) -> Result<PutObjectResult> {
        let bucket_record = self.require_bucket(bucket).await?;
        ObjectRecord::validate_key(key)?;

        let path = self.blobs.object_path(bucket, key);
        let etag = self.blobs.write(&path, &body).await?;

        let content_type = opts
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut record = ObjectRecord::new(
            bucket.to_string(),
            key.to_string(),
            body.len() as i64,
            etag.clone(),
            content_type,
        )
        .with_metadata(opts.metadata);

        let version_id = if bucket_record.versioning.was_ever_enabled() {
            let vid = self.record_version(&record).await?;
            record.version_id = vid.clone();
            Some(vid)
        } else {
            None
        };

        if let Err(e) = self.meta.put_object(&record).await {
            let _ = self.blobs.remove(&path).await;
            return Err(e);
        }

        // Tag write after a successful put is non-fatal
        if let Some(tags) = opts.tags {
            if let Err(e) = self.meta.put_object_tags(bucket, key, &tags).await {
                error!("Failed to store tags for {}/{}: {}", bucket, key, e);
            }
        }

        debug!("Put object {}/{} ({} bytes)", bucket, key, body.len());
        Ok(PutObjectResult { etag, version_id })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<(ObjectRecord, ByteStream)> {
        let record = self.lookup_record(bucket, key, version_id).await?;
        let path = self.data_path(&record, version_id);
        let file = self.blobs.open(&path).await?;
        Ok((record, Box::new(file)))
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        range: ByteRange,
    ) -> Result<(ObjectRecord, ByteStream, (i64, i64))> {
        let record = self.lookup_record(bucket, key, version_id).await?;
        let (start, end) = range.resolve(record.size)?;
        let path = self.data_path(&record, version_id);
        let reader = self.blobs.open_range(&path, start, end).await?;
        Ok((record, Box::new(reader), (start, end)))
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectRecord> {
        self.lookup_record(bucket, key, version_id).await
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<DeleteObjectResult> {
        let bucket_record = self.require_bucket(bucket).await?;

        if let Some(vid) = version_id {
            // Remove exactly that version and its backing file
            let version = self.meta.get_object_version(bucket, key, vid).await?;
            self.meta.delete_object_version(bucket, key, vid).await?;
            if version.is_some() {
                self.blobs
                    .remove(&self.blobs.version_path(bucket, key, vid))
                    .await?;
                self.blobs.remove_version_dir_if_empty(bucket, key).await;
            }

            // Drop the current pointer too when it referenced this version
            if let Some(current) = self.meta.get_object(bucket, key).await? {
                if current.version_id == vid {
                    self.meta.delete_object(bucket, key).await?;
                    self.blobs
                        .remove(&self.blobs.object_path(bucket, key))
                        .await?;
                }
            }

            return Ok(DeleteObjectResult {
                delete_marker: false,
                version_id: Some(vid.to_string()),
            });
        }

        if bucket_record.versioning.was_ever_enabled() {
            // Tombstone: insert a delete marker and drop the current pointer
            let marker_id = generate_version_id();
            let mut marker = ObjectRecord::new(
                bucket.to_string(),
                key.to_string(),
                0,
                String::new(),
                String::new(),
            )
            .with_version(marker_id.clone());
            marker.is_delete_marker = true;

            self.meta.put_object_version(&marker).await?;
            self.meta.delete_object(bucket, key).await?;
            self.blobs
                .remove(&self.blobs.object_path(bucket, key))
                .await?;

            return Ok(DeleteObjectResult {
                delete_marker: true,
                version_id: Some(marker_id),
            });
        }

        // Unversioned: absent objects are treated as already deleted
        self.meta.delete_object(bucket, key).await?;
        self.blobs
            .remove(&self.blobs.object_path(bucket, key))
            .await?;

        Ok(DeleteObjectResult {
            delete_marker: false,
            version_id: None,
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: Vec<ObjectIdentifier>,
    ) -> Result<DeleteObjectsResult> {
        self.require_bucket(bucket).await?;

        let mut result = DeleteObjectsResult::default();
        for object in objects {
            match self
                .delete_object(bucket, &object.key, object.version_id.as_deref())
                .await
            {
                Ok(outcome) => result.deleted.push(DeletedObject {
                    key: object.key,
                    version_id: object.version_id,
                    delete_marker: outcome.delete_marker,
                    delete_marker_version_id: if outcome.delete_marker {
                        outcome.version_id
                    } else {
                        None
                    },
                }),
                Err(e) => result.errors.push(FailedDelete {
                    key: object.key,
                    code: e.code().to_string(),
                    message: e.to_string(),
                }),
            }
        }

        Ok(result)
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        opts: CopyObjectOptions,
    ) -> Result<ObjectRecord> {
        let source = self.lookup_record(src_bucket, src_key, None).await?;
        let dst_bucket_record = self.require_bucket(dst_bucket).await?;
        ObjectRecord::validate_key(dst_key)?;

        let src_path = self.blobs.object_path(src_bucket, src_key);
        let dst_path = self.blobs.object_path(dst_bucket, dst_key);

        let mut reader = self.blobs.open(&src_path).await?;
        let (etag, size) = self.blobs.write_from_reader(&dst_path, &mut reader).await?;

        let (content_type, metadata) = match opts.directive {
            MetadataDirective::Copy => (source.content_type.clone(), source.metadata.clone()),
            MetadataDirective::Replace => (
                opts.content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                opts.metadata,
            ),
        };

        let mut record = ObjectRecord::new(
            dst_bucket.to_string(),
            dst_key.to_string(),
            size,
            etag,
            content_type,
        )
        .with_metadata(metadata);

        if dst_bucket_record.versioning.was_ever_enabled() {
            record.version_id = self.record_version(&record).await?;
        }

        if let Err(e) = self.meta.put_object(&record).await {
            let _ = self.blobs.remove(&dst_path).await;
            return Err(e);
        }

        debug!(
            "Copied {}/{} to {}/{}",
            src_bucket, src_key, dst_bucket, dst_key
        );
        Ok(record)
    }

    async fn list_objects_v2(
        &self,
        bucket: &str,
        params: ListObjectsV2Params,
    ) -> Result<ListObjectsPage> {
        self.require_bucket(bucket).await?;

        let rows = self.meta.list_objects(bucket, &params.prefix).await?;
        let after = params
            .continuation_token
            .as_deref()
            .or(params.start_after.as_deref());

        Ok(fold_object_listing(
            rows,
            &params.prefix,
            params.delimiter.as_deref(),
            params.max_keys,
            after,
        ))
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        params: ListVersionsParams,
    ) -> Result<ListVersionsPage> {
        self.require_bucket(bucket).await?;

        let rows = self
            .meta
            .list_object_versions(bucket, &params.prefix)
            .await?;

        Ok(fold_version_listing(
            rows,
            params.key_marker.as_deref(),
            params.version_id_marker.as_deref(),
            params.max_keys,
            &self.owner,
        ))
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<MultipartUpload> {
        self.require_bucket(bucket).await?;
        ObjectRecord::validate_key(key)?;

        let upload = MultipartUpload {
            upload_id: MultipartUpload::generate_upload_id(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            metadata,
            initiated_at: Utc::now(),
        };

        self.meta.create_multipart_upload(&upload).await?;
        if let Err(e) = self.blobs.create_staging_dir(&upload.upload_id).await {
            let _ = self.meta.delete_multipart_upload(&upload.upload_id).await;
            return Err(e);
        }

        info!(
            "Initiated multipart upload {} for {}/{}",
            upload.upload_id, bucket, key
        );
        Ok(upload)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String> {
        MultipartUpload::validate_part_number(part_number)?;
        self.require_upload(bucket, key, upload_id).await?;

        let path = self.blobs.part_path(upload_id, part_number);
        let etag = self.blobs.write(&path, &body).await?;

        let part = UploadPart {
            part_number,
            size: body.len() as i64,
            etag: etag.clone(),
            last_modified: Utc::now(),
        };
        self.meta.put_part(upload_id, &part).await?;

        debug!(
            "Uploaded part {} of {} ({} bytes)",
            part_number,
            upload_id,
            body.len()
        );
        Ok(etag)
    }

    async fn upload_part_copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        range: Option<ByteRange>,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
    ) -> Result<UploadPart> {
        MultipartUpload::validate_part_number(part_number)?;
        self.require_upload(bucket, key, upload_id).await?;
        let source = self.lookup_record(src_bucket, src_key, None).await?;

        let src_path = self.blobs.object_path(src_bucket, src_key);
        let dst_path = self.blobs.part_path(upload_id, part_number);

        let (etag, size) = match range {
            Some(range) => {
                let (start, end) = range.resolve(source.size)?;
                let mut reader = self.blobs.open_range(&src_path, start, end).await?;
                self.blobs.write_from_reader(&dst_path, &mut reader).await?
            }
            None => {
                let mut reader = self.blobs.open(&src_path).await?;
                self.blobs.write_from_reader(&dst_path, &mut reader).await?
            }
        };

        let part = UploadPart {
            part_number,
            size,
            etag,
            last_modified: Utc::now(),
        };
        self.meta.put_part(upload_id, &part).await?;

        Ok(part)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<ObjectRecord> {
        let bucket_record = self.require_bucket(bucket).await?;
        let upload = self.require_upload(bucket, key, upload_id).await?;

        let resolved = self.validate_completed_parts(upload_id, parts).await?;

        let sources: Vec<_> = resolved
            .iter()
            .map(|p| self.blobs.part_path(upload_id, p.part_number))
            .collect();
        let dest = self.blobs.object_path(bucket, key);
        let size = self.blobs.assemble(&dest, &sources).await?;

        let etags: Vec<String> = resolved.iter().map(|p| p.etag.clone()).collect();
        let etag = multipart_etag(&etags);

        let mut record = ObjectRecord::new(
            bucket.to_string(),
            key.to_string(),
            size,
            etag,
            upload.content_type.clone(),
        )
        .with_metadata(upload.metadata.clone());

        if bucket_record.versioning.was_ever_enabled() {
            record.version_id = self.record_version(&record).await?;
        }

        if let Err(e) = self.meta.put_object(&record).await {
            let _ = self.blobs.remove(&dest).await;
            return Err(e);
        }

        // The upload is committed; staging teardown failures are logged
        self.meta.delete_multipart_upload(upload_id).await?;
        if let Err(e) = self.blobs.remove_staging_dir(upload_id).await {
            error!("Failed to remove staging for {}: {}", upload_id, e);
        }

        info!(
            "Completed multipart upload {} for {}/{} ({} parts, {} bytes)",
            upload_id,
            bucket,
            key,
            resolved.len(),
            size
        );
        Ok(record)
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.require_upload(bucket, key, upload_id).await?;

        self.meta.delete_multipart_upload(upload_id).await?;
        self.blobs.remove_staging_dir(upload_id).await?;

        info!("Aborted multipart upload {}", upload_id);
        Ok(())
    }

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        params: ListPartsParams,
    ) -> Result<(MultipartUpload, ListPartsPage)> {
        let upload = self.require_upload(bucket, key, upload_id).await?;
        let parts = self.meta.list_parts(upload_id).await?;
        Ok((
            upload,
            fold_part_listing(parts, params.part_number_marker, params.max_parts),
        ))
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        params: ListUploadsParams,
    ) -> Result<ListMultipartUploadsPage> {
        self.require_bucket(bucket).await?;

        let uploads = self
            .meta
            .list_multipart_uploads_by_bucket(bucket, &params.prefix)
            .await?;

        Ok(fold_upload_listing(
            uploads,
            params.key_marker.as_deref(),
            params.upload_id_marker.as_deref(),
            params.max_uploads,
        ))
    }

    async fn put_bucket_versioning(&self, bucket: &str, status: VersioningStatus) -> Result<()> {
        let bucket_record = self.require_bucket(bucket).await?;

        // Enabled and Suspended are the only reachable states once
        // versioning has been touched; Unset never comes back.
        if status == VersioningStatus::Unversioned {
            return Err(Error::MalformedXml(
                "Versioning status must be Enabled or Suspended".into(),
            ));
        }
        if bucket_record.object_lock_enabled && status == VersioningStatus::Suspended {
            return Err(Error::InvalidRequest(
                "Versioning cannot be suspended on a bucket with Object Lock".into(),
            ));
        }

        self.meta.set_bucket_versioning(bucket, status).await
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningStatus> {
        self.require_bucket(bucket).await?;
        Ok(self
            .meta
            .get_bucket_versioning(bucket)
            .await?
            .unwrap_or(VersioningStatus::Unversioned))
    }

    async fn put_bucket_tagging(&self, bucket: &str, tags: TagSet) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.meta.put_bucket_tags(bucket, &tags).await
    }

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<TagSet> {
        self.require_bucket(bucket).await?;
        self.meta
            .get_bucket_tags(bucket)
            .await?
            .ok_or(Error::NoSuchTagSet)
    }

    async fn delete_bucket_tagging(&self, bucket: &str) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.meta.delete_bucket_tags(bucket).await
    }

    async fn put_object_tagging(&self, bucket: &str, key: &str, tags: TagSet) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.require_object(bucket, key).await?;
        self.meta.put_object_tags(bucket, key, &tags).await
    }

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> Result<TagSet> {
        self.require_bucket(bucket).await?;
        self.require_object(bucket, key).await?;
        // An object without stored tags has an empty tag set, not an error
        Ok(self
            .meta
            .get_object_tags(bucket, key)
            .await?
            .unwrap_or_default())
    }

    async fn delete_object_tagging(&self, bucket: &str, key: &str) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.require_object(bucket, key).await?;
        self.meta.delete_object_tags(bucket, key).await
    }

    async fn put_bucket_acl(&self, bucket: &str, acl: AccessControlList) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.meta.put_bucket_acl(bucket, &acl).await
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlList> {
        self.require_bucket(bucket).await?;
        Ok(self
            .meta
            .get_bucket_acl(bucket)
            .await?
            .unwrap_or_else(|| AccessControlList::default_for(self.owner.clone())))
    }

    async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        acl: AccessControlList,
    ) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.require_object(bucket, key).await?;
        self.meta.put_object_acl(bucket, key, &acl).await
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlList> {
        self.require_bucket(bucket).await?;
        self.require_object(bucket, key).await?;
        Ok(self
            .meta
            .get_object_acl(bucket, key)
            .await?
            .unwrap_or_else(|| AccessControlList::default_for(self.owner.clone())))
    }

    async fn put_bucket_cors(&self, bucket: &str, cors: CorsConfiguration) -> Result<()> {
        self.require_bucket(bucket).await?;
        cors.validate()?;
        self.meta.put_bucket_cors(bucket, &cors).await
    }

    async fn get_bucket_cors(&self, bucket: &str) -> Result<CorsConfiguration> {
        self.require_bucket(bucket).await?;
        self.meta
            .get_bucket_cors(bucket)
            .await?
            .ok_or(Error::NoSuchCorsConfiguration)
    }

    async fn delete_bucket_cors(&self, bucket: &str) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.meta.delete_bucket_cors(bucket).await
    }

    async fn put_bucket_lifecycle(
        &self,
        bucket: &str,
        config: LifecycleConfiguration,
    ) -> Result<()> {
        self.require_bucket(bucket).await?;
        config.validate()?;
        self.meta.put_bucket_lifecycle(bucket, &config).await
    }

    async fn get_bucket_lifecycle(&self, bucket: &str) -> Result<LifecycleConfiguration> {
        self.require_bucket(bucket).await?;
        self.meta
            .get_bucket_lifecycle(bucket)
            .await?
            .ok_or(Error::NoSuchLifecycleConfiguration)
    }

    async fn delete_bucket_lifecycle(&self, bucket: &str) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.meta.delete_bucket_lifecycle(bucket).await
    }

    async fn put_bucket_encryption(
        &self,
        bucket: &str,
        config: EncryptionConfiguration,
    ) -> Result<()> {
        self.require_bucket(bucket).await?;
        config.validate()?;
        self.meta.put_bucket_encryption(bucket, &config).await
    }

    async fn get_bucket_encryption(&self, bucket: &str) -> Result<EncryptionConfiguration> {
        self.require_bucket(bucket).await?;
        self.meta
            .get_bucket_encryption(bucket)
            .await?
            .ok_or(Error::NoSuchEncryptionConfiguration)
    }

    async fn delete_bucket_encryption(&self, bucket: &str) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.meta.delete_bucket_encryption(bucket).await
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: String) -> Result<()> {
        self.require_bucket(bucket).await?;

        if policy.len() > MAX_POLICY_SIZE {
            return Err(Error::MalformedPolicy("Policy exceeds 20 KiB".into()));
        }
        // Stored as an opaque document, but it must at least be JSON
        serde_json::from_str::<serde_json::Value>(&policy)
            .map_err(|e| Error::MalformedPolicy(e.to_string()))?;

        self.meta.put_bucket_policy(bucket, &policy).await
    }

    async fn get_bucket_policy(&self, bucket: &str) -> Result<String> {
        self.require_bucket(bucket).await?;
        self.meta
            .get_bucket_policy(bucket)
            .await?
            .ok_or(Error::NoSuchBucketPolicy)
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.meta.delete_bucket_policy(bucket).await
    }

    async fn put_bucket_website(&self, bucket: &str, config: WebsiteConfiguration) -> Result<()> {
        self.require_bucket(bucket).await?;
        config.validate()?;
        self.meta.put_bucket_website(bucket, &config).await
    }

    async fn get_bucket_website(&self, bucket: &str) -> Result<WebsiteConfiguration> {
        self.require_bucket(bucket).await?;
        self.meta
            .get_bucket_website(bucket)
            .await?
            .ok_or(Error::NoSuchWebsiteConfiguration)
    }

    async fn delete_bucket_website(&self, bucket: &str) -> Result<()> {
        self.require_bucket(bucket).await?;
        self.meta.delete_bucket_website(bucket).await
    }

    async fn put_object_lock_configuration(
        &self,
        bucket: &str,
        config: ObjectLockConfiguration,
    ) -> Result<()> {
        let bucket_record = self.require_bucket(bucket).await?;
        if !bucket_record.object_lock_enabled {
            return Err(Error::InvalidRequest(
                "Object Lock is not enabled for this bucket".into(),
            ));
        }
        self.meta.put_bucket_object_lock(bucket, &config).await
    }

    async fn get_object_lock_configuration(
        &self,
        bucket: &str,
    ) -> Result<ObjectLockConfiguration> {
        let bucket_record = self.require_bucket(bucket).await?;

        match self.meta.get_bucket_object_lock(bucket).await? {
            Some(config) => Ok(config),
            None if bucket_record.object_lock_enabled => Ok(ObjectLockConfiguration {
                object_lock_enabled: Some("Enabled".to_string()),
                rule: None,
            }),
            None => Err(Error::ObjectLockConfigurationNotFound),
        }
    }

    async fn put_object_retention(
        &self,
        bucket: &str,
        key: &str,
        retention: Retention,
    ) -> Result<()> {
        let bucket_record = self.require_bucket(bucket).await?;
        if !bucket_record.object_lock_enabled {
            return Err(Error::InvalidRequest(
                "Object Lock is not enabled for this bucket".into(),
            ));
        }
        self.require_object(bucket, key).await?;
        self.meta.put_object_retention(bucket, key, &retention).await
    }

    async fn get_object_retention(&self, bucket: &str, key: &str) -> Result<Retention> {
        self.require_bucket(bucket).await?;
        self.require_object(bucket, key).await?;
        self.meta
            .get_object_retention(bucket, key)
            .await?
            .ok_or(Error::ObjectLockConfigurationNotFound)
    }

    async fn put_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        hold: LegalHold,
    ) -> Result<()> {
        let bucket_record = self.require_bucket(bucket).await?;
        if !bucket_record.object_lock_enabled {
            return Err(Error::InvalidRequest(
                "Object Lock is not enabled for this bucket".into(),
            ));
        }
        hold.validate()?;
        self.require_object(bucket, key).await?;
        self.meta.put_object_legal_hold(bucket, key, &hold).await
    }

    async fn get_object_legal_hold(&self, bucket: &str, key: &str) -> Result<LegalHold> {
        self.require_bucket(bucket).await?;
        self.require_object(bucket, key).await?;
        self.meta
            .get_object_legal_hold(bucket, key)
            .await?
            .ok_or(Error::ObjectLockConfigurationNotFound)
    }

    fn owner(&self) -> Owner {
        self.owner.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_crypto::md5_hex;
    use tokio::io::AsyncReadExt;

    async fn storage() -> (tempfile::TempDir, FsStorage) {
        let dir = tempfile::tempdir().unwrap();
        let meta = Arc::new(MetadataStore::in_memory().await.unwrap());
        let blobs = Arc::new(BlobStore::new(dir.path()));
        blobs.init().await.unwrap();
        (dir, FsStorage::new(meta, blobs, Owner::new("silo")))
    }

    async fn read_all(mut body: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        body.read_to_end(&mut out).await.unwrap();
        out
    }

    fn put_opts(content_type: &str) -> PutObjectOptions {
        PutObjectOptions {
            content_type: Some(content_type.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("test-bucket", false).await.unwrap();

        let result = storage
            .put_object(
                "test-bucket",
                "k",
                Bytes::from_static(b"Hello, World!"),
                put_opts("text/plain"),
            )
            .await
            .unwrap();
        assert_eq!(result.etag, "65a8e27d8879283831b664bd8b7f0ad4");
        assert!(result.version_id.is_none());

        let (record, body) = storage.get_object("test-bucket", "k", None).await.unwrap();
        assert_eq!(record.size, 13);
        assert_eq!(record.content_type, "text/plain");
        assert_eq!(read_all(body).await, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_range_read() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();
        storage
            .put_object(
                "b",
                "k",
                Bytes::from_static(b"0123456789ABCDEF"),
                put_opts("application/octet-stream"),
            )
            .await
            .unwrap();

        let range = ByteRange::parse("bytes=0-4").unwrap();
        let (record, body, (start, end)) = storage
            .get_object_range("b", "k", None, range)
            .await
            .unwrap();
        assert_eq!((start, end), (0, 4));
        assert_eq!(record.size, 16);
        assert_eq!(read_all(body).await, b"01234");

        let bad = ByteRange::parse("bytes=99-120").unwrap();
        assert!(matches!(
            storage.get_object_range("b", "k", None, bad).await,
            Err(Error::InvalidRange)
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();

        let result = storage.delete_object("b", "ghost", None).await.unwrap();
        assert!(!result.delete_marker);
    }

    #[tokio::test]
    async fn test_bucket_delete_requires_empty() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();
        storage
            .put_object("b", "k", Bytes::from_static(b"x"), PutObjectOptions::default())
            .await
            .unwrap();

        assert!(matches!(
            storage.delete_bucket("b").await,
            Err(Error::BucketNotEmpty)
        ));

        storage.delete_object("b", "k", None).await.unwrap();
        storage.delete_bucket("b").await.unwrap();
        assert!(matches!(
            storage.head_bucket("b").await,
            Err(Error::NoSuchBucket)
        ));
    }

    #[tokio::test]
    async fn test_in_progress_upload_blocks_bucket_delete() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();
        let upload = storage
            .create_multipart_upload("b", "big", None, HashMap::new())
            .await
            .unwrap();

        assert!(matches!(
            storage.delete_bucket("b").await,
            Err(Error::BucketNotEmpty)
        ));

        storage
            .abort_multipart_upload("b", "big", &upload.upload_id)
            .await
            .unwrap();
        storage.delete_bucket("b").await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_preserves_and_replaces_metadata() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("src", false).await.unwrap();
        storage.create_bucket("dst", false).await.unwrap();

        let mut metadata = HashMap::new();
        metadata.insert("team".to_string(), "storage".to_string());
        storage
            .put_object(
                "src",
                "k",
                Bytes::from_static(b"payload"),
                PutObjectOptions {
                    content_type: Some("text/plain".into()),
                    metadata,
                    tags: None,
                },
            )
            .await
            .unwrap();

        let copied = storage
            .copy_object("src", "k", "dst", "k2", CopyObjectOptions::default())
            .await
            .unwrap();
        assert_eq!(copied.metadata.get("team").map(String::as_str), Some("storage"));
        assert_eq!(copied.content_type, "text/plain");
        assert_eq!(copied.etag, md5_hex(b"payload"));

        let mut replaced_meta = HashMap::new();
        replaced_meta.insert("env".to_string(), "prod".to_string());
        let replaced = storage
            .copy_object(
                "src",
                "k",
                "dst",
                "k3",
                CopyObjectOptions {
                    directive: MetadataDirective::Replace,
                    content_type: Some("application/json".into()),
                    metadata: replaced_meta,
                },
            )
            .await
            .unwrap();
        assert!(replaced.metadata.contains_key("env"));
        assert!(!replaced.metadata.contains_key("team"));
        assert_eq!(replaced.content_type, "application/json");

        assert!(matches!(
            storage
                .copy_object("src", "missing", "dst", "k4", CopyObjectOptions::default())
                .await,
            Err(Error::NoSuchKey)
        ));
        assert!(matches!(
            storage
                .copy_object("nope", "k", "dst", "k5", CopyObjectOptions::default())
                .await,
            Err(Error::NoSuchBucket)
        ));
    }

    #[tokio::test]
    async fn test_multipart_complete() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();

        let upload = storage
            .create_multipart_upload("b", "big", Some("video/mp4".into()), HashMap::new())
            .await
            .unwrap();

        let part1 = Bytes::from(vec![b'a'; 5 * 1024 * 1024]);
        let part2 = Bytes::from(vec![b'b'; 1024]);
        let etag1 = storage
            .upload_part("b", "big", &upload.upload_id, 1, part1.clone())
            .await
            .unwrap();
        let etag2 = storage
            .upload_part("b", "big", &upload.upload_id, 2, part2.clone())
            .await
            .unwrap();

        let record = storage
            .complete_multipart_upload(
                "b",
                "big",
                &upload.upload_id,
                &[
                    CompletedPart {
                        part_number: 1,
                        etag: etag1.clone(),
                    },
                    CompletedPart {
                        part_number: 2,
                        etag: etag2.clone(),
                    },
                ],
            )
            .await
            .unwrap();

        assert!(record.etag.ends_with("-2"));
        assert_eq!(record.size, part1.len() as i64 + part2.len() as i64);
        assert_eq!(record.content_type, "video/mp4");
        assert_eq!(record.etag, multipart_etag(&[etag1, etag2]));

        let (_, body) = storage.get_object("b", "big", None).await.unwrap();
        let data = read_all(body).await;
        assert_eq!(data.len(), part1.len() + part2.len());
        assert_eq!(&data[..part1.len()], &part1[..]);
        assert_eq!(&data[part1.len()..], &part2[..]);

        // The upload is gone
        assert!(matches!(
            storage
                .list_parts("b", "big", &upload.upload_id, ListPartsParams::default())
                .await,
            Err(Error::NoSuchUpload)
        ));
    }

    #[tokio::test]
    async fn test_multipart_part_order_enforced() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();

        let upload = storage
            .create_multipart_upload("b", "k", None, HashMap::new())
            .await
            .unwrap();
        let etag1 = storage
            .upload_part("b", "k", &upload.upload_id, 1, Bytes::from_static(b"a"))
            .await
            .unwrap();
        let etag2 = storage
            .upload_part("b", "k", &upload.upload_id, 2, Bytes::from_static(b"b"))
            .await
            .unwrap();

        let out_of_order = [
            CompletedPart {
                part_number: 2,
                etag: etag2,
            },
            CompletedPart {
                part_number: 1,
                etag: etag1,
            },
        ];
        assert!(matches!(
            storage
                .complete_multipart_upload("b", "k", &upload.upload_id, &out_of_order)
                .await,
            Err(Error::InvalidPartOrder)
        ));

        // Failed complete leaves no object
        assert!(matches!(
            storage.head_object("b", "k", None).await,
            Err(Error::NoSuchKey)
        ));
    }

    #[tokio::test]
    async fn test_multipart_etag_mismatch() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();

        let upload = storage
            .create_multipart_upload("b", "k", None, HashMap::new())
            .await
            .unwrap();
        storage
            .upload_part("b", "k", &upload.upload_id, 1, Bytes::from_static(b"a"))
            .await
            .unwrap();

        let wrong = [CompletedPart {
            part_number: 1,
            etag: "deadbeef".into(),
        }];
        assert!(matches!(
            storage
                .complete_multipart_upload("b", "k", &upload.upload_id, &wrong)
                .await,
            Err(Error::InvalidPart(_))
        ));
    }

    #[tokio::test]
    async fn test_abort_removes_staging() {
        let (dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();

        let upload = storage
            .create_multipart_upload("b", "k", None, HashMap::new())
            .await
            .unwrap();
        storage
            .upload_part("b", "k", &upload.upload_id, 1, Bytes::from_static(b"a"))
            .await
            .unwrap();

        let staging = dir.path().join(".uploads").join(&upload.upload_id);
        assert!(staging.exists());

        storage
            .abort_multipart_upload("b", "k", &upload.upload_id)
            .await
            .unwrap();
        assert!(!staging.exists());
        assert!(matches!(
            storage
                .upload_part("b", "k", &upload.upload_id, 2, Bytes::from_static(b"b"))
                .await,
            Err(Error::NoSuchUpload)
        ));
    }

    #[tokio::test]
    async fn test_versioning_flow() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();
        storage
            .put_bucket_versioning("b", VersioningStatus::Enabled)
            .await
            .unwrap();

        let v1 = storage
            .put_object("b", "k", Bytes::from_static(b"v1"), PutObjectOptions::default())
            .await
            .unwrap();
        let v2 = storage
            .put_object("b", "k", Bytes::from_static(b"v2"), PutObjectOptions::default())
            .await
            .unwrap();
        let v1_id = v1.version_id.unwrap();
        assert_ne!(Some(&v1_id), v2.version_id.as_ref());

        // Current read sees the newest write
        let (_, body) = storage.get_object("b", "k", None).await.unwrap();
        assert_eq!(read_all(body).await, b"v2");

        // The first version is still readable by id
        let (_, body) = storage.get_object("b", "k", Some(&v1_id)).await.unwrap();
        assert_eq!(read_all(body).await, b"v1");

        // Unversioned delete inserts a delete marker
        let deleted = storage.delete_object("b", "k", None).await.unwrap();
        assert!(deleted.delete_marker);
        assert!(matches!(
            storage.get_object("b", "k", None).await,
            Err(Error::NoSuchKey)
        ));
        let (_, body) = storage.get_object("b", "k", Some(&v1_id)).await.unwrap();
        assert_eq!(read_all(body).await, b"v1");

        // The marker shows up in the version listing
        let page = storage
            .list_object_versions(
                "b",
                ListVersionsParams {
                    max_keys: 1000,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.versions.len(), 2);
        assert_eq!(page.delete_markers.len(), 1);
        assert!(page.delete_markers[0].is_latest);
    }

    #[tokio::test]
    async fn test_delete_specific_version() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();
        storage
            .put_bucket_versioning("b", VersioningStatus::Enabled)
            .await
            .unwrap();

        let v1 = storage
            .put_object("b", "k", Bytes::from_static(b"v1"), PutObjectOptions::default())
            .await
            .unwrap();
        let v1_id = v1.version_id.unwrap();

        let result = storage.delete_object("b", "k", Some(&v1_id)).await.unwrap();
        assert!(!result.delete_marker);
        assert!(matches!(
            storage.get_object("b", "k", Some(&v1_id)).await,
            Err(Error::NoSuchKey)
        ));
        // Deleting the current version also drops the current pointer
        assert!(matches!(
            storage.get_object("b", "k", None).await,
            Err(Error::NoSuchKey)
        ));
    }

    #[tokio::test]
    async fn test_object_lock_rules() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("plain", false).await.unwrap();
        storage.create_bucket("locked", true).await.unwrap();

        storage
            .put_object("plain", "k", Bytes::from_static(b"x"), PutObjectOptions::default())
            .await
            .unwrap();
        storage
            .put_object("locked", "k", Bytes::from_static(b"x"), PutObjectOptions::default())
            .await
            .unwrap();

        let retention = Retention {
            mode: silo_core::types::RetentionMode::Governance,
            retain_until_date: Utc::now() + chrono::Duration::days(1),
        };

        // Lock operations need the bucket flag
        assert!(matches!(
            storage
                .put_object_retention("plain", "k", retention.clone())
                .await,
            Err(Error::InvalidRequest(_))
        ));
        storage
            .put_object_retention("locked", "k", retention)
            .await
            .unwrap();
        assert!(storage.get_object_retention("locked", "k").await.is_ok());

        // Nothing set yet on another key
        storage
            .put_object("locked", "other", Bytes::from_static(b"y"), PutObjectOptions::default())
            .await
            .unwrap();
        assert!(matches!(
            storage.get_object_retention("locked", "other").await,
            Err(Error::ObjectLockConfigurationNotFound)
        ));

        // Lock-enabled bucket reports an Enabled configuration by default
        let config = storage
            .get_object_lock_configuration("locked")
            .await
            .unwrap();
        assert_eq!(config.object_lock_enabled.as_deref(), Some("Enabled"));
        assert!(matches!(
            storage.get_object_lock_configuration("plain").await,
            Err(Error::ObjectLockConfigurationNotFound)
        ));
    }

    #[tokio::test]
    async fn test_object_tagging_requires_object() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();

        let tags = TagSet::parse_header("a=1").unwrap();
        assert!(matches!(
            storage.put_object_tagging("b", "ghost", tags.clone()).await,
            Err(Error::NoSuchKey)
        ));

        storage
            .put_object("b", "k", Bytes::from_static(b"x"), PutObjectOptions::default())
            .await
            .unwrap();
        storage.put_object_tagging("b", "k", tags.clone()).await.unwrap();
        assert_eq!(storage.get_object_tagging("b", "k").await.unwrap(), tags);
    }

    #[tokio::test]
    async fn test_policy_size_and_shape() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();

        assert!(matches!(
            storage.put_bucket_policy("b", "not json".into()).await,
            Err(Error::MalformedPolicy(_))
        ));

        let huge = format!("{{\"pad\":\"{}\"}}", "x".repeat(MAX_POLICY_SIZE));
        assert!(matches!(
            storage.put_bucket_policy("b", huge).await,
            Err(Error::MalformedPolicy(_))
        ));

        let policy = r#"{"Version":"2012-10-17","Statement":[]}"#;
        storage.put_bucket_policy("b", policy.into()).await.unwrap();
        assert_eq!(storage.get_bucket_policy("b").await.unwrap(), policy);
    }

    #[tokio::test]
    async fn test_listing_with_delimiter() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();
        for key in ["images/a.jpg", "images/b.jpg", "docs/f.txt", "root.txt"] {
            storage
                .put_object("b", key, Bytes::from_static(b"x"), PutObjectOptions::default())
                .await
                .unwrap();
        }

        let page = storage
            .list_objects_v2(
                "b",
                ListObjectsV2Params {
                    delimiter: Some("/".into()),
                    max_keys: 1000,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let keys: Vec<&str> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["root.txt"]);
        assert_eq!(page.common_prefixes, vec!["docs/", "images/"]);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b", false).await.unwrap();

        assert!(storage
            .put_object(
                "b",
                "a/../../etc/passwd",
                Bytes::from_static(b"x"),
                PutObjectOptions::default()
            )
            .await
            .is_err());
    }
}
