//! In-memory storage backend
//!
//! The second implementation of the `Storage` capability set, used by
//! handler and engine tests. Same observable semantics as the filesystem
//! backend for everything the tests exercise, with all state behind one
//! `RwLock`. No lock is held across an await point.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use silo_core::types::{
    AccessControlList, Bucket, BucketInfo, ByteRange, CorsConfiguration,
    EncryptionConfiguration, LegalHold, LifecycleConfiguration, ListMultipartUploadsPage,
    ListObjectsPage, ListPartsPage, ListVersionsPage, MetadataDirective, MultipartUpload,
    ObjectLockConfiguration, ObjectRecord, Owner, Retention, TagSet, UploadPart,
    VersioningStatus, WebsiteConfiguration,
};
use silo_core::utils::{generate_version_id, unquote_etag};
use silo_core::{Error, Result, MAX_POLICY_SIZE};
use silo_crypto::{md5_hex, multipart_etag};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;

use crate::engine::{
    fold_object_listing, fold_part_listing, fold_upload_listing, fold_version_listing,
    ByteStream, CompletedPart, CopyObjectOptions, DeleteObjectResult, DeleteObjectsResult,
    DeletedObject, FailedDelete, ListObjectsV2Params, ListPartsParams, ListUploadsParams,
    ListVersionsParams, ObjectIdentifier, PutObjectOptions, PutObjectResult, Storage,
};

type Key2 = (String, String);
type Key3 = (String, String, String);

#[derive(Default)]
struct MemState {
    buckets: BTreeMap<String, Bucket>,
    objects: BTreeMap<Key2, (ObjectRecord, Bytes)>,
    versions: BTreeMap<Key3, (ObjectRecord, Bytes)>,
    uploads: BTreeMap<String, MultipartUpload>,
    parts: BTreeMap<(String, i32), (UploadPart, Bytes)>,
    bucket_tags: BTreeMap<String, TagSet>,
    object_tags: BTreeMap<Key2, TagSet>,
    bucket_acl: BTreeMap<String, AccessControlList>,
    object_acl: BTreeMap<Key2, AccessControlList>,
    cors: BTreeMap<String, CorsConfiguration>,
    lifecycle: BTreeMap<String, LifecycleConfiguration>,
    encryption: BTreeMap<String, EncryptionConfiguration>,
    policy: BTreeMap<String, String>,
    website: BTreeMap<String, WebsiteConfiguration>,
    object_lock: BTreeMap<String, ObjectLockConfiguration>,
    retention: BTreeMap<Key2, Retention>,
    legal_hold: BTreeMap<Key2, LegalHold>,
}

pub struct MemStorage {
    state: RwLock<MemState>,
    owner: Owner,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new(Owner::new("silo"))
    }
}

impl MemStorage {
    pub fn new(owner: Owner) -> Self {
        Self {
            state: RwLock::new(MemState::default()),
            owner,
        }
    }

    fn stream(data: Bytes) -> ByteStream {
        Box::new(Cursor::new(data))
    }
}

impl MemState {
    fn require_bucket(&self, name: &str) -> Result<&Bucket> {
        self.buckets.get(name).ok_or(Error::NoSuchBucket)
    }

    fn require_object(&self, bucket: &str, key: &str) -> Result<&(ObjectRecord, Bytes)> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or(Error::NoSuchKey)
    }

    fn require_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<MultipartUpload> {
        let upload = self.uploads.get(upload_id).ok_or(Error::NoSuchUpload)?;
        if upload.bucket != bucket || upload.key != key {
            return Err(Error::NoSuchUpload);
        }
        Ok(upload.clone())
    }

    fn lookup(&self, bucket: &str, key: &str, version_id: Option<&str>) -> Result<(ObjectRecord, Bytes)> {
        self.require_bucket(bucket)?;
        match version_id {
            Some(vid) => {
                let (record, data) = self
                    .versions
                    .get(&(bucket.to_string(), key.to_string(), vid.to_string()))
                    .ok_or(Error::NoSuchKey)?;
                if record.is_delete_marker {
                    return Err(Error::NoSuchKey);
                }
                Ok((record.clone(), data.clone()))
            }
            None => {
                let (record, data) = self.require_object(bucket, key)?;
                Ok((record.clone(), data.clone()))
            }
        }
    }

    /// Version rows for a bucket/prefix ordered `(key, last_modified DESC)`.
    fn version_rows(&self, bucket: &str, prefix: &str) -> Vec<ObjectRecord> {
        let mut rows: Vec<ObjectRecord> = self
            .versions
            .iter()
            .filter(|((b, k, _), _)| b == bucket && k.starts_with(prefix))
            .map(|(_, (record, _))| record.clone())
            .collect();
        rows.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then(b.last_modified.cmp(&a.last_modified))
                .then(a.version_id.cmp(&b.version_id))
        });
        rows
    }

    fn remove_object_satellites(&mut self, bucket: &str, key: &str) {
        let k = (bucket.to_string(), key.to_string());
        self.object_tags.remove(&k);
        self.object_acl.remove(&k);
        self.retention.remove(&k);
        self.legal_hold.remove(&k);
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn create_bucket(&self, name: &str, object_lock: bool) -> Result<()> {
        Bucket::validate_name(name)?;

        let mut state = self.state.write();
        if state.buckets.contains_key(name) {
            return Err(Error::BucketAlreadyOwnedByYou);
        }

        let mut bucket = Bucket::new(name.to_string());
        if object_lock {
            bucket = bucket.with_object_lock();
        }
        state.buckets.insert(name.to_string(), bucket);
        Ok(())
    }

    async fn head_bucket(&self, name: &str) -> Result<Bucket> {
        Ok(self.state.read().require_bucket(name)?.clone())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(name)?;

        let has_objects = state.objects.keys().any(|(b, _)| b == name)
            || state.versions.keys().any(|(b, _, _)| b == name);
        let has_uploads = state.uploads.values().any(|u| u.bucket == name);
        if has_objects || has_uploads {
            return Err(Error::BucketNotEmpty);
        }

        state.buckets.remove(name);
        state.bucket_tags.remove(name);
        state.bucket_acl.remove(name);
        state.cors.remove(name);
        state.lifecycle.remove(name);
        state.encryption.remove(name);
        state.policy.remove(name);
        state.website.remove(name);
        state.object_lock.remove(name);
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        Ok(self
            .state
            .read()
            .buckets
            .values()
            .map(|b| BucketInfo {
                name: b.name.clone(),
                creation_date: b.created_at,
            })
            .collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        opts: PutObjectOptions,
    ) -> Result<PutObjectResult> {
        ObjectRecord::validate_key(key)?;

        let mut state = self.state.write();
        let versioned = state.require_bucket(bucket)?.versioning.was_ever_enabled();

        let etag = md5_hex(&body);
        let mut record = ObjectRecord::new(
            bucket.to_string(),
            key.to_string(),
            body.len() as i64,
            etag.clone(),
            opts.content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        )
        .with_metadata(opts.metadata);

        let version_id = if versioned {
            let vid = generate_version_id();
            record.version_id = vid.clone();
            state.versions.insert(
                (bucket.to_string(), key.to_string(), vid.clone()),
                (record.clone(), body.clone()),
            );
            Some(vid)
        } else {
            None
        };

        state
            .objects
            .insert((bucket.to_string(), key.to_string()), (record, body));

        if let Some(tags) = opts.tags {
            state
                .object_tags
                .insert((bucket.to_string(), key.to_string()), tags);
        }

        Ok(PutObjectResult { etag, version_id })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<(ObjectRecord, ByteStream)> {
        let (record, data) = self.state.read().lookup(bucket, key, version_id)?;
        Ok((record, Self::stream(data)))
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        range: ByteRange,
    ) -> Result<(ObjectRecord, ByteStream, (i64, i64))> {
        let (record, data) = self.state.read().lookup(bucket, key, version_id)?;
        let (start, end) = range.resolve(record.size)?;
        let slice = data.slice(start as usize..=end as usize);
        Ok((record, Self::stream(slice), (start, end)))
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectRecord> {
        Ok(self.state.read().lookup(bucket, key, version_id)?.0)
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<DeleteObjectResult> {
        let mut state = self.state.write();
        let versioned = state.require_bucket(bucket)?.versioning.was_ever_enabled();
        let key2 = (bucket.to_string(), key.to_string());

        if let Some(vid) = version_id {
            state
                .versions
                .remove(&(bucket.to_string(), key.to_string(), vid.to_string()));
            if state
                .objects
                .get(&key2)
                .is_some_and(|(record, _)| record.version_id == vid)
            {
                state.objects.remove(&key2);
                state.remove_object_satellites(bucket, key);
            }
            return Ok(DeleteObjectResult {
                delete_marker: false,
                version_id: Some(vid.to_string()),
            });
        }

        if versioned {
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

            state.versions.insert(
                (bucket.to_string(), key.to_string(), marker_id.clone()),
                (marker, Bytes::new()),
            );
            state.objects.remove(&key2);
            state.remove_object_satellites(bucket, key);

            return Ok(DeleteObjectResult {
                delete_marker: true,
                version_id: Some(marker_id),
            });
        }

        state.objects.remove(&key2);
        state.remove_object_satellites(bucket, key);
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
        self.state.read().require_bucket(bucket)?;

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
        ObjectRecord::validate_key(dst_key)?;

        let mut state = self.state.write();
        let (source, data) = state.lookup(src_bucket, src_key, None)?;
        let versioned = state
            .require_bucket(dst_bucket)?
            .versioning
            .was_ever_enabled();

        let (content_type, metadata) = match opts.directive {
            MetadataDirective::Copy => (source.content_type, source.metadata),
            MetadataDirective::Replace => (
                opts.content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                opts.metadata,
            ),
        };

        let mut record = ObjectRecord::new(
            dst_bucket.to_string(),
            dst_key.to_string(),
            data.len() as i64,
            md5_hex(&data),
            content_type,
        )
        .with_metadata(metadata);

        if versioned {
            let vid = generate_version_id();
            record.version_id = vid.clone();
            state.versions.insert(
                (dst_bucket.to_string(), dst_key.to_string(), vid),
                (record.clone(), data.clone()),
            );
        }

        state.objects.insert(
            (dst_bucket.to_string(), dst_key.to_string()),
            (record.clone(), data),
        );
        Ok(record)
    }

    async fn list_objects_v2(
        &self,
        bucket: &str,
        params: ListObjectsV2Params,
    ) -> Result<ListObjectsPage> {
        let state = self.state.read();
        state.require_bucket(bucket)?;

        let rows: Vec<ObjectRecord> = state
            .objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(&params.prefix))
            .map(|(_, (record, _))| record.clone())
            .collect();

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
        let state = self.state.read();
        state.require_bucket(bucket)?;

        let rows = state.version_rows(bucket, &params.prefix);
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
        ObjectRecord::validate_key(key)?;

        let mut state = self.state.write();
        state.require_bucket(bucket)?;

        let upload = MultipartUpload {
            upload_id: MultipartUpload::generate_upload_id(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            metadata,
            initiated_at: Utc::now(),
        };
        state
            .uploads
            .insert(upload.upload_id.clone(), upload.clone());
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

        let mut state = self.state.write();
        state.require_upload(bucket, key, upload_id)?;

        let etag = md5_hex(&body);
        let part = UploadPart {
            part_number,
            size: body.len() as i64,
            etag: etag.clone(),
            last_modified: Utc::now(),
        };
        state
            .parts
            .insert((upload_id.to_string(), part_number), (part, body));
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

        let mut state = self.state.write();
        state.require_upload(bucket, key, upload_id)?;
        let (source, data) = state.lookup(src_bucket, src_key, None)?;

        let data = match range {
            Some(range) => {
                let (start, end) = range.resolve(source.size)?;
                data.slice(start as usize..=end as usize)
            }
            None => data,
        };

        let part = UploadPart {
            part_number,
            size: data.len() as i64,
            etag: md5_hex(&data),
            last_modified: Utc::now(),
        };
        state
            .parts
            .insert((upload_id.to_string(), part_number), (part.clone(), data));
        Ok(part)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<ObjectRecord> {
        if parts.is_empty() {
            return Err(Error::InvalidPart("Part list is empty".into()));
        }

        let mut state = self.state.write();
        let upload = state.require_upload(bucket, key, upload_id)?;
        let versioned = state.require_bucket(bucket)?.versioning.was_ever_enabled();

        let mut previous = 0;
        let mut body = Vec::new();
        let mut etags = Vec::with_capacity(parts.len());
        for cited in parts {
            if cited.part_number <= previous {
                return Err(Error::InvalidPartOrder);
            }
            previous = cited.part_number;

            let (part, data) = state
                .parts
                .get(&(upload_id.to_string(), cited.part_number))
                .ok_or_else(|| {
                    Error::InvalidPart(format!("Part {} was not uploaded", cited.part_number))
                })?;
            if unquote_etag(&cited.etag) != part.etag {
                return Err(Error::InvalidPart(format!(
                    "ETag mismatch for part {}",
                    cited.part_number
                )));
            }
            etags.push(part.etag.clone());
            body.extend_from_slice(data);
        }

        let body = Bytes::from(body);
        let mut record = ObjectRecord::new(
            bucket.to_string(),
            key.to_string(),
            body.len() as i64,
            multipart_etag(&etags),
            upload.content_type.clone(),
        )
        .with_metadata(upload.metadata.clone());

        if versioned {
            let vid = generate_version_id();
            record.version_id = vid.clone();
            state.versions.insert(
                (bucket.to_string(), key.to_string(), vid),
                (record.clone(), body.clone()),
            );
        }

        state
            .objects
            .insert((bucket.to_string(), key.to_string()), (record.clone(), body));
        state.uploads.remove(upload_id);
        state.parts.retain(|(id, _), _| id != upload_id);
        Ok(record)
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        let mut state = self.state.write();
        state.require_upload(bucket, key, upload_id)?;
        state.uploads.remove(upload_id);
        state.parts.retain(|(id, _), _| id != upload_id);
        Ok(())
    }

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        params: ListPartsParams,
    ) -> Result<(MultipartUpload, ListPartsPage)> {
        let state = self.state.read();
        let upload = state.require_upload(bucket, key, upload_id)?;

        let parts: Vec<UploadPart> = state
            .parts
            .iter()
            .filter(|((id, _), _)| id == upload_id)
            .map(|(_, (part, _))| part.clone())
            .collect();

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
        let state = self.state.read();
        state.require_bucket(bucket)?;

        let mut uploads: Vec<MultipartUpload> = state
            .uploads
            .values()
            .filter(|u| u.bucket == bucket && u.key.starts_with(&params.prefix))
            .cloned()
            .collect();
        uploads.sort_by(|a, b| a.key.cmp(&b.key).then(a.upload_id.cmp(&b.upload_id)));

        Ok(fold_upload_listing(
            uploads,
            params.key_marker.as_deref(),
            params.upload_id_marker.as_deref(),
            params.max_uploads,
        ))
    }

    async fn put_bucket_versioning(&self, bucket: &str, status: VersioningStatus) -> Result<()> {
        if status == VersioningStatus::Unversioned {
            return Err(Error::MalformedXml(
                "Versioning status must be Enabled or Suspended".into(),
            ));
        }

        let mut state = self.state.write();
        let record = state
            .buckets
            .get_mut(bucket)
            .ok_or(Error::NoSuchBucket)?;
        if record.object_lock_enabled && status == VersioningStatus::Suspended {
            return Err(Error::InvalidRequest(
                "Versioning cannot be suspended on a bucket with Object Lock".into(),
            ));
        }
        record.versioning = status;
        Ok(())
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<VersioningStatus> {
        Ok(self.state.read().require_bucket(bucket)?.versioning)
    }

    async fn put_bucket_tagging(&self, bucket: &str, tags: TagSet) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.bucket_tags.insert(bucket.to_string(), tags);
        Ok(())
    }

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<TagSet> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        state
            .bucket_tags
            .get(bucket)
            .cloned()
            .ok_or(Error::NoSuchTagSet)
    }

    async fn delete_bucket_tagging(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.bucket_tags.remove(bucket);
        Ok(())
    }

    async fn put_object_tagging(&self, bucket: &str, key: &str, tags: TagSet) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.require_object(bucket, key)?;
        state
            .object_tags
            .insert((bucket.to_string(), key.to_string()), tags);
        Ok(())
    }

    async fn get_object_tagging(&self, bucket: &str, key: &str) -> Result<TagSet> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        state.require_object(bucket, key)?;
        Ok(state
            .object_tags
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_object_tagging(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.require_object(bucket, key)?;
        state
            .object_tags
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn put_bucket_acl(&self, bucket: &str, acl: AccessControlList) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.bucket_acl.insert(bucket.to_string(), acl);
        Ok(())
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<AccessControlList> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        Ok(state
            .bucket_acl
            .get(bucket)
            .cloned()
            .unwrap_or_else(|| AccessControlList::default_for(self.owner.clone())))
    }

    async fn put_object_acl(
        &self,
        bucket: &str,
        key: &str,
        acl: AccessControlList,
    ) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.require_object(bucket, key)?;
        state
            .object_acl
            .insert((bucket.to_string(), key.to_string()), acl);
        Ok(())
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<AccessControlList> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        state.require_object(bucket, key)?;
        Ok(state
            .object_acl
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .unwrap_or_else(|| AccessControlList::default_for(self.owner.clone())))
    }

    async fn put_bucket_cors(&self, bucket: &str, cors: CorsConfiguration) -> Result<()> {
        cors.validate()?;
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.cors.insert(bucket.to_string(), cors);
        Ok(())
    }

    async fn get_bucket_cors(&self, bucket: &str) -> Result<CorsConfiguration> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        state
            .cors
            .get(bucket)
            .cloned()
            .ok_or(Error::NoSuchCorsConfiguration)
    }

    async fn delete_bucket_cors(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.cors.remove(bucket);
        Ok(())
    }

    async fn put_bucket_lifecycle(
        &self,
        bucket: &str,
        config: LifecycleConfiguration,
    ) -> Result<()> {
        config.validate()?;
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.lifecycle.insert(bucket.to_string(), config);
        Ok(())
    }

    async fn get_bucket_lifecycle(&self, bucket: &str) -> Result<LifecycleConfiguration> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        state
            .lifecycle
            .get(bucket)
            .cloned()
            .ok_or(Error::NoSuchLifecycleConfiguration)
    }

    async fn delete_bucket_lifecycle(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.lifecycle.remove(bucket);
        Ok(())
    }

    async fn put_bucket_encryption(
        &self,
        bucket: &str,
        config: EncryptionConfiguration,
    ) -> Result<()> {
        config.validate()?;
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.encryption.insert(bucket.to_string(), config);
        Ok(())
    }

    async fn get_bucket_encryption(&self, bucket: &str) -> Result<EncryptionConfiguration> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        state
            .encryption
            .get(bucket)
            .cloned()
            .ok_or(Error::NoSuchEncryptionConfiguration)
    }

    async fn delete_bucket_encryption(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.encryption.remove(bucket);
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: String) -> Result<()> {
        if policy.len() > MAX_POLICY_SIZE {
            return Err(Error::MalformedPolicy("Policy exceeds 20 KiB".into()));
        }
        serde_json::from_str::<serde_json::Value>(&policy)
            .map_err(|e| Error::MalformedPolicy(e.to_string()))?;

        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.policy.insert(bucket.to_string(), policy);
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> Result<String> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        state
            .policy
            .get(bucket)
            .cloned()
            .ok_or(Error::NoSuchBucketPolicy)
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.policy.remove(bucket);
        Ok(())
    }

    async fn put_bucket_website(&self, bucket: &str, config: WebsiteConfiguration) -> Result<()> {
        config.validate()?;
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.website.insert(bucket.to_string(), config);
        Ok(())
    }

    async fn get_bucket_website(&self, bucket: &str) -> Result<WebsiteConfiguration> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        state
            .website
            .get(bucket)
            .cloned()
            .ok_or(Error::NoSuchWebsiteConfiguration)
    }

    async fn delete_bucket_website(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.write();
        state.require_bucket(bucket)?;
        state.website.remove(bucket);
        Ok(())
    }

    async fn put_object_lock_configuration(
        &self,
        bucket: &str,
        config: ObjectLockConfiguration,
    ) -> Result<()> {
        let mut state = self.state.write();
        if !state.require_bucket(bucket)?.object_lock_enabled {
            return Err(Error::InvalidRequest(
                "Object Lock is not enabled for this bucket".into(),
            ));
        }
        state.object_lock.insert(bucket.to_string(), config);
        Ok(())
    }

    async fn get_object_lock_configuration(
        &self,
        bucket: &str,
    ) -> Result<ObjectLockConfiguration> {
        let state = self.state.read();
        let lock_enabled = state.require_bucket(bucket)?.object_lock_enabled;

        match state.object_lock.get(bucket) {
            Some(config) => Ok(config.clone()),
            None if lock_enabled => Ok(ObjectLockConfiguration {
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
        let mut state = self.state.write();
        if !state.require_bucket(bucket)?.object_lock_enabled {
            return Err(Error::InvalidRequest(
                "Object Lock is not enabled for this bucket".into(),
            ));
        }
        state.require_object(bucket, key)?;
        state
            .retention
            .insert((bucket.to_string(), key.to_string()), retention);
        Ok(())
    }

    async fn get_object_retention(&self, bucket: &str, key: &str) -> Result<Retention> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        state.require_object(bucket, key)?;
        state
            .retention
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or(Error::ObjectLockConfigurationNotFound)
    }

    async fn put_object_legal_hold(
        &self,
        bucket: &str,
        key: &str,
        hold: LegalHold,
    ) -> Result<()> {
        hold.validate()?;
        let mut state = self.state.write();
        if !state.require_bucket(bucket)?.object_lock_enabled {
            return Err(Error::InvalidRequest(
                "Object Lock is not enabled for this bucket".into(),
            ));
        }
        state.require_object(bucket, key)?;
        state
            .legal_hold
            .insert((bucket.to_string(), key.to_string()), hold);
        Ok(())
    }

    async fn get_object_legal_hold(&self, bucket: &str, key: &str) -> Result<LegalHold> {
        let state = self.state.read();
        state.require_bucket(bucket)?;
        state.require_object(bucket, key)?;
        state
            .legal_hold
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or(Error::ObjectLockConfigurationNotFound)
    }

    fn owner(&self) -> Owner {
        self.owner.clone()
    }
}
