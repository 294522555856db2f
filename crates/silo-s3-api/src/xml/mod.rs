//! XML wire framing
//!
//! Response documents are built by hand against the 2006-03-01 namespace;
//! request documents deserialize through quick-xml into serde shapes. Every
//! body is fully encoded before the status line is written.

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use silo_core::types::{
    AccessControlList, BucketInfo, CorsConfiguration, EncryptionConfiguration, Grant, Grantee,
    LegalHold, LifecycleConfiguration, ListMultipartUploadsPage, ListObjectsPage,
    ListPartsPage, ListVersionsPage, MultipartUpload, ObjectLockConfiguration, Owner,
    Retention, TagSet, Tag, VersioningStatus, WebsiteConfiguration,
};
use silo_core::utils::{format_s3_datetime, xml_escape};
use silo_core::{Error, Result};
use silo_storage::{DeleteObjectsResult, ListObjectsV2Params};
use std::str::FromStr;

pub const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";
const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

const STORAGE_CLASS: &str = "STANDARD";

fn open_root(xml: &mut String, name: &str) {
    xml.push_str(XML_DECL);
    xml.push('<');
    xml.push_str(name);
    xml.push_str(" xmlns=\"");
    xml.push_str(S3_XMLNS);
    xml.push_str("\">\n");
}

fn close_root(xml: &mut String, name: &str) {
    xml.push_str("</");
    xml.push_str(name);
    xml.push('>');
}

fn element(xml: &mut String, indent: &str, name: &str, value: &str) {
    xml.push_str(indent);
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&xml_escape(value));
    xml.push_str("</");
    xml.push_str(name);
    xml.push_str(">\n");
}

fn owner_block(xml: &mut String, indent: &str, owner: &Owner) {
    xml.push_str(indent);
    xml.push_str("<Owner>\n");
    let inner = format!("{}  ", indent);
    element(xml, &inner, "ID", &owner.id);
    element(xml, &inner, "DisplayName", &owner.display_name);
    xml.push_str(indent);
    xml.push_str("</Owner>\n");
}

// ============= Service =============

pub fn list_buckets_response(buckets: &[BucketInfo], owner: &Owner) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "ListAllMyBucketsResult");
    owner_block(&mut xml, "  ", owner);
    xml.push_str("  <Buckets>\n");
    for bucket in buckets {
        xml.push_str("    <Bucket>\n");
        element(&mut xml, "      ", "Name", &bucket.name);
        element(
            &mut xml,
            "      ",
            "CreationDate",
            &format_s3_datetime(&bucket.creation_date),
        );
        xml.push_str("    </Bucket>\n");
    }
    xml.push_str("  </Buckets>\n");
    close_root(&mut xml, "ListAllMyBucketsResult");
    xml
}

pub fn location_response() -> String {
    // The single-region server reports the empty (us-east-1) constraint
    format!(
        "{}<LocationConstraint xmlns=\"{}\"></LocationConstraint>",
        XML_DECL, S3_XMLNS
    )
}

// ============= Listings =============

fn contents_blocks(xml: &mut String, page: &ListObjectsPage, owner: &Owner) {
    for object in &page.contents {
        xml.push_str("  <Contents>\n");
        element(xml, "    ", "Key", &object.key);
        element(
            xml,
            "    ",
            "LastModified",
            &format_s3_datetime(&object.last_modified),
        );
        element(xml, "    ", "ETag", &format!("\"{}\"", object.etag));
        element(xml, "    ", "Size", &object.size.to_string());
        element(xml, "    ", "StorageClass", STORAGE_CLASS);
        owner_block(xml, "    ", owner);
        xml.push_str("  </Contents>\n");
    }
    for prefix in &page.common_prefixes {
        xml.push_str("  <CommonPrefixes>\n");
        element(xml, "    ", "Prefix", prefix);
        xml.push_str("  </CommonPrefixes>\n");
    }
}

pub fn list_objects_v2_response(
    bucket: &str,
    params: &ListObjectsV2Params,
    page: &ListObjectsPage,
    owner: &Owner,
) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "ListBucketResult");
    element(&mut xml, "  ", "Name", bucket);
    element(&mut xml, "  ", "Prefix", &params.prefix);
    if let Some(ref delimiter) = params.delimiter {
        element(&mut xml, "  ", "Delimiter", delimiter);
    }
    if let Some(ref start_after) = params.start_after {
        element(&mut xml, "  ", "StartAfter", start_after);
    }
    element(&mut xml, "  ", "MaxKeys", &params.max_keys.to_string());
    element(
        &mut xml,
        "  ",
        "KeyCount",
        &page.contents.len().to_string(),
    );
    element(
        &mut xml,
        "  ",
        "IsTruncated",
        if page.is_truncated { "true" } else { "false" },
    );
    if let Some(ref token) = params.continuation_token {
        element(&mut xml, "  ", "ContinuationToken", token);
    }
    if let Some(ref token) = page.next_continuation_token {
        element(&mut xml, "  ", "NextContinuationToken", token);
    }
    contents_blocks(&mut xml, page, owner);
    close_root(&mut xml, "ListBucketResult");
    xml
}

pub fn list_objects_v1_response(
    bucket: &str,
    prefix: &str,
    delimiter: Option<&str>,
    marker: Option<&str>,
    max_keys: i32,
    page: &ListObjectsPage,
    owner: &Owner,
) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "ListBucketResult");
    element(&mut xml, "  ", "Name", bucket);
    element(&mut xml, "  ", "Prefix", prefix);
    element(&mut xml, "  ", "Marker", marker.unwrap_or(""));
    if let Some(delimiter) = delimiter {
        element(&mut xml, "  ", "Delimiter", delimiter);
    }
    element(&mut xml, "  ", "MaxKeys", &max_keys.to_string());
    element(
        &mut xml,
        "  ",
        "IsTruncated",
        if page.is_truncated { "true" } else { "false" },
    );
    if let Some(ref next) = page.next_continuation_token {
        element(&mut xml, "  ", "NextMarker", next);
    }
    contents_blocks(&mut xml, page, owner);
    close_root(&mut xml, "ListBucketResult");
    xml
}

pub fn list_versions_response(
    bucket: &str,
    prefix: &str,
    max_keys: i32,
    page: &ListVersionsPage,
) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "ListVersionsResult");
    element(&mut xml, "  ", "Name", bucket);
    element(&mut xml, "  ", "Prefix", prefix);
    element(&mut xml, "  ", "MaxKeys", &max_keys.to_string());
    element(
        &mut xml,
        "  ",
        "IsTruncated",
        if page.is_truncated { "true" } else { "false" },
    );
    if let Some(ref marker) = page.next_key_marker {
        element(&mut xml, "  ", "NextKeyMarker", marker);
    }
    if let Some(ref marker) = page.next_version_id_marker {
        element(&mut xml, "  ", "NextVersionIdMarker", marker);
    }

    for version in &page.versions {
        xml.push_str("  <Version>\n");
        element(&mut xml, "    ", "Key", &version.key);
        element(&mut xml, "    ", "VersionId", &version.version_id);
        element(
            &mut xml,
            "    ",
            "IsLatest",
            if version.is_latest { "true" } else { "false" },
        );
        element(
            &mut xml,
            "    ",
            "LastModified",
            &format_s3_datetime(&version.last_modified),
        );
        element(&mut xml, "    ", "ETag", &format!("\"{}\"", version.etag));
        element(&mut xml, "    ", "Size", &version.size.to_string());
        element(&mut xml, "    ", "StorageClass", STORAGE_CLASS);
        if let Some(ref owner) = version.owner {
            owner_block(&mut xml, "    ", owner);
        }
        xml.push_str("  </Version>\n");
    }

    for marker in &page.delete_markers {
        xml.push_str("  <DeleteMarker>\n");
        element(&mut xml, "    ", "Key", &marker.key);
        element(&mut xml, "    ", "VersionId", &marker.version_id);
        element(
            &mut xml,
            "    ",
            "IsLatest",
            if marker.is_latest { "true" } else { "false" },
        );
        element(
            &mut xml,
            "    ",
            "LastModified",
            &format_s3_datetime(&marker.last_modified),
        );
        if let Some(ref owner) = marker.owner {
            owner_block(&mut xml, "    ", owner);
        }
        xml.push_str("  </DeleteMarker>\n");
    }

    close_root(&mut xml, "ListVersionsResult");
    xml
}

// ============= Objects =============

pub fn copy_object_response(etag: &str, last_modified: &DateTime<Utc>) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "CopyObjectResult");
    element(&mut xml, "  ", "LastModified", &format_s3_datetime(last_modified));
    element(&mut xml, "  ", "ETag", &format!("\"{}\"", etag));
    close_root(&mut xml, "CopyObjectResult");
    xml
}

pub fn copy_part_response(etag: &str, last_modified: &DateTime<Utc>) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "CopyPartResult");
    element(&mut xml, "  ", "LastModified", &format_s3_datetime(last_modified));
    element(&mut xml, "  ", "ETag", &format!("\"{}\"", etag));
    close_root(&mut xml, "CopyPartResult");
    xml
}

pub fn delete_objects_response(result: &DeleteObjectsResult, quiet: bool) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "DeleteResult");
    if !quiet {
        for deleted in &result.deleted {
            xml.push_str("  <Deleted>\n");
            element(&mut xml, "    ", "Key", &deleted.key);
            if let Some(ref vid) = deleted.version_id {
                element(&mut xml, "    ", "VersionId", vid);
            }
            if deleted.delete_marker {
                element(&mut xml, "    ", "DeleteMarker", "true");
                if let Some(ref vid) = deleted.delete_marker_version_id {
                    element(&mut xml, "    ", "DeleteMarkerVersionId", vid);
                }
            }
            xml.push_str("  </Deleted>\n");
        }
    }
    for error in &result.errors {
        xml.push_str("  <Error>\n");
        element(&mut xml, "    ", "Key", &error.key);
        element(&mut xml, "    ", "Code", &error.code);
        element(&mut xml, "    ", "Message", &error.message);
        xml.push_str("  </Error>\n");
    }
    close_root(&mut xml, "DeleteResult");
    xml
}

pub fn object_attributes_response(
    etag: Option<&str>,
    size: Option<i64>,
    storage_class: bool,
    parts_count: Option<usize>,
) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "GetObjectAttributesResponse");
    if let Some(etag) = etag {
        element(&mut xml, "  ", "ETag", etag);
    }
    if let Some(size) = size {
        element(&mut xml, "  ", "ObjectSize", &size.to_string());
    }
    if storage_class {
        element(&mut xml, "  ", "StorageClass", STORAGE_CLASS);
    }
    if let Some(count) = parts_count {
        xml.push_str("  <ObjectParts>\n");
        element(&mut xml, "    ", "TotalPartsCount", &count.to_string());
        xml.push_str("  </ObjectParts>\n");
    }
    close_root(&mut xml, "GetObjectAttributesResponse");
    xml
}

// ============= Multipart =============

pub fn initiate_multipart_response(bucket: &str, key: &str, upload_id: &str) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "InitiateMultipartUploadResult");
    element(&mut xml, "  ", "Bucket", bucket);
    element(&mut xml, "  ", "Key", key);
    element(&mut xml, "  ", "UploadId", upload_id);
    close_root(&mut xml, "InitiateMultipartUploadResult");
    xml
}

pub fn complete_multipart_response(location: &str, bucket: &str, key: &str, etag: &str) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "CompleteMultipartUploadResult");
    element(&mut xml, "  ", "Location", location);
    element(&mut xml, "  ", "Bucket", bucket);
    element(&mut xml, "  ", "Key", key);
    element(&mut xml, "  ", "ETag", &format!("\"{}\"", etag));
    close_root(&mut xml, "CompleteMultipartUploadResult");
    xml
}

pub fn list_parts_response(
    upload: &MultipartUpload,
    page: &ListPartsPage,
    max_parts: i32,
    part_number_marker: Option<i32>,
    owner: &Owner,
) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "ListPartsResult");
    element(&mut xml, "  ", "Bucket", &upload.bucket);
    element(&mut xml, "  ", "Key", &upload.key);
    element(&mut xml, "  ", "UploadId", &upload.upload_id);
    owner_block(&mut xml, "  ", owner);
    element(&mut xml, "  ", "StorageClass", STORAGE_CLASS);
    element(
        &mut xml,
        "  ",
        "PartNumberMarker",
        &part_number_marker.unwrap_or(0).to_string(),
    );
    if let Some(next) = page.next_part_number_marker {
        element(&mut xml, "  ", "NextPartNumberMarker", &next.to_string());
    }
    element(&mut xml, "  ", "MaxParts", &max_parts.to_string());
    element(
        &mut xml,
        "  ",
        "IsTruncated",
        if page.is_truncated { "true" } else { "false" },
    );
    for part in &page.parts {
        xml.push_str("  <Part>\n");
        element(&mut xml, "    ", "PartNumber", &part.part_number.to_string());
        element(
            &mut xml,
            "    ",
            "LastModified",
            &format_s3_datetime(&part.last_modified),
        );
        element(&mut xml, "    ", "ETag", &format!("\"{}\"", part.etag));
        element(&mut xml, "    ", "Size", &part.size.to_string());
        xml.push_str("  </Part>\n");
    }
    close_root(&mut xml, "ListPartsResult");
    xml
}

pub fn list_uploads_response(
    bucket: &str,
    prefix: &str,
    max_uploads: i32,
    page: &ListMultipartUploadsPage,
    owner: &Owner,
) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "ListMultipartUploadsResult");
    element(&mut xml, "  ", "Bucket", bucket);
    element(&mut xml, "  ", "Prefix", prefix);
    element(&mut xml, "  ", "MaxUploads", &max_uploads.to_string());
    element(
        &mut xml,
        "  ",
        "IsTruncated",
        if page.is_truncated { "true" } else { "false" },
    );
    if let Some(ref marker) = page.next_key_marker {
        element(&mut xml, "  ", "NextKeyMarker", marker);
    }
    if let Some(ref marker) = page.next_upload_id_marker {
        element(&mut xml, "  ", "NextUploadIdMarker", marker);
    }
    for upload in &page.uploads {
        xml.push_str("  <Upload>\n");
        element(&mut xml, "    ", "Key", &upload.key);
        element(&mut xml, "    ", "UploadId", &upload.upload_id);
        owner_block(&mut xml, "    ", owner);
        element(&mut xml, "    ", "StorageClass", STORAGE_CLASS);
        element(
            &mut xml,
            "    ",
            "Initiated",
            &format_s3_datetime(&upload.initiated_at),
        );
        xml.push_str("  </Upload>\n");
    }
    close_root(&mut xml, "ListMultipartUploadsResult");
    xml
}

// ============= Per-bucket configs =============

pub fn versioning_response(status: VersioningStatus) -> String {
    let mut xml = String::new();
    xml.push_str(XML_DECL);
    xml.push_str(&format!(
        "<VersioningConfiguration xmlns=\"{}\">",
        S3_XMLNS
    ));
    if status.was_ever_enabled() {
        xml.push_str(&format!("<Status>{}</Status>", status.as_str()));
    }
    xml.push_str("</VersioningConfiguration>");
    xml
}

pub fn tagging_response(tags: &TagSet) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "Tagging");
    xml.push_str("  <TagSet>\n");
    for tag in &tags.tags {
        xml.push_str("    <Tag>\n");
        element(&mut xml, "      ", "Key", &tag.key);
        element(&mut xml, "      ", "Value", &tag.value);
        xml.push_str("    </Tag>\n");
    }
    xml.push_str("  </TagSet>\n");
    close_root(&mut xml, "Tagging");
    xml
}

pub fn acl_response(acl: &AccessControlList) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "AccessControlPolicy");
    owner_block(&mut xml, "  ", &acl.owner);
    xml.push_str("  <AccessControlList>\n");
    for grant in &acl.grants {
        xml.push_str("    <Grant>\n");
        match &grant.grantee {
            Grantee::CanonicalUser { id, display_name } => {
                xml.push_str("      <Grantee xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:type=\"CanonicalUser\">\n");
                element(&mut xml, "        ", "ID", id);
                if let Some(name) = display_name {
                    element(&mut xml, "        ", "DisplayName", name);
                }
            }
            Grantee::AmazonCustomerByEmail { email_address } => {
                xml.push_str("      <Grantee xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:type=\"AmazonCustomerByEmail\">\n");
                element(&mut xml, "        ", "EmailAddress", email_address);
            }
            Grantee::Group { uri } => {
                xml.push_str("      <Grantee xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:type=\"Group\">\n");
                element(&mut xml, "        ", "URI", uri);
            }
        }
        xml.push_str("      </Grantee>\n");
        element(&mut xml, "      ", "Permission", &grant.permission.to_string());
        xml.push_str("    </Grant>\n");
    }
    xml.push_str("  </AccessControlList>\n");
    close_root(&mut xml, "AccessControlPolicy");
    xml
}

pub fn cors_response(config: &CorsConfiguration) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "CORSConfiguration");
    for rule in &config.rules {
        xml.push_str("  <CORSRule>\n");
        if let Some(ref id) = rule.id {
            element(&mut xml, "    ", "ID", id);
        }
        for origin in &rule.allowed_origins {
            element(&mut xml, "    ", "AllowedOrigin", origin);
        }
        for method in &rule.allowed_methods {
            element(&mut xml, "    ", "AllowedMethod", method);
        }
        for header in &rule.allowed_headers {
            element(&mut xml, "    ", "AllowedHeader", header);
        }
        for header in &rule.expose_headers {
            element(&mut xml, "    ", "ExposeHeader", header);
        }
        if let Some(age) = rule.max_age_seconds {
            element(&mut xml, "    ", "MaxAgeSeconds", &age.to_string());
        }
        xml.push_str("  </CORSRule>\n");
    }
    close_root(&mut xml, "CORSConfiguration");
    xml
}

pub fn lifecycle_response(config: &LifecycleConfiguration) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "LifecycleConfiguration");
    for rule in &config.rules {
        xml.push_str("  <Rule>\n");
        if let Some(ref id) = rule.id {
            element(&mut xml, "    ", "ID", id);
        }
        element(&mut xml, "    ", "Status", &rule.status);
        if let Some(ref filter) = rule.filter {
            xml.push_str("    <Filter>\n");
            if let Some(ref prefix) = filter.prefix {
                element(&mut xml, "      ", "Prefix", prefix);
            }
            if let Some(ref tag) = filter.tag {
                xml.push_str("      <Tag>\n");
                element(&mut xml, "        ", "Key", &tag.key);
                element(&mut xml, "        ", "Value", &tag.value);
                xml.push_str("      </Tag>\n");
            }
            if let Some(size) = filter.object_size_greater_than {
                element(&mut xml, "      ", "ObjectSizeGreaterThan", &size.to_string());
            }
            if let Some(size) = filter.object_size_less_than {
                element(&mut xml, "      ", "ObjectSizeLessThan", &size.to_string());
            }
            xml.push_str("    </Filter>\n");
        }
        if let Some(ref expiration) = rule.expiration {
            xml.push_str("    <Expiration>\n");
            if let Some(days) = expiration.days {
                element(&mut xml, "      ", "Days", &days.to_string());
            }
            if let Some(ref date) = expiration.date {
                element(&mut xml, "      ", "Date", date);
            }
            if let Some(marker) = expiration.expired_object_delete_marker {
                element(
                    &mut xml,
                    "      ",
                    "ExpiredObjectDeleteMarker",
                    if marker { "true" } else { "false" },
                );
            }
            xml.push_str("    </Expiration>\n");
        }
        for transition in &rule.transitions {
            xml.push_str("    <Transition>\n");
            if let Some(days) = transition.days {
                element(&mut xml, "      ", "Days", &days.to_string());
            }
            if let Some(ref date) = transition.date {
                element(&mut xml, "      ", "Date", date);
            }
            element(&mut xml, "      ", "StorageClass", &transition.storage_class);
            xml.push_str("    </Transition>\n");
        }
        if let Some(ref expiration) = rule.noncurrent_version_expiration {
            xml.push_str("    <NoncurrentVersionExpiration>\n");
            element(
                &mut xml,
                "      ",
                "NoncurrentDays",
                &expiration.noncurrent_days.to_string(),
            );
            xml.push_str("    </NoncurrentVersionExpiration>\n");
        }
        for transition in &rule.noncurrent_version_transitions {
            xml.push_str("    <NoncurrentVersionTransition>\n");
            element(
                &mut xml,
                "      ",
                "NoncurrentDays",
                &transition.noncurrent_days.to_string(),
            );
            element(&mut xml, "      ", "StorageClass", &transition.storage_class);
            xml.push_str("    </NoncurrentVersionTransition>\n");
        }
        if let Some(ref abort) = rule.abort_incomplete_multipart_upload {
            xml.push_str("    <AbortIncompleteMultipartUpload>\n");
            element(
                &mut xml,
                "      ",
                "DaysAfterInitiation",
                &abort.days_after_initiation.to_string(),
            );
            xml.push_str("    </AbortIncompleteMultipartUpload>\n");
        }
        xml.push_str("  </Rule>\n");
    }
    close_root(&mut xml, "LifecycleConfiguration");
    xml
}

pub fn encryption_response(config: &EncryptionConfiguration) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "ServerSideEncryptionConfiguration");
    for rule in &config.rules {
        xml.push_str("  <Rule>\n");
        xml.push_str("    <ApplyServerSideEncryptionByDefault>\n");
        element(
            &mut xml,
            "      ",
            "SSEAlgorithm",
            &rule.apply_server_side_encryption_by_default.sse_algorithm,
        );
        if let Some(ref key) = rule.apply_server_side_encryption_by_default.kms_master_key_id {
            element(&mut xml, "      ", "KMSMasterKeyID", key);
        }
        xml.push_str("    </ApplyServerSideEncryptionByDefault>\n");
        if let Some(enabled) = rule.bucket_key_enabled {
            element(
                &mut xml,
                "    ",
                "BucketKeyEnabled",
                if enabled { "true" } else { "false" },
            );
        }
        xml.push_str("  </Rule>\n");
    }
    close_root(&mut xml, "ServerSideEncryptionConfiguration");
    xml
}

pub fn website_response(config: &WebsiteConfiguration) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "WebsiteConfiguration");
    if let Some(ref redirect) = config.redirect_all_requests_to {
        xml.push_str("  <RedirectAllRequestsTo>\n");
        element(&mut xml, "    ", "HostName", &redirect.host_name);
        if let Some(ref protocol) = redirect.protocol {
            element(&mut xml, "    ", "Protocol", protocol);
        }
        xml.push_str("  </RedirectAllRequestsTo>\n");
    }
    if let Some(ref index) = config.index_document {
        xml.push_str("  <IndexDocument>\n");
        element(&mut xml, "    ", "Suffix", &index.suffix);
        xml.push_str("  </IndexDocument>\n");
    }
    if let Some(ref error) = config.error_document {
        xml.push_str("  <ErrorDocument>\n");
        element(&mut xml, "    ", "Key", &error.key);
        xml.push_str("  </ErrorDocument>\n");
    }
    close_root(&mut xml, "WebsiteConfiguration");
    xml
}

pub fn object_lock_response(config: &ObjectLockConfiguration) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "ObjectLockConfiguration");
    if let Some(ref enabled) = config.object_lock_enabled {
        element(&mut xml, "  ", "ObjectLockEnabled", enabled);
    }
    if let Some(ref rule) = config.rule {
        xml.push_str("  <Rule>\n    <DefaultRetention>\n");
        if let Some(mode) = rule.default_retention.mode {
            element(&mut xml, "      ", "Mode", &mode.to_string());
        }
        if let Some(days) = rule.default_retention.days {
            element(&mut xml, "      ", "Days", &days.to_string());
        }
        if let Some(years) = rule.default_retention.years {
            element(&mut xml, "      ", "Years", &years.to_string());
        }
        xml.push_str("    </DefaultRetention>\n  </Rule>\n");
    }
    close_root(&mut xml, "ObjectLockConfiguration");
    xml
}

pub fn retention_response(retention: &Retention) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "Retention");
    element(&mut xml, "  ", "Mode", &retention.mode.to_string());
    element(
        &mut xml,
        "  ",
        "RetainUntilDate",
        &format_s3_datetime(&retention.retain_until_date),
    );
    close_root(&mut xml, "Retention");
    xml
}

pub fn legal_hold_response(hold: &LegalHold) -> String {
    let mut xml = String::new();
    open_root(&mut xml, "LegalHold");
    element(&mut xml, "  ", "Status", &hold.status);
    close_root(&mut xml, "LegalHold");
    xml
}

// ============= Request parsing =============

fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T> {
    from_str(body).map_err(|e| Error::MalformedXml(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartDocument {
    #[serde(rename = "Part", default)]
    parts: Vec<CompletePartDocument>,
}

#[derive(Debug, Deserialize)]
struct CompletePartDocument {
    #[serde(rename = "PartNumber")]
    part_number: i32,
    #[serde(rename = "ETag")]
    etag: String,
}

pub fn parse_complete_multipart(body: &str) -> Result<Vec<silo_storage::CompletedPart>> {
    let document: CompleteMultipartDocument = parse(body)?;
    Ok(document
        .parts
        .into_iter()
        .map(|p| silo_storage::CompletedPart {
            part_number: p.part_number,
            etag: p.etag,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Delete")]
struct DeleteDocument {
    #[serde(rename = "Object", default)]
    objects: Vec<DeleteObjectDocument>,
    #[serde(rename = "Quiet", default)]
    quiet: bool,
}

#[derive(Debug, Deserialize)]
struct DeleteObjectDocument {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "VersionId")]
    version_id: Option<String>,
}

pub fn parse_delete_objects(body: &str) -> Result<(Vec<silo_storage::ObjectIdentifier>, bool)> {
    let document: DeleteDocument = parse(body)?;
    if document.objects.is_empty() {
        return Err(Error::MalformedXml("Delete requires at least one Object".into()));
    }
    let objects = document
        .objects
        .into_iter()
        .map(|o| silo_storage::ObjectIdentifier {
            key: o.key,
            version_id: o.version_id,
        })
        .collect();
    Ok((objects, document.quiet))
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Tagging")]
struct TaggingDocument {
    #[serde(rename = "TagSet")]
    tag_set: TagSetDocument,
}

#[derive(Debug, Deserialize)]
struct TagSetDocument {
    #[serde(rename = "Tag", default)]
    tags: Vec<TagDocument>,
}

#[derive(Debug, Deserialize)]
struct TagDocument {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: String,
}

pub fn parse_tagging(body: &str) -> Result<TagSet> {
    let document: TaggingDocument = parse(body)?;
    TagSet::new(
        document
            .tag_set
            .tags
            .into_iter()
            .map(|t| Tag::new(t.key, t.value))
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename = "VersioningConfiguration")]
struct VersioningDocument {
    #[serde(rename = "Status")]
    status: Option<String>,
}

pub fn parse_versioning(body: &str) -> Result<VersioningStatus> {
    let document: VersioningDocument = parse(body)?;
    match document.status.as_deref() {
        Some("Enabled") => Ok(VersioningStatus::Enabled),
        Some("Suspended") => Ok(VersioningStatus::Suspended),
        other => Err(Error::MalformedXml(format!(
            "Invalid versioning status: {}",
            other.unwrap_or("")
        ))),
    }
}

pub fn parse_cors(body: &str) -> Result<CorsConfiguration> {
    parse(body)
}

pub fn parse_lifecycle(body: &str) -> Result<LifecycleConfiguration> {
    parse(body)
}

pub fn parse_encryption(body: &str) -> Result<EncryptionConfiguration> {
    parse(body)
}

pub fn parse_website(body: &str) -> Result<WebsiteConfiguration> {
    parse(body)
}

pub fn parse_object_lock(body: &str) -> Result<ObjectLockConfiguration> {
    parse(body)
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Retention")]
struct RetentionDocument {
    #[serde(rename = "Mode")]
    mode: String,
    #[serde(rename = "RetainUntilDate")]
    retain_until_date: DateTime<Utc>,
}

pub fn parse_retention(body: &str) -> Result<Retention> {
    let document: RetentionDocument = parse(body)?;
    Ok(Retention {
        mode: silo_core::types::RetentionMode::from_str(&document.mode)?,
        retain_until_date: document.retain_until_date,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename = "LegalHold")]
struct LegalHoldDocument {
    #[serde(rename = "Status")]
    status: String,
}

pub fn parse_legal_hold(body: &str) -> Result<LegalHold> {
    let document: LegalHoldDocument = parse(body)?;
    let hold = LegalHold {
        status: document.status,
    };
    hold.validate()?;
    Ok(hold)
}

#[derive(Debug, Deserialize)]
#[serde(rename = "AccessControlPolicy")]
struct AclDocument {
    #[serde(rename = "Owner")]
    owner: OwnerDocument,
    #[serde(rename = "AccessControlList")]
    access_control_list: GrantListDocument,
}

#[derive(Debug, Deserialize)]
struct OwnerDocument {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "DisplayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GrantListDocument {
    #[serde(rename = "Grant", default)]
    grants: Vec<GrantDocument>,
}

#[derive(Debug, Deserialize)]
struct GrantDocument {
    #[serde(rename = "Grantee")]
    grantee: GranteeDocument,
    #[serde(rename = "Permission")]
    permission: String,
}

#[derive(Debug, Deserialize)]
struct GranteeDocument {
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(rename = "DisplayName")]
    display_name: Option<String>,
    #[serde(rename = "URI")]
    uri: Option<String>,
    #[serde(rename = "EmailAddress")]
    email_address: Option<String>,
}

pub fn parse_acl(body: &str) -> Result<AccessControlList> {
    let document: AclDocument = parse(body)?;

    let mut grants = Vec::with_capacity(document.access_control_list.grants.len());
    for grant in document.access_control_list.grants {
        let grantee = if let Some(uri) = grant.grantee.uri {
            Grantee::Group { uri }
        } else if let Some(email) = grant.grantee.email_address {
            Grantee::AmazonCustomerByEmail {
                email_address: email,
            }
        } else if let Some(id) = grant.grantee.id {
            Grantee::CanonicalUser {
                id,
                display_name: grant.grantee.display_name,
            }
        } else {
            return Err(Error::MalformedXml("Grantee requires ID, URI, or EmailAddress".into()));
        };

        grants.push(Grant::new(
            grantee,
            silo_core::types::Permission::from_str(&grant.permission)
                .map_err(|_| Error::MalformedXml(format!("Invalid permission: {}", grant.permission)))?,
        ));
    }

    Ok(AccessControlList {
        owner: Owner {
            id: document.owner.id.clone(),
            display_name: document.owner.display_name.unwrap_or(document.owner.id),
        },
        grants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_multipart() {
        let body = r#"<CompleteMultipartUpload>
            <Part><PartNumber>1</PartNumber><ETag>"etag1"</ETag></Part>
            <Part><PartNumber>2</PartNumber><ETag>"etag2"</ETag></Part>
        </CompleteMultipartUpload>"#;

        let parts = parse_complete_multipart(body).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].part_number, 1);
        assert_eq!(parts[1].etag, "\"etag2\"");
    }

    #[test]
    fn test_parse_delete_objects() {
        let body = r#"<Delete>
            <Object><Key>a.txt</Key></Object>
            <Object><Key>b.txt</Key><VersionId>v1</VersionId></Object>
            <Quiet>true</Quiet>
        </Delete>"#;

        let (objects, quiet) = parse_delete_objects(body).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].version_id.as_deref(), Some("v1"));
        assert!(quiet);

        assert!(parse_delete_objects("<Delete></Delete>").is_err());
        assert!(parse_delete_objects("not xml at all <<<").is_err());
    }

    #[test]
    fn test_parse_tagging_enforces_limits() {
        let body = r#"<Tagging><TagSet>
            <Tag><Key>env</Key><Value>prod</Value></Tag>
        </TagSet></Tagging>"#;
        let tags = parse_tagging(body).unwrap();
        assert_eq!(tags.len(), 1);

        let mut big = String::from("<Tagging><TagSet>");
        for i in 0..11 {
            big.push_str(&format!("<Tag><Key>k{i}</Key><Value>v</Value></Tag>"));
        }
        big.push_str("</TagSet></Tagging>");
        assert!(matches!(parse_tagging(&big), Err(Error::InvalidTag(_))));
    }

    #[test]
    fn test_parse_versioning() {
        let enabled =
            r#"<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>"#;
        assert_eq!(parse_versioning(enabled).unwrap(), VersioningStatus::Enabled);

        let bogus = r#"<VersioningConfiguration><Status>On</Status></VersioningConfiguration>"#;
        assert!(parse_versioning(bogus).is_err());
    }

    #[test]
    fn test_parse_cors_round_trip() {
        let body = r#"<CORSConfiguration>
            <CORSRule>
                <AllowedOrigin>https://example.com</AllowedOrigin>
                <AllowedMethod>GET</AllowedMethod>
                <AllowedHeader>*</AllowedHeader>
                <MaxAgeSeconds>3600</MaxAgeSeconds>
            </CORSRule>
        </CORSConfiguration>"#;

        let config = parse_cors(body).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].max_age_seconds, Some(3600));

        let rendered = cors_response(&config);
        assert!(rendered.contains("<AllowedOrigin>https://example.com</AllowedOrigin>"));
        assert!(rendered.contains(S3_XMLNS));
    }

    #[test]
    fn test_parse_retention() {
        let body = r#"<Retention>
            <Mode>GOVERNANCE</Mode>
            <RetainUntilDate>2030-01-01T00:00:00Z</RetainUntilDate>
        </Retention>"#;
        let retention = parse_retention(body).unwrap();
        assert_eq!(retention.mode, silo_core::types::RetentionMode::Governance);
    }

    #[test]
    fn test_parse_acl_grantee_kinds() {
        let body = r#"<AccessControlPolicy>
            <Owner><ID>silo</ID></Owner>
            <AccessControlList>
                <Grant>
                    <Grantee xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="Group">
                        <URI>http://acs.amazonaws.com/groups/global/AllUsers</URI>
                    </Grantee>
                    <Permission>READ</Permission>
                </Grant>
                <Grant>
                    <Grantee xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="CanonicalUser">
                        <ID>silo</ID>
                    </Grantee>
                    <Permission>FULL_CONTROL</Permission>
                </Grant>
            </AccessControlList>
        </AccessControlPolicy>"#;

        let acl = parse_acl(body).unwrap();
        assert_eq!(acl.grants.len(), 2);
        assert!(matches!(acl.grants[0].grantee, Grantee::Group { .. }));
        assert!(matches!(acl.grants[1].grantee, Grantee::CanonicalUser { .. }));
    }

    #[test]
    fn test_list_buckets_document() {
        let buckets = vec![BucketInfo {
            name: "alpha".into(),
            creation_date: Utc::now(),
        }];
        let xml = list_buckets_response(&buckets, &Owner::new("silo"));
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<Name>alpha</Name>"));
        assert!(xml.contains(S3_XMLNS));
    }

    #[test]
    fn test_error_escaping_in_listing() {
        let mut page = ListObjectsPage::default();
        page.contents.push(silo_core::types::ObjectRecord::new(
            "b".into(),
            "a&b<c>.txt".into(),
            1,
            "etag".into(),
            "text/plain".into(),
        ));
        let xml = list_objects_v2_response(
            "b",
            &ListObjectsV2Params {
                max_keys: 1000,
                ..Default::default()
            },
            &page,
            &Owner::new("silo"),
        );
        assert!(xml.contains("a&amp;b&lt;c&gt;.txt"));
    }

    #[test]
    fn test_versioning_document_shapes() {
        assert!(!versioning_response(VersioningStatus::Unversioned).contains("<Status>"));
        assert!(versioning_response(VersioningStatus::Enabled).contains("<Status>Enabled</Status>"));
        assert!(
            versioning_response(VersioningStatus::Suspended).contains("<Status>Suspended</Status>")
        );
    }
}
