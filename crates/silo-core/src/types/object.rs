//! Object types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::common::Owner;

/// Metadata record for a stored object (current version or a specific
/// historical version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub bucket: String,
    pub key: String,
    /// Empty for unversioned buckets
    pub version_id: String,
    pub size: i64,
    pub etag: String,
    pub content_type: String,
    /// User metadata, `x-amz-meta-` prefix stripped, keys lowercased
    pub metadata: HashMap<String, String>,
    pub last_modified: DateTime<Utc>,
    pub is_delete_marker: bool,
}

impl ObjectRecord {
    pub fn new(
        bucket: String,
        key: String,
        size: i64,
        etag: String,
        content_type: String,
    ) -> Self {
        Self {
            bucket,
            key,
            version_id: String::new(),
            size,
            etag,
            content_type,
            metadata: HashMap::new(),
            last_modified: Utc::now(),
            is_delete_marker: false,
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_version(mut self, version_id: String) -> Self {
        self.version_id = version_id;
        self
    }

    /// Validate an object key: non-empty, at most 1024 bytes, and no `..`
    /// path segment (keys double as relative filesystem paths).
    pub fn validate_key(key: &str) -> Result<(), crate::Error> {
        if key.is_empty() {
            return Err(crate::Error::InvalidArgument("Key cannot be empty".into()));
        }
        if key.len() > crate::MAX_KEY_LENGTH {
            return Err(crate::Error::InvalidArgument(format!(
                "Key too long (max {} bytes)",
                crate::MAX_KEY_LENGTH
            )));
        }
        if key.split('/').any(|segment| segment == "..") {
            return Err(crate::Error::InvalidArgument(
                "Key cannot contain a '..' path segment".into(),
            ));
        }
        Ok(())
    }
}

/// How CopyObject treats user metadata on the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataDirective {
    #[default]
    Copy,
    Replace,
}

impl MetadataDirective {
    pub fn parse(s: &str) -> Result<Self, crate::Error> {
        match s {
            "COPY" => Ok(Self::Copy),
            "REPLACE" => Ok(Self::Replace),
            other => Err(crate::Error::InvalidArgument(format!(
                "Invalid metadata directive: {}",
                other
            ))),
        }
    }
}

/// One page of a ListObjectsV2 (or v1) walk
#[derive(Debug, Clone, Default)]
pub struct ListObjectsPage {
    pub contents: Vec<ObjectRecord>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// A row of a ListObjectVersions walk
#[derive(Debug, Clone)]
pub struct ObjectVersionEntry {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub size: i64,
    pub owner: Option<Owner>,
}

/// A delete-marker row of a ListObjectVersions walk
#[derive(Debug, Clone)]
pub struct DeleteMarkerEntry {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub last_modified: DateTime<Utc>,
    pub owner: Option<Owner>,
}

/// One page of a ListObjectVersions walk
#[derive(Debug, Clone, Default)]
pub struct ListVersionsPage {
    pub versions: Vec<ObjectVersionEntry>,
    pub delete_markers: Vec<DeleteMarkerEntry>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_version_id_marker: Option<String>,
}

/// Parsed `Range` header, resolved against an object size before use
#[derive(Debug, Clone, Copy)]
pub struct ByteRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl ByteRange {
    pub fn parse(header: &str) -> Result<Self, crate::Error> {
        let spec = header
            .strip_prefix("bytes=")
            .ok_or(crate::Error::InvalidRange)?;

        let (start_str, end_str) = spec.split_once('-').ok_or(crate::Error::InvalidRange)?;

        let start = if start_str.is_empty() {
            None
        } else {
            Some(start_str.parse::<i64>().map_err(|_| crate::Error::InvalidRange)?)
        };

        let end = if end_str.is_empty() {
            None
        } else {
            Some(end_str.parse::<i64>().map_err(|_| crate::Error::InvalidRange)?)
        };

        if start.is_none() && end.is_none() {
            return Err(crate::Error::InvalidRange);
        }

        Ok(ByteRange { start, end })
    }

    /// Resolve to an inclusive `(start, end)` pair within an object of
    /// `size` bytes.
    pub fn resolve(&self, size: i64) -> Result<(i64, i64), crate::Error> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                if start < 0 || start > end || start >= size {
                    return Err(crate::Error::InvalidRange);
                }
                Ok((start, end.min(size - 1)))
            }
            (Some(start), None) => {
                if start < 0 || start >= size {
                    return Err(crate::Error::InvalidRange);
                }
                Ok((start, size - 1))
            }
            (None, Some(suffix)) => {
                if suffix <= 0 {
                    return Err(crate::Error::InvalidRange);
                }
                Ok(((size - suffix).max(0), size - 1))
            }
            (None, None) => Err(crate::Error::InvalidRange),
        }
    }
}
