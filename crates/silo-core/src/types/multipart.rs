//! Multipart upload types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// In-progress multipart upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartUpload {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
    pub initiated_at: DateTime<Utc>,
}

impl MultipartUpload {
    /// Upload IDs are `<unix-nanos>-<16 hex chars>`: time-ordered and unique
    /// process-wide.
    pub fn generate_upload_id() -> String {
        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_micros() * 1000);
        let entropy: u64 = rand::random();
        format!("{}-{:016x}", nanos, entropy)
    }

    pub fn validate_part_number(part_number: i32) -> Result<(), crate::Error> {
        if !(1..=crate::MAX_PARTS).contains(&part_number) {
            return Err(crate::Error::InvalidArgument(format!(
                "Part number must be an integer between 1 and {}",
                crate::MAX_PARTS
            )));
        }
        Ok(())
    }
}

/// A stored part of a multipart upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPart {
    pub part_number: i32,
    pub size: i64,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

/// One page of a ListParts walk
#[derive(Debug, Clone, Default)]
pub struct ListPartsPage {
    pub parts: Vec<UploadPart>,
    pub is_truncated: bool,
    pub next_part_number_marker: Option<i32>,
}

/// One page of a ListMultipartUploads walk
#[derive(Debug, Clone, Default)]
pub struct ListMultipartUploadsPage {
    pub uploads: Vec<MultipartUpload>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_upload_id_marker: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_id_shape() {
        let id = MultipartUpload::generate_upload_id();
        let (nanos, entropy) = id.split_once('-').unwrap();
        assert!(nanos.parse::<i64>().is_ok());
        assert_eq!(entropy.len(), 16);
        assert!(entropy.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_part_number_bounds() {
        assert!(MultipartUpload::validate_part_number(1).is_ok());
        assert!(MultipartUpload::validate_part_number(10_000).is_ok());
        assert!(MultipartUpload::validate_part_number(0).is_err());
        assert!(MultipartUpload::validate_part_number(10_001).is_err());
        assert!(MultipartUpload::validate_part_number(-3).is_err());
    }
}
