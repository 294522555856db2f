//! Bucket types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bucket versioning status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum VersioningStatus {
    /// Versioning never enabled (default for new buckets)
    #[default]
    Unversioned,
    /// Versioning is enabled
    Enabled,
    /// Versioning was enabled but is now suspended
    Suspended,
}

impl VersioningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unversioned => "",
            Self::Enabled => "Enabled",
            Self::Suspended => "Suspended",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Enabled" => Self::Enabled,
            "Suspended" => Self::Suspended,
            _ => Self::Unversioned,
        }
    }

    /// True if versioning was ever enabled (Enabled or Suspended). Versioned
    /// writes continue in both states.
    pub fn was_ever_enabled(&self) -> bool {
        matches!(self, Self::Enabled | Self::Suspended)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub versioning: VersioningStatus,
    pub object_lock_enabled: bool,
}

impl Bucket {
    pub fn new(name: String) -> Self {
        Self {
            name,
            region: crate::DEFAULT_REGION.to_string(),
            created_at: Utc::now(),
            versioning: VersioningStatus::Unversioned,
            object_lock_enabled: false,
        }
    }

    /// Object Lock requires versioning, so enabling it at creation flips the
    /// bucket to versioned as well.
    pub fn with_object_lock(mut self) -> Self {
        self.object_lock_enabled = true;
        self.versioning = VersioningStatus::Enabled;
        self
    }

    /// Validate a bucket name against the S3 grammar: 3-63 chars, lowercase
    /// alphanumerics plus `.` and `-`, starts and ends alphanumeric, no
    /// consecutive periods, not shaped like an IPv4 address.
    pub fn validate_name(name: &str) -> Result<(), crate::Error> {
        if name.len() < crate::MIN_BUCKET_NAME_LENGTH {
            return Err(crate::Error::InvalidBucketName(
                "Bucket name too short (min 3 characters)".into(),
            ));
        }
        if name.len() > crate::MAX_BUCKET_NAME_LENGTH {
            return Err(crate::Error::InvalidBucketName(
                "Bucket name too long (max 63 characters)".into(),
            ));
        }

        let bytes = name.as_bytes();

        let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();

        if !is_alnum(bytes[0]) {
            return Err(crate::Error::InvalidBucketName(
                "Must start with a lowercase letter or number".into(),
            ));
        }
        if !is_alnum(bytes[bytes.len() - 1]) {
            return Err(crate::Error::InvalidBucketName(
                "Must end with a lowercase letter or number".into(),
            ));
        }

        for b in bytes {
            if !is_alnum(*b) && *b != b'-' && *b != b'.' {
                return Err(crate::Error::InvalidBucketName(format!(
                    "Invalid character: {}",
                    *b as char
                )));
            }
        }

        if name.contains("..") || name.contains(".-") || name.contains("-.") {
            return Err(crate::Error::InvalidBucketName(
                "Periods must be surrounded by alphanumerics".into(),
            ));
        }

        if looks_like_ip(name) {
            return Err(crate::Error::InvalidBucketName(
                "Bucket name cannot be formatted as an IP address".into(),
            ));
        }

        Ok(())
    }
}

fn looks_like_ip(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.len() <= 3 && p.chars().all(|c| c.is_ascii_digit()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: DateTime<Utc>,
}

impl From<Bucket> for BucketInfo {
    fn from(b: Bucket) -> Self {
        Self {
            name: b.name,
            creation_date: b.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["abc", "my-bucket", "my.bucket.01", "0bucket9", "a-b.c-d"] {
            assert!(Bucket::validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in [
            "ab",             // too short
            "My-Bucket",      // uppercase
            "bucket.",        // trailing period
            ".bucket",        // leading period
            "-bucket",        // leading dash
            "bucket-",        // trailing dash
            "192.168.0.1",    // IP-shaped
            "a..b-long-name", // consecutive periods
            "under_score_ab", // underscore
        ] {
            assert!(
                matches!(
                    Bucket::validate_name(name),
                    Err(crate::Error::InvalidBucketName(_))
                ),
                "{name} should be rejected"
            );
        }
        let long = "a".repeat(64);
        assert!(Bucket::validate_name(&long).is_err());
    }

    #[test]
    fn test_versioning_transitions() {
        let status = VersioningStatus::parse("Enabled");
        assert!(status.was_ever_enabled());
        assert!(VersioningStatus::parse("Suspended").was_ever_enabled());
        assert!(!VersioningStatus::parse("").was_ever_enabled());
    }

    #[test]
    fn test_object_lock_enables_versioning() {
        let bucket = Bucket::new("locked".into()).with_object_lock();
        assert!(bucket.object_lock_enabled);
        assert_eq!(bucket.versioning, VersioningStatus::Enabled);
    }
}
