//! Bucket lifecycle configuration types
//!
//! Lifecycle rules are stored and served back; they are not executed.
//! Serde shapes match the S3 `LifecycleConfiguration` XML document.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename = "LifecycleConfiguration")]
pub struct LifecycleConfiguration {
    #[serde(rename = "Rule", default)]
    pub rules: Vec<LifecycleRule>,
}

impl LifecycleConfiguration {
    pub const MAX_RULES: usize = 1000;

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.rules.is_empty() {
            return Err(crate::Error::MalformedXml(
                "Lifecycle configuration must have at least one rule".into(),
            ));
        }
        if self.rules.len() > Self::MAX_RULES {
            return Err(crate::Error::MalformedXml(format!(
                "At most {} lifecycle rules per bucket",
                Self::MAX_RULES
            )));
        }
        let mut ids = std::collections::HashSet::new();
        for rule in &self.rules {
            if !matches!(rule.status.as_str(), "Enabled" | "Disabled") {
                return Err(crate::Error::MalformedXml(format!(
                    "Invalid rule status: {}",
                    rule.status
                )));
            }
            if let Some(ref id) = rule.id {
                if !ids.insert(id.as_str()) {
                    return Err(crate::Error::MalformedXml(format!(
                        "Duplicate rule ID: {}",
                        id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename = "Rule")]
pub struct LifecycleRule {
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "Status")]
    pub status: String,

    #[serde(rename = "Filter", skip_serializing_if = "Option::is_none")]
    pub filter: Option<LifecycleFilter>,

    #[serde(rename = "Expiration", skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,

    #[serde(rename = "Transition", default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<Transition>,

    #[serde(
        rename = "NoncurrentVersionExpiration",
        skip_serializing_if = "Option::is_none"
    )]
    pub noncurrent_version_expiration: Option<NoncurrentVersionExpiration>,

    #[serde(
        rename = "NoncurrentVersionTransition",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub noncurrent_version_transitions: Vec<NoncurrentVersionTransition>,

    #[serde(
        rename = "AbortIncompleteMultipartUpload",
        skip_serializing_if = "Option::is_none"
    )]
    pub abort_incomplete_multipart_upload: Option<AbortIncompleteMultipartUpload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LifecycleFilter {
    #[serde(rename = "Prefix", skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(rename = "Tag", skip_serializing_if = "Option::is_none")]
    pub tag: Option<FilterTag>,

    #[serde(rename = "ObjectSizeGreaterThan", skip_serializing_if = "Option::is_none")]
    pub object_size_greater_than: Option<i64>,

    #[serde(rename = "ObjectSizeLessThan", skip_serializing_if = "Option::is_none")]
    pub object_size_less_than: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterTag {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Expiration {
    #[serde(rename = "Days", skip_serializing_if = "Option::is_none")]
    pub days: Option<i32>,

    #[serde(rename = "Date", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(
        rename = "ExpiredObjectDeleteMarker",
        skip_serializing_if = "Option::is_none"
    )]
    pub expired_object_delete_marker: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    #[serde(rename = "Days", skip_serializing_if = "Option::is_none")]
    pub days: Option<i32>,

    #[serde(rename = "Date", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(rename = "StorageClass")]
    pub storage_class: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoncurrentVersionExpiration {
    #[serde(rename = "NoncurrentDays")]
    pub noncurrent_days: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoncurrentVersionTransition {
    #[serde(rename = "NoncurrentDays")]
    pub noncurrent_days: i32,

    #[serde(rename = "StorageClass")]
    pub storage_class: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AbortIncompleteMultipartUpload {
    #[serde(rename = "DaysAfterInitiation")]
    pub days_after_initiation: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: Option<&str>, status: &str) -> LifecycleRule {
        LifecycleRule {
            id: id.map(String::from),
            status: status.to_string(),
            filter: None,
            expiration: Some(Expiration {
                days: Some(30),
                ..Default::default()
            }),
            transitions: vec![],
            noncurrent_version_expiration: None,
            noncurrent_version_transitions: vec![],
            abort_incomplete_multipart_upload: None,
        }
    }

    #[test]
    fn test_validate() {
        let config = LifecycleConfiguration {
            rules: vec![rule(Some("expire"), "Enabled")],
        };
        assert!(config.validate().is_ok());

        assert!(LifecycleConfiguration::default().validate().is_err());

        let bad_status = LifecycleConfiguration {
            rules: vec![rule(None, "Sometimes")],
        };
        assert!(bad_status.validate().is_err());

        let dup = LifecycleConfiguration {
            rules: vec![rule(Some("a"), "Enabled"), rule(Some("a"), "Disabled")],
        };
        assert!(dup.validate().is_err());
    }
}
