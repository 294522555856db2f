//! Tag types

use serde::{Deserialize, Serialize};

/// Maximum number of tags per resource
pub const MAX_TAGS: usize = 10;
/// Maximum tag key length
pub const MAX_TAG_KEY_LENGTH: usize = 128;
/// Maximum tag value length
pub const MAX_TAG_VALUE_LENGTH: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.key.is_empty() || self.key.len() > MAX_TAG_KEY_LENGTH {
            return Err(crate::Error::InvalidTag(format!(
                "Tag key must be 1-{} characters",
                MAX_TAG_KEY_LENGTH
            )));
        }
        if self.value.len() > MAX_TAG_VALUE_LENGTH {
            return Err(crate::Error::InvalidTag(format!(
                "Tag value must be 0-{} characters",
                MAX_TAG_VALUE_LENGTH
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagSet {
    pub tags: Vec<Tag>,
}

impl TagSet {
    pub fn new(tags: Vec<Tag>) -> Result<Self, crate::Error> {
        if tags.len() > MAX_TAGS {
            return Err(crate::Error::InvalidTag(format!(
                "At most {} tags per resource",
                MAX_TAGS
            )));
        }
        for tag in &tags {
            tag.validate()?;
        }
        let mut seen = std::collections::HashSet::new();
        for tag in &tags {
            if !seen.insert(tag.key.as_str()) {
                return Err(crate::Error::InvalidTag(format!(
                    "Duplicate tag key: {}",
                    tag.key
                )));
            }
        }
        Ok(Self { tags })
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Parse the `x-amz-tagging` header form: `k1=v1&k2=v2`
    pub fn parse_header(value: &str) -> Result<Self, crate::Error> {
        let mut tags = Vec::new();
        for pair in value.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            tags.push(Tag::new(k, v));
        }
        Self::new(tags)
    }
}
