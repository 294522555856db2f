//! Object Lock types
//!
//! Bucket-level lock configuration plus per-object retention and legal
//! hold. Settings are stored and served back; retention is not enforced on
//! the delete path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bucket Object Lock configuration. `object_lock_enabled` is set at bucket
/// creation and immutable thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename = "ObjectLockConfiguration")]
pub struct ObjectLockConfiguration {
    #[serde(rename = "ObjectLockEnabled", skip_serializing_if = "Option::is_none")]
    pub object_lock_enabled: Option<String>,

    #[serde(rename = "Rule", skip_serializing_if = "Option::is_none")]
    pub rule: Option<ObjectLockRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename = "Rule")]
pub struct ObjectLockRule {
    #[serde(rename = "DefaultRetention")]
    pub default_retention: DefaultRetention,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DefaultRetention {
    #[serde(rename = "Mode", skip_serializing_if = "Option::is_none")]
    pub mode: Option<RetentionMode>,

    #[serde(rename = "Days", skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,

    #[serde(rename = "Years", skip_serializing_if = "Option::is_none")]
    pub years: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetentionMode {
    Governance,
    Compliance,
}

impl std::fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetentionMode::Governance => f.write_str("GOVERNANCE"),
            RetentionMode::Compliance => f.write_str("COMPLIANCE"),
        }
    }
}

impl std::str::FromStr for RetentionMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GOVERNANCE" => Ok(RetentionMode::Governance),
            "COMPLIANCE" => Ok(RetentionMode::Compliance),
            _ => Err(crate::Error::MalformedXml(format!(
                "Invalid retention mode: {}",
                s
            ))),
        }
    }
}

/// Per-object retention setting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename = "Retention")]
pub struct Retention {
    #[serde(rename = "Mode")]
    pub mode: RetentionMode,

    #[serde(rename = "RetainUntilDate")]
    pub retain_until_date: DateTime<Utc>,
}

/// Per-object legal hold setting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename = "LegalHold")]
pub struct LegalHold {
    #[serde(rename = "Status")]
    pub status: String,
}

impl LegalHold {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self.status.as_str() {
            "ON" | "OFF" => Ok(()),
            other => Err(crate::Error::MalformedXml(format!(
                "Invalid legal hold status: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_retention_mode_parsing() {
        assert_eq!(
            RetentionMode::from_str("GOVERNANCE").unwrap(),
            RetentionMode::Governance
        );
        assert!(RetentionMode::from_str("governance").is_err());
    }

    #[test]
    fn test_legal_hold_status() {
        assert!(LegalHold { status: "ON".into() }.validate().is_ok());
        assert!(LegalHold { status: "OFF".into() }.validate().is_ok());
        assert!(LegalHold { status: "MAYBE".into() }.validate().is_err());
    }
}
