//! Bucket server-side encryption configuration types
//!
//! SSE settings are stored and served back; no key management or data
//! encryption is performed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename = "ServerSideEncryptionConfiguration")]
pub struct EncryptionConfiguration {
    #[serde(rename = "Rule", default)]
    pub rules: Vec<EncryptionRule>,
}

impl EncryptionConfiguration {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.rules.is_empty() {
            return Err(crate::Error::MalformedXml(
                "Encryption configuration must have at least one rule".into(),
            ));
        }
        for rule in &self.rules {
            let algo = &rule.apply_server_side_encryption_by_default.sse_algorithm;
            if !matches!(algo.as_str(), "AES256" | "aws:kms") {
                return Err(crate::Error::MalformedXml(format!(
                    "Invalid SSE algorithm: {}",
                    algo
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename = "Rule")]
pub struct EncryptionRule {
    #[serde(rename = "ApplyServerSideEncryptionByDefault")]
    pub apply_server_side_encryption_by_default: EncryptionByDefault,

    #[serde(rename = "BucketKeyEnabled", skip_serializing_if = "Option::is_none")]
    pub bucket_key_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncryptionByDefault {
    #[serde(rename = "SSEAlgorithm")]
    pub sse_algorithm: String,

    #[serde(rename = "KMSMasterKeyID", skip_serializing_if = "Option::is_none")]
    pub kms_master_key_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(EncryptionConfiguration::default().validate().is_err());

        let aes = EncryptionConfiguration {
            rules: vec![EncryptionRule {
                apply_server_side_encryption_by_default: EncryptionByDefault {
                    sse_algorithm: "AES256".into(),
                    kms_master_key_id: None,
                },
                bucket_key_enabled: None,
            }],
        };
        assert!(aes.validate().is_ok());

        let bogus = EncryptionConfiguration {
            rules: vec![EncryptionRule {
                apply_server_side_encryption_by_default: EncryptionByDefault {
                    sse_algorithm: "ROT13".into(),
                    kms_master_key_id: None,
                },
                bucket_key_enabled: None,
            }],
        };
        assert!(bogus.validate().is_err());
    }
}
