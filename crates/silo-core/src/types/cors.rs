//! CORS configuration types
//!
//! Serde shapes match the S3 `CORSConfiguration` XML document so request
//! bodies deserialize directly via quick-xml.

use serde::{Deserialize, Serialize};

/// CORS configuration for a bucket
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename = "CORSConfiguration")]
pub struct CorsConfiguration {
    #[serde(rename = "CORSRule", default)]
    pub rules: Vec<CorsRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename = "CORSRule")]
pub struct CorsRule {
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "AllowedOrigin")]
    pub allowed_origins: Vec<String>,

    #[serde(rename = "AllowedMethod")]
    pub allowed_methods: Vec<String>,

    #[serde(rename = "AllowedHeader", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_headers: Vec<String>,

    #[serde(rename = "ExposeHeader", default, skip_serializing_if = "Vec::is_empty")]
    pub expose_headers: Vec<String>,

    #[serde(rename = "MaxAgeSeconds", skip_serializing_if = "Option::is_none")]
    pub max_age_seconds: Option<u32>,
}

impl CorsConfiguration {
    pub const MAX_RULES: usize = 100;

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.rules.is_empty() {
            return Err(crate::Error::MalformedXml(
                "CORS configuration must have at least one rule".into(),
            ));
        }
        if self.rules.len() > Self::MAX_RULES {
            return Err(crate::Error::MalformedXml(format!(
                "At most {} CORS rules per bucket",
                Self::MAX_RULES
            )));
        }
        for rule in &self.rules {
            if rule.allowed_origins.is_empty() || rule.allowed_methods.is_empty() {
                return Err(crate::Error::MalformedXml(
                    "CORS rule requires at least one origin and method".into(),
                ));
            }
            for method in &rule.allowed_methods {
                if !matches!(method.as_str(), "GET" | "PUT" | "POST" | "DELETE" | "HEAD") {
                    return Err(crate::Error::MalformedXml(format!(
                        "Invalid CORS method: {}",
                        method
                    )));
                }
            }
        }
        Ok(())
    }

    /// Find the first rule matching an origin/method pair, for preflight.
    pub fn find_match(&self, origin: &str, method: &str) -> Option<&CorsRule> {
        self.rules.iter().find(|rule| {
            rule.allowed_methods.iter().any(|m| m == method)
                && rule.allowed_origins.iter().any(|o| origin_matches(o, origin))
        })
    }
}

fn origin_matches(pattern: &str, origin: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(star) = pattern.find('*') {
        let (prefix, suffix) = (&pattern[..star], &pattern[star + 1..]);
        return origin.len() >= prefix.len() + suffix.len()
            && origin.starts_with(prefix)
            && origin.ends_with(suffix);
    }
    pattern == origin
}
