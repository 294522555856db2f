//! Bucket website configuration types
//!
//! Stored and served back; the server does not rewrite requests through it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename = "WebsiteConfiguration")]
pub struct WebsiteConfiguration {
    #[serde(rename = "IndexDocument", skip_serializing_if = "Option::is_none")]
    pub index_document: Option<IndexDocument>,

    #[serde(rename = "ErrorDocument", skip_serializing_if = "Option::is_none")]
    pub error_document: Option<ErrorDocument>,

    #[serde(
        rename = "RedirectAllRequestsTo",
        skip_serializing_if = "Option::is_none"
    )]
    pub redirect_all_requests_to: Option<RedirectAllRequestsTo>,
}

impl WebsiteConfiguration {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.redirect_all_requests_to.is_some() {
            if self.index_document.is_some() || self.error_document.is_some() {
                return Err(crate::Error::MalformedXml(
                    "RedirectAllRequestsTo cannot be combined with documents".into(),
                ));
            }
            return Ok(());
        }
        if self.index_document.is_none() {
            return Err(crate::Error::MalformedXml(
                "Website configuration requires an IndexDocument".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexDocument {
    #[serde(rename = "Suffix")]
    pub suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDocument {
    #[serde(rename = "Key")]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedirectAllRequestsTo {
    #[serde(rename = "HostName")]
    pub host_name: String,

    #[serde(rename = "Protocol", skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(WebsiteConfiguration::default().validate().is_err());

        let indexed = WebsiteConfiguration {
            index_document: Some(IndexDocument {
                suffix: "index.html".into(),
            }),
            ..Default::default()
        };
        assert!(indexed.validate().is_ok());

        let conflicting = WebsiteConfiguration {
            index_document: Some(IndexDocument {
                suffix: "index.html".into(),
            }),
            redirect_all_requests_to: Some(RedirectAllRequestsTo {
                host_name: "example.com".into(),
                protocol: None,
            }),
            ..Default::default()
        };
        assert!(conflicting.validate().is_err());
    }
}
