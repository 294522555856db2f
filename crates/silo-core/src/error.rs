//! Error types for Silo
//!
//! The closed set of S3 error codes the server emits, with their wire codes
//! and HTTP statuses. Handlers translate engine errors through `code()` and
//! `http_status()` and serialize the XML `<Error>` document.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Bucket errors
    #[error("The specified bucket does not exist")]
    NoSuchBucket,

    #[error("Your previous request to create the named bucket succeeded and you already own it")]
    BucketAlreadyOwnedByYou,

    #[error("The bucket you tried to delete is not empty")]
    BucketNotEmpty,

    #[error("The specified bucket is not valid: {0}")]
    InvalidBucketName(String),

    #[error("The bucket does not have a policy")]
    NoSuchBucketPolicy,

    // Object errors
    #[error("The specified key does not exist")]
    NoSuchKey,

    #[error("The specified multipart upload does not exist")]
    NoSuchUpload,

    #[error("One or more of the specified parts could not be found: {0}")]
    InvalidPart(String),

    #[error("The list of parts was not in ascending order. Parts must be ordered by part number")]
    InvalidPartOrder,

    #[error("The requested range is not satisfiable")]
    InvalidRange,

    #[error("You must provide the Content-Length HTTP header")]
    MissingContentLength,

    // Per-bucket config errors
    #[error("The TagSet does not exist")]
    NoSuchTagSet,

    #[error("The CORS configuration does not exist")]
    NoSuchCorsConfiguration,

    #[error("The lifecycle configuration does not exist")]
    NoSuchLifecycleConfiguration,

    #[error("The server side encryption configuration was not found")]
    NoSuchEncryptionConfiguration,

    #[error("The specified bucket does not have a website configuration")]
    NoSuchWebsiteConfiguration,

    #[error("Object Lock configuration does not exist for this bucket")]
    ObjectLockConfigurationNotFound,

    // Access errors
    #[error("Access Denied")]
    AccessDenied,

    #[error("The AWS access key ID you provided does not exist in our records")]
    InvalidAccessKeyId,

    #[error("The request signature we calculated does not match the signature you provided")]
    SignatureDoesNotMatch,

    #[error("The difference between the request time and the server's time is too large")]
    RequestTimeTooSkewed,

    // Validation errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Your tag is not valid: {0}")]
    InvalidTag(String),

    #[error("The XML you provided was not well-formed or did not validate: {0}")]
    MalformedXml(String),

    #[error("The policy is not in the valid JSON format: {0}")]
    MalformedPolicy(String),

    #[error("The request body terminated unexpectedly")]
    IncompleteBody,

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoSuchBucket => "NoSuchBucket",
            Error::BucketAlreadyOwnedByYou => "BucketAlreadyOwnedByYou",
            Error::BucketNotEmpty => "BucketNotEmpty",
            Error::InvalidBucketName(_) => "InvalidBucketName",
            Error::NoSuchBucketPolicy => "NoSuchBucketPolicy",
            Error::NoSuchKey => "NoSuchKey",
            Error::NoSuchUpload => "NoSuchUpload",
            Error::InvalidPart(_) => "InvalidPart",
            Error::InvalidPartOrder => "InvalidPartOrder",
            Error::InvalidRange => "InvalidRange",
            Error::MissingContentLength => "MissingContentLength",
            Error::NoSuchTagSet => "NoSuchTagSet",
            Error::NoSuchCorsConfiguration => "NoSuchCORSConfiguration",
            Error::NoSuchLifecycleConfiguration => "NoSuchLifecycleConfiguration",
            Error::NoSuchEncryptionConfiguration => {
                "ServerSideEncryptionConfigurationNotFoundError"
            }
            Error::NoSuchWebsiteConfiguration => "NoSuchWebsiteConfiguration",
            Error::ObjectLockConfigurationNotFound => "ObjectLockConfigurationNotFoundError",
            Error::AccessDenied => "AccessDenied",
            Error::InvalidAccessKeyId => "InvalidAccessKeyId",
            Error::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Error::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::InvalidRequest(_) => "InvalidRequest",
            Error::InvalidTag(_) => "InvalidTag",
            Error::MalformedXml(_) => "MalformedXML",
            Error::MalformedPolicy(_) => "MalformedPolicy",
            Error::IncompleteBody => "IncompleteBody",
            Error::NotImplemented(_) => "NotImplemented",
            Error::Database(_) | Error::Internal(_) | Error::Io(_) => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidBucketName(_)
            | Error::InvalidPart(_)
            | Error::InvalidPartOrder
            | Error::InvalidArgument(_)
            | Error::InvalidRequest(_)
            | Error::InvalidTag(_)
            | Error::MalformedXml(_)
            | Error::MalformedPolicy(_)
            | Error::IncompleteBody => 400,

            Error::AccessDenied
            | Error::InvalidAccessKeyId
            | Error::SignatureDoesNotMatch
            | Error::RequestTimeTooSkewed => 403,

            Error::NoSuchBucket
            | Error::NoSuchBucketPolicy
            | Error::NoSuchKey
            | Error::NoSuchUpload
            | Error::NoSuchTagSet
            | Error::NoSuchCorsConfiguration
            | Error::NoSuchLifecycleConfiguration
            | Error::NoSuchEncryptionConfiguration
            | Error::NoSuchWebsiteConfiguration
            | Error::ObjectLockConfigurationNotFound => 404,

            Error::BucketAlreadyOwnedByYou | Error::BucketNotEmpty => 409,

            Error::MissingContentLength => 411,

            Error::InvalidRange => 416,

            Error::NotImplemented(_) => 501,

            Error::Database(_) | Error::Internal(_) | Error::Io(_) => 500,
        }
    }
}

/// S3 error response document
#[derive(Debug, Clone)]
pub struct S3ErrorResponse {
    pub code: String,
    pub message: String,
    pub resource: Option<String>,
    pub request_id: String,
}

impl From<Error> for S3ErrorResponse {
    fn from(err: Error) -> Self {
        S3ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
            resource: None,
            request_id: String::new(),
        }
    }
}

impl S3ErrorResponse {
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn to_xml(&self) -> String {
        let resource = self.resource.as_deref().unwrap_or("");
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
<Code>{}</Code>
<Message>{}</Message>
<Resource>{}</Resource>
<RequestId>{}</RequestId>
</Error>"#,
            crate::utils::xml_escape(&self.code),
            crate::utils::xml_escape(&self.message),
            crate::utils::xml_escape(resource),
            crate::utils::xml_escape(&self.request_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::NoSuchBucket.http_status(), 404);
        assert_eq!(Error::BucketAlreadyOwnedByYou.http_status(), 409);
        assert_eq!(Error::InvalidRange.http_status(), 416);
        assert_eq!(Error::MissingContentLength.http_status(), 411);
        assert_eq!(Error::SignatureDoesNotMatch.http_status(), 403);
        assert_eq!(Error::InvalidPartOrder.http_status(), 400);
    }

    #[test]
    fn test_error_xml_escapes_content() {
        let resp = S3ErrorResponse::from(Error::InvalidArgument("a<b".into()))
            .with_resource("/bucket/key")
            .with_request_id("REQ1");
        let xml = resp.to_xml();
        assert!(xml.contains("<Code>InvalidArgument</Code>"));
        assert!(xml.contains("a&lt;b"));
        assert!(xml.contains("<Resource>/bucket/key</Resource>"));
    }
}
