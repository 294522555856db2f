//! Silo Auth
//!
//! AWS Signature Version 4 verification for the `s3` service: header and
//! presigned-URL modes, plus the `aws-chunked` body decoder. The verifier
//! mutates nothing; callers hand it the request facts and get a typed
//! verdict back.

pub mod canonical;
pub mod chunked;
pub mod presigned;
pub mod sigv4;

pub use chunked::{decode_aws_chunked, is_aws_chunked};
pub use presigned::{is_presigned_request, verify_presigned};
pub use sigv4::{Credentials, ParsedAuthorization, RequestFacts, verify_header_signature};

/// Requests timestamped further than this from server time are rejected.
pub const MAX_CLOCK_SKEW_SECS: i64 = 15 * 60;

/// Payload hash placeholder for unsigned bodies.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Payload hash marker for SigV4 streaming uploads.
pub const STREAMING_PAYLOAD: &str = "STREAMING-AWS4-HMAC-SHA256-PAYLOAD";
