//! Silo Core Library
//!
//! Shared types, configuration, and the S3 error taxonomy for the Silo
//! object storage server.

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::SiloConfig;
pub use error::{Error, Result};

/// Silo version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default S3 region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Maximum number of parts in a multipart upload
pub const MAX_PARTS: i32 = 10_000;

/// Maximum bucket name length
pub const MAX_BUCKET_NAME_LENGTH: usize = 63;

/// Minimum bucket name length
pub const MIN_BUCKET_NAME_LENGTH: usize = 3;

/// Maximum object key length
pub const MAX_KEY_LENGTH: usize = 1024;

/// Maximum bucket policy document size (20 KiB)
pub const MAX_POLICY_SIZE: usize = 20 * 1024;

/// Default page size for listing operations
pub const DEFAULT_MAX_KEYS: i32 = 1000;
