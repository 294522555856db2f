//! Core data model types

pub mod acl;
pub mod bucket;
pub mod common;
pub mod cors;
pub mod encryption;
pub mod lifecycle;
pub mod multipart;
pub mod object;
pub mod object_lock;
pub mod tag;
pub mod website;

pub use acl::{AccessControlList, CannedAcl, Grant, Grantee, Permission};
pub use bucket::{Bucket, BucketInfo, VersioningStatus};
pub use common::Owner;
pub use cors::{CorsConfiguration, CorsRule};
pub use encryption::{EncryptionConfiguration, EncryptionRule};
pub use lifecycle::{LifecycleConfiguration, LifecycleRule};
pub use multipart::{
    ListMultipartUploadsPage, ListPartsPage, MultipartUpload, UploadPart,
};
pub use object::{
    ByteRange, DeleteMarkerEntry, ListObjectsPage, ListVersionsPage, MetadataDirective,
    ObjectRecord, ObjectVersionEntry,
};
pub use object_lock::{
    LegalHold, ObjectLockConfiguration, Retention, RetentionMode,
};
pub use tag::{Tag, TagSet};
pub use website::WebsiteConfiguration;
