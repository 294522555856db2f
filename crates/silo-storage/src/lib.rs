//! Silo Storage
//!
//! The blob store (object bytes on a local filesystem) and the storage
//! engine composing it with the metadata store into the S3 data model.
//! `Storage` is the capability surface the HTTP handlers program against;
//! `FsStorage` is the production backend and `MemStorage` the in-memory
//! variant used by tests.

pub mod blob;
pub mod engine;

pub use blob::BlobStore;
pub use engine::fs::FsStorage;
pub use engine::memory::MemStorage;
pub use engine::{
    ByteStream, CompletedPart, CopyObjectOptions, DeleteObjectResult, DeleteObjectsResult,
    DeletedObject, FailedDelete, ListObjectsV2Params, ListPartsParams, ListUploadsParams,
    ListVersionsParams, ObjectIdentifier, PutObjectOptions, PutObjectResult, Storage,
};
