//! Silo Metadata Store
//!
//! Durable, transactional metadata persistence on an embedded SQLite
//! database. Every bucket, object, version, multipart upload, part, and
//! per-bucket configuration lives here; object bytes live in the blob
//! store. Each call runs in its own implicit transaction; "row not found"
//! is a distinguished `None`, which the storage engine converts into domain
//! errors.

mod config;
mod multipart;
mod object;
mod store;

pub use store::MetadataStore;
