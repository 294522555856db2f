//! Silo S3 API
//!
//! The HTTP router, SigV4 middleware, request handlers, and XML wire
//! framing for the S3-compatible surface.

pub mod middleware;
pub mod routes;
pub mod server;
pub mod xml;

pub use server::{AppState, S3Server};
