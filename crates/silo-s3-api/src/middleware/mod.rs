//! Request middleware

pub mod auth;

pub use auth::verify_request;
