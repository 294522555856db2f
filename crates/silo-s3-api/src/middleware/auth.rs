//! SigV4 authentication middleware
//!
//! Runs ahead of the router: picks header or presigned verification, then
//! unwraps `aws-chunked` bodies so handlers always see the logical payload.
//! The verifier itself mutates nothing; only the body is replaced here.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use silo_auth::{
    decode_aws_chunked, is_aws_chunked, is_presigned_request, verify_header_signature,
    verify_presigned, Credentials, RequestFacts,
};
use silo_core::utils::generate_request_id;
use silo_core::Error;
use std::collections::BTreeMap;
use tracing::debug;

use crate::routes::error_response;
use crate::server::AppState;

fn request_facts(req: &Request) -> RequestFacts {
    let mut headers = BTreeMap::new();
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_lowercase(), value.to_string());
        }
    }

    RequestFacts {
        method: req.method().as_str().to_string(),
        path: req.uri().path().to_string(),
        query: req.uri().query().unwrap_or("").to_string(),
        headers,
    }
}

pub async fn verify_request(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = generate_request_id();
    let facts = request_facts(&req);

    // CORS preflight is answered without credentials
    if state.config.auth.enabled && req.method() != http::Method::OPTIONS {
        let creds = Credentials {
            access_key: state.config.auth.access_key.clone(),
            secret_key: state.config.auth.secret_key.clone(),
            region: state.config.auth.region.clone(),
        };

        let now = Utc::now();
        let verdict = if facts.headers.contains_key("authorization") {
            verify_header_signature(&facts, &creds, now)
        } else if is_presigned_request(&facts.query) {
            verify_presigned(&facts, &creds, now)
        } else {
            Err(Error::AccessDenied)
        };

        if let Err(e) = verdict {
            debug!("Authentication failed: {}", e);
            return error_response(e, &request_id);
        }
    }

    // Chunked-body unwrap: the handler stores raw payload bytes
    let content_encoding = facts.headers.get("content-encoding").map(String::as_str);
    let content_sha256 = facts
        .headers
        .get("x-amz-content-sha256")
        .map(String::as_str);

    if is_aws_chunked(content_encoding, content_sha256) {
        let (mut parts, body) = req.into_parts();

        let raw = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return error_response(Error::Internal(format!("Body read: {}", e)), &request_id)
            }
        };

        let decoded: Bytes = match decode_aws_chunked(&raw) {
            Ok(decoded) => decoded,
            Err(e) => return error_response(e, &request_id),
        };

        // The envelope is gone; fix the framing headers to match
        strip_chunked_encoding(&mut parts.headers);
        parts.headers.insert(
            http::header::CONTENT_LENGTH,
            http::HeaderValue::from(decoded.len()),
        );

        return next.run(Request::from_parts(parts, Body::from(decoded))).await;
    }

    next.run(req).await
}

/// Remove `aws-chunked` from Content-Encoding, dropping the header entirely
/// when nothing else remains.
fn strip_chunked_encoding(headers: &mut http::HeaderMap) {
    let Some(value) = headers
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
    else {
        return;
    };

    let remaining: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.eq_ignore_ascii_case("aws-chunked"))
        .collect();

    if remaining.is_empty() {
        headers.remove(http::header::CONTENT_ENCODING);
    } else if let Ok(new_value) = http::HeaderValue::from_str(&remaining.join(", ")) {
        headers.insert(http::header::CONTENT_ENCODING, new_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_chunked_encoding_only() {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_ENCODING,
            "aws-chunked".parse().unwrap(),
        );
        strip_chunked_encoding(&mut headers);
        assert!(headers.get(http::header::CONTENT_ENCODING).is_none());
    }

    #[test]
    fn test_strip_chunked_encoding_keeps_others() {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_ENCODING,
            "gzip, aws-chunked".parse().unwrap(),
        );
        strip_chunked_encoding(&mut headers);
        assert_eq!(
            headers
                .get(http::header::CONTENT_ENCODING)
                .unwrap()
                .to_str()
                .unwrap(),
            "gzip"
        );
    }
}
