//! CORS configuration handlers and preflight answering
//!
//! `OPTIONS` requests are answered from the bucket's stored CORS rule set:
//! the first rule matching `(Origin, Access-Control-Request-Method)` wins.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use silo_core::utils::generate_request_id;
use tracing::info;

use super::{empty_response, error_response, xml_response};
use crate::server::AppState;
use crate::xml;

pub async fn put_bucket_cors(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!("PutBucketCors bucket={} request_id={}", bucket, request_id);

    let config = match xml::parse_cors(&String::from_utf8_lossy(&body)) {
        Ok(config) => config,
        Err(e) => return error_response(e, &request_id),
    };

    match state.storage.put_bucket_cors(&bucket, config).await {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_bucket_cors(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_bucket_cors(&bucket).await {
        Ok(config) => xml_response(StatusCode::OK, xml::cors_response(&config), &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn delete_bucket_cors(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.delete_bucket_cors(&bucket).await {
        Ok(()) => empty_response(StatusCode::NO_CONTENT, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn cors_preflight_bucket(
    state: State<AppState>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
) -> Response {
    preflight(state, bucket, headers).await
}

pub async fn cors_preflight_object(
    state: State<AppState>,
    Path((bucket, _key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    preflight(state, bucket, headers).await
}

async fn preflight(State(state): State<AppState>, bucket: String, headers: HeaderMap) -> Response {
    let request_id = generate_request_id();

    let origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let method = headers
        .get("access-control-request-method")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let config = match state.storage.get_bucket_cors(&bucket).await {
        Ok(config) => config,
        Err(e) => return error_response(e, &request_id),
    };

    let Some(rule) = config.find_match(origin, method) else {
        return empty_response(StatusCode::FORBIDDEN, &request_id);
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("x-amz-request-id", &request_id)
        .header("Access-Control-Allow-Origin", origin)
        .header("Access-Control-Allow-Methods", rule.allowed_methods.join(", "));

    if !rule.allowed_headers.is_empty() {
        builder = builder.header(
            "Access-Control-Allow-Headers",
            rule.allowed_headers.join(", "),
        );
    }
    if !rule.expose_headers.is_empty() {
        builder = builder.header(
            "Access-Control-Expose-Headers",
            rule.expose_headers.join(", "),
        );
    }
    if let Some(age) = rule.max_age_seconds {
        builder = builder.header("Access-Control-Max-Age", age.to_string());
    }

    builder.body(Body::empty()).unwrap()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use silo_core::SiloConfig;
    use silo_storage::MemStorage;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app() -> axum::Router {
        let mut config = SiloConfig::default();
        config.auth.enabled = false;
        let state = crate::server::AppState {
            config: Arc::new(config),
            storage: Arc::new(MemStorage::default()),
        };
        crate::server::create_router(state)
    }

    #[tokio::test]
    async fn test_preflight_from_stored_rules() {
        let app = test_app();

        let create = Request::builder()
            .method("PUT")
            .uri("/b")
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(create).await.unwrap();

        let cors_doc = r#"<CORSConfiguration>
            <CORSRule>
                <AllowedOrigin>https://example.com</AllowedOrigin>
                <AllowedMethod>GET</AllowedMethod>
                <AllowedHeader>*</AllowedHeader>
                <MaxAgeSeconds>600</MaxAgeSeconds>
            </CORSRule>
        </CORSConfiguration>"#;
        let put = Request::builder()
            .method("PUT")
            .uri("/b?cors")
            .body(Body::from(cors_doc))
            .unwrap();
        let response = app.clone().oneshot(put).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let preflight = Request::builder()
            .method("OPTIONS")
            .uri("/b/some/key")
            .header("Origin", "https://example.com")
            .header("Access-Control-Request-Method", "GET")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(preflight).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "https://example.com"
        );
        assert_eq!(
            response.headers().get("access-control-max-age").unwrap(),
            "600"
        );

        // Unmatched method is refused
        let preflight = Request::builder()
            .method("OPTIONS")
            .uri("/b/some/key")
            .header("Origin", "https://example.com")
            .header("Access-Control-Request-Method", "DELETE")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(preflight).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
    }
}
