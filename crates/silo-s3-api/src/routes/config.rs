//! Per-bucket and per-object configuration handlers: versioning, tagging,
//! ACLs, lifecycle, encryption, website, policy, and the version listing.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use serde::Deserialize;
use silo_core::types::AccessControlList;
use silo_core::utils::generate_request_id;
use silo_core::{Error, DEFAULT_MAX_KEYS};
use silo_storage::ListVersionsParams;
use std::str::FromStr;
use tracing::{debug, info};

use super::{empty_response, error_response, xml_response};
use crate::server::AppState;
use crate::xml;

// ============= Versioning =============

pub async fn put_bucket_versioning(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutBucketVersioning bucket={} request_id={}",
        bucket, request_id
    );

    let status = match xml::parse_versioning(&String::from_utf8_lossy(&body)) {
        Ok(status) => status,
        Err(e) => return error_response(e, &request_id),
    };

    match state.storage.put_bucket_versioning(&bucket, status).await {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_bucket_versioning(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();
    debug!(
        "GetBucketVersioning bucket={} request_id={}",
        bucket, request_id
    );

    match state.storage.get_bucket_versioning(&bucket).await {
        Ok(status) => xml_response(
            StatusCode::OK,
            xml::versioning_response(status),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

#[derive(Debug, Deserialize, Default)]
struct ListVersionsQuery {
    prefix: Option<String>,
    #[serde(rename = "key-marker")]
    key_marker: Option<String>,
    #[serde(rename = "version-id-marker")]
    version_id_marker: Option<String>,
    #[serde(rename = "max-keys")]
    max_keys: Option<i32>,
}

pub async fn list_object_versions(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    query: &str,
) -> Response {
    let request_id = generate_request_id();
    let params: ListVersionsQuery = serde_urlencoded::from_str(query).unwrap_or_default();
    debug!(
        "ListObjectVersions bucket={} request_id={}",
        bucket, request_id
    );

    let max_keys = params
        .max_keys
        .unwrap_or(DEFAULT_MAX_KEYS)
        .clamp(0, DEFAULT_MAX_KEYS);
    let prefix = params.prefix.unwrap_or_default();

    let engine_params = ListVersionsParams {
        prefix: prefix.clone(),
        key_marker: params.key_marker,
        version_id_marker: params.version_id_marker,
        max_keys,
    };

    match state.storage.list_object_versions(&bucket, engine_params).await {
        Ok(page) => xml_response(
            StatusCode::OK,
            xml::list_versions_response(&bucket, &prefix, max_keys, &page),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

// ============= Tagging =============

pub async fn put_bucket_tagging(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutBucketTagging bucket={} request_id={}",
        bucket, request_id
    );

    let tags = match xml::parse_tagging(&String::from_utf8_lossy(&body)) {
        Ok(tags) => tags,
        Err(e) => return error_response(e, &request_id),
    };

    match state.storage.put_bucket_tagging(&bucket, tags).await {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_bucket_tagging(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_bucket_tagging(&bucket).await {
        Ok(tags) => xml_response(StatusCode::OK, xml::tagging_response(&tags), &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn delete_bucket_tagging(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.delete_bucket_tagging(&bucket).await {
        Ok(()) => empty_response(StatusCode::NO_CONTENT, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn put_object_tagging(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutObjectTagging bucket={} key={} request_id={}",
        bucket, key, request_id
    );

    let tags = match xml::parse_tagging(&String::from_utf8_lossy(&body)) {
        Ok(tags) => tags,
        Err(e) => return error_response(e, &request_id),
    };

    match state.storage.put_object_tagging(&bucket, &key, tags).await {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_object_tagging(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_object_tagging(&bucket, &key).await {
        Ok(tags) => xml_response(StatusCode::OK, xml::tagging_response(&tags), &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn delete_object_tagging(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.delete_object_tagging(&bucket, &key).await {
        Ok(()) => empty_response(StatusCode::NO_CONTENT, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

// ============= ACLs =============

/// Resolve the stored ACL for a put: a canned `x-amz-acl` header wins,
/// otherwise the XML body document.
fn resolve_acl(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<AccessControlList, Error> {
    if let Some(canned) = headers.get("x-amz-acl").and_then(|v| v.to_str().ok()) {
        let canned = silo_core::types::CannedAcl::from_str(canned)?;
        return Ok(AccessControlList::from_canned(
            state.storage.owner(),
            canned,
        ));
    }
    if body.is_empty() {
        return Ok(AccessControlList::default_for(state.storage.owner()));
    }
    xml::parse_acl(&String::from_utf8_lossy(body))
}

pub async fn put_bucket_acl(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!("PutBucketAcl bucket={} request_id={}", bucket, request_id);

    let acl = match resolve_acl(&state, &headers, &body) {
        Ok(acl) => acl,
        Err(e) => return error_response(e, &request_id),
    };

    match state.storage.put_bucket_acl(&bucket, acl).await {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_bucket_acl(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_bucket_acl(&bucket).await {
        Ok(acl) => xml_response(StatusCode::OK, xml::acl_response(&acl), &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn put_object_acl(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutObjectAcl bucket={} key={} request_id={}",
        bucket, key, request_id
    );

    let acl = match resolve_acl(&state, &headers, &body) {
        Ok(acl) => acl,
        Err(e) => return error_response(e, &request_id),
    };

    match state.storage.put_object_acl(&bucket, &key, acl).await {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_object_acl(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_object_acl(&bucket, &key).await {
        Ok(acl) => xml_response(StatusCode::OK, xml::acl_response(&acl), &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

// ============= Lifecycle =============

pub async fn put_bucket_lifecycle(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutBucketLifecycle bucket={} request_id={}",
        bucket, request_id
    );

    let config = match xml::parse_lifecycle(&String::from_utf8_lossy(&body)) {
        Ok(config) => config,
        Err(e) => return error_response(e, &request_id),
    };

    match state.storage.put_bucket_lifecycle(&bucket, config).await {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_bucket_lifecycle(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_bucket_lifecycle(&bucket).await {
        Ok(config) => xml_response(
            StatusCode::OK,
            xml::lifecycle_response(&config),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn delete_bucket_lifecycle(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.delete_bucket_lifecycle(&bucket).await {
        Ok(()) => empty_response(StatusCode::NO_CONTENT, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

// ============= Encryption =============

pub async fn put_bucket_encryption(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutBucketEncryption bucket={} request_id={}",
        bucket, request_id
    );

    let config = match xml::parse_encryption(&String::from_utf8_lossy(&body)) {
        Ok(config) => config,
        Err(e) => return error_response(e, &request_id),
    };

    match state.storage.put_bucket_encryption(&bucket, config).await {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_bucket_encryption(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_bucket_encryption(&bucket).await {
        Ok(config) => xml_response(
            StatusCode::OK,
            xml::encryption_response(&config),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn delete_bucket_encryption(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.delete_bucket_encryption(&bucket).await {
        Ok(()) => empty_response(StatusCode::NO_CONTENT, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

// ============= Website =============

pub async fn put_bucket_website(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutBucketWebsite bucket={} request_id={}",
        bucket, request_id
    );

    let config = match xml::parse_website(&String::from_utf8_lossy(&body)) {
        Ok(config) => config,
        Err(e) => return error_response(e, &request_id),
    };

    match state.storage.put_bucket_website(&bucket, config).await {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_bucket_website(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_bucket_website(&bucket).await {
        Ok(config) => xml_response(StatusCode::OK, xml::website_response(&config), &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn delete_bucket_website(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.delete_bucket_website(&bucket).await {
        Ok(()) => empty_response(StatusCode::NO_CONTENT, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

// ============= Policy =============

pub async fn put_bucket_policy(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!("PutBucketPolicy bucket={} request_id={}", bucket, request_id);

    let policy = match String::from_utf8(body.to_vec()) {
        Ok(policy) => policy,
        Err(_) => {
            return error_response(
                Error::MalformedPolicy("Policy must be UTF-8 JSON".into()),
                &request_id,
            )
        }
    };

    match state.storage.put_bucket_policy(&bucket, policy).await {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_bucket_policy(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_bucket_policy(&bucket).await {
        Ok(policy) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .header("x-amz-request-id", &request_id)
            .body(Body::from(policy))
            .unwrap(),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn delete_bucket_policy(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.delete_bucket_policy(&bucket).await {
        Ok(()) => empty_response(StatusCode::NO_CONTENT, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}
