//! S3 API routes
//!
//! Dispatch is by `(method, path shape, query sub-resource, header
//! presence)`: the router resolves the path shape, these per-method
//! dispatchers sniff the query string for the sub-resource, and concrete
//! handlers call the storage capability and marshal XML.

pub mod config;
pub mod cors;
pub mod multipart;
pub mod object_lock;

pub use cors::{cors_preflight_bucket, cors_preflight_object};

use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use silo_core::types::{ByteRange, MetadataDirective, ObjectRecord, TagSet};
use silo_core::utils::{
    format_http_datetime, generate_request_id, quote_etag,
};
use silo_core::{Error, DEFAULT_MAX_KEYS};
use silo_storage::{CopyObjectOptions, ListObjectsV2Params, PutObjectOptions};
use serde::Deserialize;
use std::collections::HashMap;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};

use crate::server::AppState;
use crate::xml;

// ============= Response helpers =============

pub fn error_response(err: Error, request_id: &str) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if matches!(err, Error::Database(_) | Error::Internal(_) | Error::Io(_)) {
        error!("Internal error: {}", err);
    }
    let body = silo_core::error::S3ErrorResponse::from(err)
        .with_request_id(request_id)
        .to_xml();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/xml")
        .header("x-amz-request-id", request_id)
        .body(Body::from(body))
        .unwrap()
}

pub(crate) fn xml_response(status: StatusCode, body: String, request_id: &str) -> Response {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/xml")
        .header("x-amz-request-id", request_id)
        .body(Body::from(body))
        .unwrap()
}

pub(crate) fn empty_response(status: StatusCode, request_id: &str) -> Response {
    Response::builder()
        .status(status)
        .header("x-amz-request-id", request_id)
        .body(Body::empty())
        .unwrap()
}

// ============= Query helpers =============

pub(crate) fn query_pairs(query: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str(query).unwrap_or_default()
}

pub(crate) fn query_has_key(query: &str, name: &str) -> bool {
    query_pairs(query).iter().any(|(k, _)| k == name)
}

pub(crate) fn query_param(query: &str, name: &str) -> Option<String> {
    query_pairs(query)
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}

pub(crate) fn version_id_param(query: &str) -> Option<String> {
    query_param(query, "versionId").filter(|v| !v.is_empty())
}

fn user_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            name.as_str().strip_prefix("x-amz-meta-").map(|key| {
                (
                    key.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
        })
        .collect()
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse `x-amz-copy-source`: `/bucket/key` or `bucket/key`, URL-encoded,
/// with an optional `?versionId=...` suffix.
fn parse_copy_source(value: &str) -> Result<(String, String, Option<String>), Error> {
    let (path, version_id) = match value.split_once('?') {
        Some((path, query)) => (path, version_id_param(query)),
        None => (value, None),
    };

    let decoded = urlencoding::decode(path)
        .map_err(|_| Error::InvalidArgument("Invalid copy source encoding".into()))?;
    let trimmed = decoded.trim_start_matches('/');

    let (bucket, key) = trimmed
        .split_once('/')
        .ok_or_else(|| Error::InvalidArgument("Copy source must be bucket/key".into()))?;
    if bucket.is_empty() || key.is_empty() {
        return Err(Error::InvalidArgument("Copy source must be bucket/key".into()));
    }

    Ok((bucket.to_string(), key.to_string(), version_id))
}

// ============= Service operations =============

pub async fn list_buckets(State(state): State<AppState>) -> Response {
    let request_id = generate_request_id();
    debug!("ListBuckets request_id={}", request_id);

    match state.storage.list_buckets().await {
        Ok(buckets) => {
            let body = xml::list_buckets_response(&buckets, &state.storage.owner());
            xml_response(StatusCode::OK, body, &request_id)
        }
        Err(e) => error_response(e, &request_id),
    }
}

// ============= Bucket dispatchers =============

pub async fn bucket_get_handler(
    state: State<AppState>,
    path: Path<String>,
    raw_query: RawQuery,
) -> Response {
    let query = raw_query.0.unwrap_or_default();

    if query_has_key(&query, "location") {
        return get_bucket_location(state, path).await;
    }
    if query_has_key(&query, "versioning") {
        return config::get_bucket_versioning(state, path).await;
    }
    if query_has_key(&query, "tagging") {
        return config::get_bucket_tagging(state, path).await;
    }
    if query_has_key(&query, "acl") {
        return config::get_bucket_acl(state, path).await;
    }
    if query_has_key(&query, "cors") {
        return cors::get_bucket_cors(state, path).await;
    }
    if query_has_key(&query, "lifecycle") {
        return config::get_bucket_lifecycle(state, path).await;
    }
    if query_has_key(&query, "encryption") {
        return config::get_bucket_encryption(state, path).await;
    }
    if query_has_key(&query, "policy") {
        return config::get_bucket_policy(state, path).await;
    }
    if query_has_key(&query, "website") {
        return config::get_bucket_website(state, path).await;
    }
    if query_has_key(&query, "object-lock") {
        return object_lock::get_object_lock_configuration(state, path).await;
    }
    if query_has_key(&query, "versions") {
        return config::list_object_versions(state, path, &query).await;
    }
    if query_has_key(&query, "uploads") {
        return multipart::list_multipart_uploads(state, path, &query).await;
    }

    list_objects(state, path, &query).await
}

pub async fn bucket_put_handler(
    state: State<AppState>,
    path: Path<String>,
    raw_query: RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = raw_query.0.unwrap_or_default();

    if query_has_key(&query, "versioning") {
        return config::put_bucket_versioning(state, path, body).await;
    }
    if query_has_key(&query, "tagging") {
        return config::put_bucket_tagging(state, path, body).await;
    }
    if query_has_key(&query, "acl") {
        return config::put_bucket_acl(state, path, headers, body).await;
    }
    if query_has_key(&query, "cors") {
        return cors::put_bucket_cors(state, path, body).await;
    }
    if query_has_key(&query, "lifecycle") {
        return config::put_bucket_lifecycle(state, path, body).await;
    }
    if query_has_key(&query, "encryption") {
        return config::put_bucket_encryption(state, path, body).await;
    }
    if query_has_key(&query, "policy") {
        return config::put_bucket_policy(state, path, body).await;
    }
    if query_has_key(&query, "website") {
        return config::put_bucket_website(state, path, body).await;
    }
    if query_has_key(&query, "object-lock") {
        return object_lock::put_object_lock_configuration(state, path, body).await;
    }

    create_bucket(state, path, headers).await
}

pub async fn bucket_delete_handler(
    state: State<AppState>,
    path: Path<String>,
    raw_query: RawQuery,
) -> Response {
    let query = raw_query.0.unwrap_or_default();

    if query_has_key(&query, "tagging") {
        return config::delete_bucket_tagging(state, path).await;
    }
    if query_has_key(&query, "cors") {
        return cors::delete_bucket_cors(state, path).await;
    }
    if query_has_key(&query, "lifecycle") {
        return config::delete_bucket_lifecycle(state, path).await;
    }
    if query_has_key(&query, "encryption") {
        return config::delete_bucket_encryption(state, path).await;
    }
    if query_has_key(&query, "policy") {
        return config::delete_bucket_policy(state, path).await;
    }
    if query_has_key(&query, "website") {
        return config::delete_bucket_website(state, path).await;
    }

    delete_bucket(state, path).await
}

pub async fn bucket_post_handler(
    state: State<AppState>,
    path: Path<String>,
    raw_query: RawQuery,
    body: Bytes,
) -> Response {
    let query = raw_query.0.unwrap_or_default();
    let request_id = generate_request_id();

    if query_has_key(&query, "delete") {
        return delete_objects(state, path, body).await;
    }

    error_response(
        Error::InvalidRequest("Unknown bucket POST operation".into()),
        &request_id,
    )
}

// ============= Object dispatchers =============

pub async fn object_get_handler(
    state: State<AppState>,
    path: Path<(String, String)>,
    raw_query: RawQuery,
    headers: HeaderMap,
) -> Response {
    let query = raw_query.0.unwrap_or_default();

    if query_has_key(&query, "tagging") {
        return config::get_object_tagging(state, path).await;
    }
    if query_has_key(&query, "acl") {
        return config::get_object_acl(state, path).await;
    }
    if query_has_key(&query, "retention") {
        return object_lock::get_object_retention(state, path).await;
    }
    if query_has_key(&query, "legal-hold") {
        return object_lock::get_object_legal_hold(state, path).await;
    }
    if query_has_key(&query, "attributes") {
        return get_object_attributes(state, path, headers).await;
    }
    if query_has_key(&query, "uploadId") {
        return multipart::list_parts(state, path, &query).await;
    }

    get_object(state, path, headers, version_id_param(&query)).await
}

pub async fn object_put_handler(
    state: State<AppState>,
    path: Path<(String, String)>,
    raw_query: RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = raw_query.0.unwrap_or_default();

    if query_has_key(&query, "tagging") {
        return config::put_object_tagging(state, path, body).await;
    }
    if query_has_key(&query, "acl") {
        return config::put_object_acl(state, path, headers, body).await;
    }
    if query_has_key(&query, "retention") {
        return object_lock::put_object_retention(state, path, body).await;
    }
    if query_has_key(&query, "legal-hold") {
        return object_lock::put_object_legal_hold(state, path, body).await;
    }
    if query_has_key(&query, "uploadId") && query_has_key(&query, "partNumber") {
        if headers.contains_key("x-amz-copy-source") {
            return multipart::upload_part_copy(state, path, &query, headers).await;
        }
        return multipart::upload_part(state, path, &query, headers, body).await;
    }
    if headers.contains_key("x-amz-copy-source") {
        return copy_object(state, path, headers).await;
    }

    put_object(state, path, headers, body).await
}

pub async fn object_delete_handler(
    state: State<AppState>,
    path: Path<(String, String)>,
    raw_query: RawQuery,
) -> Response {
    let query = raw_query.0.unwrap_or_default();

    if query_has_key(&query, "tagging") {
        return config::delete_object_tagging(state, path).await;
    }
    if query_has_key(&query, "uploadId") {
        return multipart::abort_multipart_upload(state, path, &query).await;
    }

    delete_object(state, path, version_id_param(&query)).await
}

pub async fn object_post_handler(
    state: State<AppState>,
    path: Path<(String, String)>,
    raw_query: RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = raw_query.0.unwrap_or_default();
    let request_id = generate_request_id();

    if query_has_key(&query, "uploadId") {
        return multipart::complete_multipart_upload(state, path, &query, body).await;
    }
    if query_has_key(&query, "uploads") {
        return multipart::create_multipart_upload(state, path, headers).await;
    }

    error_response(
        Error::InvalidRequest("Unknown object POST operation".into()),
        &request_id,
    )
}

pub async fn head_object_handler(
    state: State<AppState>,
    path: Path<(String, String)>,
    raw_query: RawQuery,
) -> Response {
    let query = raw_query.0.unwrap_or_default();
    head_object(state, path, version_id_param(&query)).await
}

// ============= Bucket operations =============

pub async fn head_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();
    debug!("HeadBucket bucket={} request_id={}", bucket, request_id);

    match state.storage.head_bucket(&bucket).await {
        Ok(_) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

async fn create_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = generate_request_id();
    info!("CreateBucket bucket={} request_id={}", bucket, request_id);

    let object_lock = header(&headers, "x-amz-bucket-object-lock-enabled")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    match state.storage.create_bucket(&bucket, object_lock).await {
        Ok(()) => Response::builder()
            .status(StatusCode::OK)
            .header("Location", format!("/{}", bucket))
            .header("x-amz-request-id", &request_id)
            .body(Body::empty())
            .unwrap(),
        Err(e) => error_response(e, &request_id),
    }
}

async fn delete_bucket(State(state): State<AppState>, Path(bucket): Path<String>) -> Response {
    let request_id = generate_request_id();
    info!("DeleteBucket bucket={} request_id={}", bucket, request_id);

    match state.storage.delete_bucket(&bucket).await {
        Ok(()) => empty_response(StatusCode::NO_CONTENT, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

async fn get_bucket_location(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    if let Err(e) = state.storage.head_bucket(&bucket).await {
        return error_response(e, &request_id);
    }
    xml_response(StatusCode::OK, xml::location_response(), &request_id)
}

#[derive(Debug, Deserialize, Default)]
struct ListObjectsQuery {
    #[serde(rename = "list-type")]
    list_type: Option<String>,
    prefix: Option<String>,
    delimiter: Option<String>,
    #[serde(rename = "max-keys")]
    max_keys: Option<i32>,
    #[serde(rename = "continuation-token")]
    continuation_token: Option<String>,
    #[serde(rename = "start-after")]
    start_after: Option<String>,
    marker: Option<String>,
}

async fn list_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    query: &str,
) -> Response {
    let request_id = generate_request_id();
    let params: ListObjectsQuery = serde_urlencoded::from_str(query).unwrap_or_default();
    debug!("ListObjects bucket={} request_id={}", bucket, request_id);

    let is_v2 = params.list_type.as_deref() == Some("2");
    let max_keys = params
        .max_keys
        .unwrap_or(DEFAULT_MAX_KEYS)
        .clamp(0, DEFAULT_MAX_KEYS);

    let engine_params = ListObjectsV2Params {
        prefix: params.prefix.clone().unwrap_or_default(),
        delimiter: params.delimiter.clone().filter(|d| !d.is_empty()),
        max_keys,
        continuation_token: if is_v2 {
            params.continuation_token.clone()
        } else {
            params.marker.clone()
        },
        start_after: if is_v2 { params.start_after.clone() } else { None },
    };

    match state.storage.list_objects_v2(&bucket, engine_params.clone()).await {
        Ok(page) => {
            let owner = state.storage.owner();
            let body = if is_v2 {
                xml::list_objects_v2_response(&bucket, &engine_params, &page, &owner)
            } else {
                xml::list_objects_v1_response(
                    &bucket,
                    &engine_params.prefix,
                    engine_params.delimiter.as_deref(),
                    params.marker.as_deref(),
                    max_keys,
                    &page,
                    &owner,
                )
            };
            xml_response(StatusCode::OK, body, &request_id)
        }
        Err(e) => error_response(e, &request_id),
    }
}

async fn delete_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!("DeleteObjects bucket={} request_id={}", bucket, request_id);

    let body = String::from_utf8_lossy(&body);
    let (objects, quiet) = match xml::parse_delete_objects(&body) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(e, &request_id),
    };

    match state.storage.delete_objects(&bucket, objects).await {
        Ok(result) => xml_response(
            StatusCode::OK,
            xml::delete_objects_response(&result, quiet),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

// ============= Object operations =============

fn object_headers(builder: axum::http::response::Builder, record: &ObjectRecord) -> axum::http::response::Builder {
    let mut builder = builder
        .header("Content-Type", &record.content_type)
        .header("ETag", quote_etag(&record.etag))
        .header("Last-Modified", format_http_datetime(&record.last_modified))
        .header("Accept-Ranges", "bytes");

    if !record.version_id.is_empty() {
        builder = builder.header("x-amz-version-id", &record.version_id);
    }
    for (key, value) in &record.metadata {
        builder = builder.header(format!("x-amz-meta-{}", key), value);
    }
    builder
}

async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    version_id: Option<String>,
) -> Response {
    let request_id = generate_request_id();
    debug!(
        "HeadObject bucket={} key={} request_id={}",
        bucket, key, request_id
    );

    match state
        .storage
        .head_object(&bucket, &key, version_id.as_deref())
        .await
    {
        Ok(record) => object_headers(
            Response::builder()
                .status(StatusCode::OK)
                .header("x-amz-request-id", &request_id),
            &record,
        )
        .header("Content-Length", record.size.to_string())
        .body(Body::empty())
        .unwrap(),
        Err(e) => error_response(e, &request_id),
    }
}

async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    version_id: Option<String>,
) -> Response {
    let request_id = generate_request_id();
    debug!(
        "GetObject bucket={} key={} request_id={}",
        bucket, key, request_id
    );

    if let Some(range_header) = header(&headers, "range") {
        let range = match ByteRange::parse(range_header) {
            Ok(range) => range,
            Err(e) => return error_response(e, &request_id),
        };

        return match state
            .storage
            .get_object_range(&bucket, &key, version_id.as_deref(), range)
            .await
        {
            Ok((record, stream, (start, end))) => object_headers(
                Response::builder()
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header("x-amz-request-id", &request_id),
                &record,
            )
            .header("Content-Length", (end - start + 1).to_string())
            .header(
                "Content-Range",
                format!("bytes {}-{}/{}", start, end, record.size),
            )
            .body(Body::from_stream(ReaderStream::new(stream)))
            .unwrap(),
            Err(e) => error_response(e, &request_id),
        };
    }

    match state
        .storage
        .get_object(&bucket, &key, version_id.as_deref())
        .await
    {
        Ok((record, stream)) => object_headers(
            Response::builder()
                .status(StatusCode::OK)
                .header("x-amz-request-id", &request_id),
            &record,
        )
        .header("Content-Length", record.size.to_string())
        .body(Body::from_stream(ReaderStream::new(stream)))
        .unwrap(),
        Err(e) => error_response(e, &request_id),
    }
}

async fn put_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutObject bucket={} key={} size={} request_id={}",
        bucket,
        key,
        body.len(),
        request_id
    );

    if header(&headers, "content-length").is_none()
        && header(&headers, "transfer-encoding").is_none()
    {
        return error_response(Error::MissingContentLength, &request_id);
    }

    let content_type = header(&headers, "content-type")
        .map(String::from)
        .unwrap_or_else(|| {
            mime_guess::from_path(&key)
                .first_or_octet_stream()
                .to_string()
        });

    let tags = match header(&headers, "x-amz-tagging") {
        Some(value) => match TagSet::parse_header(value) {
            Ok(tags) => Some(tags),
            Err(e) => return error_response(e, &request_id),
        },
        None => None,
    };

    let opts = PutObjectOptions {
        content_type: Some(content_type),
        metadata: user_metadata(&headers),
        tags,
    };

    match state.storage.put_object(&bucket, &key, body, opts).await {
        Ok(result) => {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header("ETag", quote_etag(&result.etag))
                .header("x-amz-request-id", &request_id);
            if let Some(ref vid) = result.version_id {
                builder = builder.header("x-amz-version-id", vid);
            }
            builder.body(Body::empty()).unwrap()
        }
        Err(e) => error_response(e, &request_id),
    }
}

async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    version_id: Option<String>,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "DeleteObject bucket={} key={} request_id={}",
        bucket, key, request_id
    );

    match state
        .storage
        .delete_object(&bucket, &key, version_id.as_deref())
        .await
    {
        Ok(result) => {
            let mut builder = Response::builder()
                .status(StatusCode::NO_CONTENT)
                .header("x-amz-request-id", &request_id);
            if result.delete_marker {
                builder = builder.header("x-amz-delete-marker", "true");
            }
            if let Some(ref vid) = result.version_id {
                builder = builder.header("x-amz-version-id", vid);
            }
            builder.body(Body::empty()).unwrap()
        }
        Err(e) => error_response(e, &request_id),
    }
}

async fn copy_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let request_id = generate_request_id();

    let source = match header(&headers, "x-amz-copy-source") {
        Some(value) => value,
        None => {
            return error_response(
                Error::InvalidArgument("Missing x-amz-copy-source".into()),
                &request_id,
            )
        }
    };
    let (src_bucket, src_key, _src_version) = match parse_copy_source(source) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(e, &request_id),
    };

    info!(
        "CopyObject {}/{} -> {}/{} request_id={}",
        src_bucket, src_key, bucket, key, request_id
    );

    let directive = match header(&headers, "x-amz-metadata-directive") {
        Some(value) => match MetadataDirective::parse(value) {
            Ok(directive) => directive,
            Err(e) => return error_response(e, &request_id),
        },
        None => MetadataDirective::Copy,
    };

    let opts = CopyObjectOptions {
        directive,
        content_type: header(&headers, "content-type").map(String::from),
        metadata: user_metadata(&headers),
    };

    match state
        .storage
        .copy_object(&src_bucket, &src_key, &bucket, &key, opts)
        .await
    {
        Ok(record) => xml_response(
            StatusCode::OK,
            xml::copy_object_response(&record.etag, &record.last_modified),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

async fn get_object_attributes(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let request_id = generate_request_id();

    let requested: Vec<String> = header(&headers, "x-amz-object-attributes")
        .unwrap_or_default()
        .split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    if requested.is_empty() {
        return error_response(
            Error::InvalidArgument("x-amz-object-attributes is required".into()),
            &request_id,
        );
    }

    let record = match state.storage.head_object(&bucket, &key, None).await {
        Ok(record) => record,
        Err(e) => return error_response(e, &request_id),
    };

    let wants = |name: &str| requested.iter().any(|a| a == name);

    // Completed multipart objects carry the part count in the ETag suffix
    let parts_count = if wants("ObjectParts") {
        record
            .etag
            .rsplit_once('-')
            .and_then(|(_, count)| count.parse::<usize>().ok())
    } else {
        None
    };

    let body = xml::object_attributes_response(
        wants("ETag").then_some(record.etag.as_str()),
        wants("ObjectSize").then_some(record.size),
        wants("StorageClass"),
        parts_count,
    );

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/xml")
        .header("x-amz-request-id", &request_id)
        .header("Last-Modified", format_http_datetime(&record.last_modified))
        .body(Body::from(body))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
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

    async fn send(
        app: &axum::Router,
        request: Request<Body>,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    fn put(uri: &str, body: &'static [u8], content_type: &str) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header("Content-Type", content_type)
            .header("Content-Length", body.len())
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let app = test_app();

        let (status, ..) = send(
            &app,
            Request::builder()
                .method("PUT")
                .uri("/test-bucket")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, headers, _) = send(
            &app,
            put("/test-bucket/k", b"Hello, World!", "text/plain"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers.get("etag").unwrap(),
            "\"65a8e27d8879283831b664bd8b7f0ad4\""
        );

        let (status, headers, body) = send(&app, get("/test-bucket/k")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("content-length").unwrap(), "13");
        assert_eq!(headers.get("content-type").unwrap(), "text/plain");
        assert_eq!(&body[..], b"Hello, World!");
    }

    #[tokio::test]
    async fn test_range_request() {
        let app = test_app();
        send(
            &app,
            Request::builder()
                .method("PUT")
                .uri("/b")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        send(&app, put("/b/k", b"0123456789ABCDEF", "text/plain")).await;

        let request = Request::builder()
            .method("GET")
            .uri("/b/k")
            .header("Range", "bytes=0-4")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers.get("content-range").unwrap(), "bytes 0-4/16");
        assert_eq!(&body[..], b"01234");

        let request = Request::builder()
            .method("GET")
            .uri("/b/k")
            .header("Range", "bytes=90-99")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert!(String::from_utf8_lossy(&body).contains("InvalidRange"));
    }

    #[tokio::test]
    async fn test_invalid_bucket_names() {
        let app = test_app();
        for name in ["ab", "My-Bucket", "bucket.", ".bucket", "192.168.0.1"] {
            let (status, _, body) = send(
                &app,
                Request::builder()
                    .method("PUT")
                    .uri(format!("/{}", name))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{name}");
            assert!(String::from_utf8_lossy(&body).contains("InvalidBucketName"));
        }
    }

    #[tokio::test]
    async fn test_listing_with_delimiter() {
        let app = test_app();
        send(
            &app,
            Request::builder()
                .method("PUT")
                .uri("/b")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        for key in ["images/a.jpg", "images/b.jpg", "docs/f.txt", "root.txt"] {
            send(&app, put(&format!("/b/{}", key), b"x", "text/plain")).await;
        }

        let (status, _, body) = send(&app, get("/b?list-type=2&delimiter=%2F")).await;
        assert_eq!(status, StatusCode::OK);
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("<Key>root.txt</Key>"));
        assert!(!body.contains("<Key>images/a.jpg</Key>"));
        assert!(body.contains("<Prefix>docs/</Prefix>"));
        assert!(body.contains("<Prefix>images/</Prefix>"));
        assert!(body.contains("<KeyCount>1</KeyCount>"));
    }

    #[tokio::test]
    async fn test_delete_is_204_even_when_absent() {
        let app = test_app();
        send(
            &app,
            Request::builder()
                .method("PUT")
                .uri("/b")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        let (status, ..) = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri("/b/never-existed")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_missing_bucket_is_404() {
        let app = test_app();
        let (status, _, body) = send(&app, get("/missing/k")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(&body).contains("NoSuchBucket"));
    }

    #[tokio::test]
    async fn test_put_without_content_length_is_411() {
        let app = test_app();
        send(
            &app,
            Request::builder()
                .method("PUT")
                .uri("/b")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        let request = Request::builder()
            .method("PUT")
            .uri("/b/k")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::LENGTH_REQUIRED);
        assert!(String::from_utf8_lossy(&body).contains("MissingContentLength"));
    }

    #[tokio::test]
    async fn test_copy_object() {
        let app = test_app();
        for bucket in ["src", "dst"] {
            send(
                &app,
                Request::builder()
                    .method("PUT")
                    .uri(format!("/{bucket}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        }
        send(&app, put("/src/original.txt", b"payload", "text/plain")).await;

        let request = Request::builder()
            .method("PUT")
            .uri("/dst/copy.txt")
            .header("x-amz-copy-source", "/src/original.txt")
            .header("Content-Length", "0")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&body).contains("CopyObjectResult"));

        let (status, _, body) = send(&app, get("/dst/copy.txt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"payload");
    }

    #[tokio::test]
    async fn test_delete_objects_batch() {
        let app = test_app();
        send(
            &app,
            Request::builder()
                .method("PUT")
                .uri("/b")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        send(&app, put("/b/a.txt", b"a", "text/plain")).await;
        send(&app, put("/b/b.txt", b"b", "text/plain")).await;

        let body = r#"<Delete><Object><Key>a.txt</Key></Object><Object><Key>b.txt</Key></Object></Delete>"#;
        let request = Request::builder()
            .method("POST")
            .uri("/b?delete")
            .body(Body::from(body))
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("<Key>a.txt</Key>"));
        assert!(body.contains("<Key>b.txt</Key>"));

        let (status, ..) = send(&app, get("/b/a.txt")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_versioning_scenario() {
        let app = test_app();
        send(
            &app,
            Request::builder()
                .method("PUT")
                .uri("/b")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        let enable =
            r#"<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>"#;
        let (status, ..) = send(
            &app,
            Request::builder()
                .method("PUT")
                .uri("/b?versioning")
                .body(Body::from(enable))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, headers, _) = send(&app, put("/b/k", b"v1", "text/plain")).await;
        let v1 = headers
            .get("x-amz-version-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        send(&app, put("/b/k", b"v2", "text/plain")).await;

        let (_, _, body) = send(&app, get("/b/k")).await;
        assert_eq!(&body[..], b"v2");

        let (_, _, body) = send(&app, get(&format!("/b/k?versionId={v1}"))).await;
        assert_eq!(&body[..], b"v1");

        // Unversioned delete drops a marker
        let (status, headers, _) = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri("/b/k")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(headers.get("x-amz-delete-marker").unwrap(), "true");

        let (status, ..) = send(&app, get("/b/k")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, body) = send(&app, get(&format!("/b/k?versionId={v1}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"v1");
    }

    #[tokio::test]
    async fn test_get_object_attributes() {
        let app = test_app();
        send(
            &app,
            Request::builder()
                .method("PUT")
                .uri("/b")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        send(&app, put("/b/k", b"Hello, World!", "text/plain")).await;

        let request = Request::builder()
            .method("GET")
            .uri("/b/k?attributes")
            .header("x-amz-object-attributes", "ETag, ObjectSize")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("<ETag>65a8e27d8879283831b664bd8b7f0ad4</ETag>"));
        assert!(body.contains("<ObjectSize>13</ObjectSize>"));
        assert!(!body.contains("StorageClass"));
    }
}
