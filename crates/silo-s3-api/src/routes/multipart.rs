//! Multipart upload handlers

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use serde::Deserialize;
use silo_core::types::ByteRange;
use silo_core::utils::{generate_request_id, quote_etag};
use silo_core::{Error, DEFAULT_MAX_KEYS};
use silo_storage::{ListPartsParams, ListUploadsParams};
use tracing::{debug, info};

use super::{empty_response, error_response, query_param, xml_response};
use crate::server::AppState;
use crate::xml;

pub async fn create_multipart_upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "CreateMultipartUpload bucket={} key={} request_id={}",
        bucket, key, request_id
    );

    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let metadata = headers
        .iter()
        .filter_map(|(name, value)| {
            name.as_str().strip_prefix("x-amz-meta-").map(|meta_key| {
                (
                    meta_key.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
        })
        .collect();

    match state
        .storage
        .create_multipart_upload(&bucket, &key, content_type, metadata)
        .await
    {
        Ok(upload) => xml_response(
            StatusCode::OK,
            xml::initiate_multipart_response(&bucket, &key, &upload.upload_id),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

#[derive(Debug, Deserialize, Default)]
struct PartQuery {
    #[serde(rename = "uploadId")]
    upload_id: Option<String>,
    #[serde(rename = "partNumber")]
    part_number: Option<i32>,
}

fn part_query(query: &str) -> Result<(String, i32), Error> {
    let params: PartQuery = serde_urlencoded::from_str(query).unwrap_or_default();
    let upload_id = params
        .upload_id
        .ok_or_else(|| Error::InvalidArgument("Missing uploadId".into()))?;
    let part_number = params
        .part_number
        .ok_or_else(|| Error::InvalidArgument("Missing partNumber".into()))?;
    Ok((upload_id, part_number))
}

pub async fn upload_part(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    query: &str,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();

    let (upload_id, part_number) = match part_query(query) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(e, &request_id),
    };

    if headers.get("content-length").is_none() && headers.get("transfer-encoding").is_none() {
        return error_response(Error::MissingContentLength, &request_id);
    }

    debug!(
        "UploadPart bucket={} key={} upload_id={} part={} size={} request_id={}",
        bucket,
        key,
        upload_id,
        part_number,
        body.len(),
        request_id
    );

    match state
        .storage
        .upload_part(&bucket, &key, &upload_id, part_number, body)
        .await
    {
        Ok(etag) => Response::builder()
            .status(StatusCode::OK)
            .header("ETag", quote_etag(&etag))
            .header("x-amz-request-id", &request_id)
            .body(Body::empty())
            .unwrap(),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn upload_part_copy(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    query: &str,
    headers: HeaderMap,
) -> Response {
    let request_id = generate_request_id();

    let (upload_id, part_number) = match part_query(query) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(e, &request_id),
    };

    let source = headers
        .get("x-amz-copy-source")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let decoded = match urlencoding::decode(source) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            return error_response(
                Error::InvalidArgument("Invalid copy source encoding".into()),
                &request_id,
            )
        }
    };
    let trimmed = decoded.trim_start_matches('/');
    let Some((src_bucket, src_key)) = trimmed.split_once('/') else {
        return error_response(
            Error::InvalidArgument("Copy source must be bucket/key".into()),
            &request_id,
        );
    };

    let range = match headers
        .get("x-amz-copy-source-range")
        .and_then(|v| v.to_str().ok())
    {
        Some(value) => match ByteRange::parse(value) {
            Ok(range) => Some(range),
            Err(e) => return error_response(e, &request_id),
        },
        None => None,
    };

    info!(
        "UploadPartCopy {}/{} -> upload {} part {} request_id={}",
        src_bucket, src_key, upload_id, part_number, request_id
    );

    match state
        .storage
        .upload_part_copy(
            src_bucket,
            src_key,
            range,
            &bucket,
            &key,
            &upload_id,
            part_number,
        )
        .await
    {
        Ok(part) => xml_response(
            StatusCode::OK,
            xml::copy_part_response(&part.etag, &part.last_modified),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn complete_multipart_upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    query: &str,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();

    let Some(upload_id) = query_param(query, "uploadId") else {
        return error_response(Error::InvalidArgument("Missing uploadId".into()), &request_id);
    };

    let parts = match xml::parse_complete_multipart(&String::from_utf8_lossy(&body)) {
        Ok(parts) => parts,
        Err(e) => return error_response(e, &request_id),
    };

    info!(
        "CompleteMultipartUpload bucket={} key={} upload_id={} parts={} request_id={}",
        bucket,
        key,
        upload_id,
        parts.len(),
        request_id
    );

    match state
        .storage
        .complete_multipart_upload(&bucket, &key, &upload_id, &parts)
        .await
    {
        Ok(record) => {
            let location = format!("/{}/{}", bucket, key);
            xml_response(
                StatusCode::OK,
                xml::complete_multipart_response(&location, &bucket, &key, &record.etag),
                &request_id,
            )
        }
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn abort_multipart_upload(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    query: &str,
) -> Response {
    let request_id = generate_request_id();

    let Some(upload_id) = query_param(query, "uploadId") else {
        return error_response(Error::InvalidArgument("Missing uploadId".into()), &request_id);
    };

    info!(
        "AbortMultipartUpload bucket={} key={} upload_id={} request_id={}",
        bucket, key, upload_id, request_id
    );

    match state
        .storage
        .abort_multipart_upload(&bucket, &key, &upload_id)
        .await
    {
        Ok(()) => empty_response(StatusCode::NO_CONTENT, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

#[derive(Debug, Deserialize, Default)]
struct ListPartsQuery {
    #[serde(rename = "uploadId")]
    upload_id: Option<String>,
    #[serde(rename = "max-parts")]
    max_parts: Option<i32>,
    #[serde(rename = "part-number-marker")]
    part_number_marker: Option<i32>,
}

pub async fn list_parts(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    query: &str,
) -> Response {
    let request_id = generate_request_id();
    let params: ListPartsQuery = serde_urlencoded::from_str(query).unwrap_or_default();

    let Some(upload_id) = params.upload_id else {
        return error_response(Error::InvalidArgument("Missing uploadId".into()), &request_id);
    };
    let max_parts = params.max_parts.unwrap_or(1000).clamp(0, 1000);

    debug!(
        "ListParts bucket={} key={} upload_id={} request_id={}",
        bucket, key, upload_id, request_id
    );

    match state
        .storage
        .list_parts(
            &bucket,
            &key,
            &upload_id,
            ListPartsParams {
                max_parts,
                part_number_marker: params.part_number_marker,
            },
        )
        .await
    {
        Ok((upload, page)) => xml_response(
            StatusCode::OK,
            xml::list_parts_response(
                &upload,
                &page,
                max_parts,
                params.part_number_marker,
                &state.storage.owner(),
            ),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

#[derive(Debug, Deserialize, Default)]
struct ListUploadsQuery {
    prefix: Option<String>,
    #[serde(rename = "max-uploads")]
    max_uploads: Option<i32>,
    #[serde(rename = "key-marker")]
    key_marker: Option<String>,
    #[serde(rename = "upload-id-marker")]
    upload_id_marker: Option<String>,
}

pub async fn list_multipart_uploads(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    query: &str,
) -> Response {
    let request_id = generate_request_id();
    let params: ListUploadsQuery = serde_urlencoded::from_str(query).unwrap_or_default();

    let prefix = params.prefix.unwrap_or_default();
    let max_uploads = params.max_uploads.unwrap_or(DEFAULT_MAX_KEYS).clamp(0, DEFAULT_MAX_KEYS);

    debug!(
        "ListMultipartUploads bucket={} request_id={}",
        bucket, request_id
    );

    match state
        .storage
        .list_multipart_uploads(
            &bucket,
            ListUploadsParams {
                prefix: prefix.clone(),
                max_uploads,
                key_marker: params.key_marker,
                upload_id_marker: params.upload_id_marker,
            },
        )
        .await
    {
        Ok(page) => xml_response(
            StatusCode::OK,
            xml::list_uploads_response(
                &bucket,
                &prefix,
                max_uploads,
                &page,
                &state.storage.owner(),
            ),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use http::{Request, StatusCode};
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

    async fn body_string(response: axum::response::Response) -> String {
        String::from_utf8(
            to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap()
                .to_vec(),
        )
        .unwrap()
    }

    fn extract_tag(body: &str, tag: &str) -> String {
        let open = format!("<{}>", tag);
        let close = format!("</{}>", tag);
        let start = body.find(&open).unwrap() + open.len();
        let end = body.find(&close).unwrap();
        body[start..end].to_string()
    }

    #[tokio::test]
    async fn test_multipart_flow_over_http() {
        let app = test_app();

        let create_bucket = Request::builder()
            .method("PUT")
            .uri("/b")
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(create_bucket).await.unwrap();

        // Initiate
        let initiate = Request::builder()
            .method("POST")
            .uri("/b/big.bin?uploads")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(initiate).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        let upload_id = extract_tag(&body, "UploadId");

        // Two parts
        let mut etags = Vec::new();
        for (n, data) in [(1, "aaaa"), (2, "bb")] {
            let request = Request::builder()
                .method("PUT")
                .uri(format!("/b/big.bin?partNumber={n}&uploadId={upload_id}"))
                .header("Content-Length", data.len())
                .body(Body::from(data))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            etags.push(
                response
                    .headers()
                    .get("etag")
                    .unwrap()
                    .to_str()
                    .unwrap()
                    .to_string(),
            );
        }

        // List parts
        let request = Request::builder()
            .method("GET")
            .uri(format!("/b/big.bin?uploadId={upload_id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("<PartNumber>1</PartNumber>"));
        assert!(body.contains("<PartNumber>2</PartNumber>"));

        // Complete
        let complete = format!(
            "<CompleteMultipartUpload>\
             <Part><PartNumber>1</PartNumber><ETag>{}</ETag></Part>\
             <Part><PartNumber>2</PartNumber><ETag>{}</ETag></Part>\
             </CompleteMultipartUpload>",
            etags[0], etags[1]
        );
        let request = Request::builder()
            .method("POST")
            .uri(format!("/b/big.bin?uploadId={upload_id}"))
            .body(Body::from(complete))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        // Quotes inside XML text are entity-escaped
        let etag = extract_tag(&body, "ETag").replace("&quot;", "");
        assert!(etag.ends_with("-2"));

        // Assembled object readable
        let request = Request::builder()
            .method("GET")
            .uri("/b/big.bin")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "aaaabb");
    }

    #[tokio::test]
    async fn test_abort_then_list_is_404() {
        let app = test_app();
        let create_bucket = Request::builder()
            .method("PUT")
            .uri("/b")
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(create_bucket).await.unwrap();

        let initiate = Request::builder()
            .method("POST")
            .uri("/b/k?uploads")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(initiate).await.unwrap();
        let upload_id = extract_tag(&body_string(response).await, "UploadId");

        let abort = Request::builder()
            .method("DELETE")
            .uri(format!("/b/k?uploadId={upload_id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(abort).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let list = Request::builder()
            .method("GET")
            .uri(format!("/b/k?uploadId={upload_id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(list).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
