//! Object Lock handlers: bucket configuration, per-object retention, and
//! legal hold.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use bytes::Bytes;
use silo_core::utils::generate_request_id;
use tracing::info;

use super::{empty_response, error_response, xml_response};
use crate::server::AppState;
use crate::xml;

pub async fn put_object_lock_configuration(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutObjectLockConfiguration bucket={} request_id={}",
        bucket, request_id
    );

    let config = match xml::parse_object_lock(&String::from_utf8_lossy(&body)) {
        Ok(config) => config,
        Err(e) => return error_response(e, &request_id),
    };

    match state
        .storage
        .put_object_lock_configuration(&bucket, config)
        .await
    {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_object_lock_configuration(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_object_lock_configuration(&bucket).await {
        Ok(config) => xml_response(
            StatusCode::OK,
            xml::object_lock_response(&config),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn put_object_retention(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutObjectRetention bucket={} key={} request_id={}",
        bucket, key, request_id
    );

    let retention = match xml::parse_retention(&String::from_utf8_lossy(&body)) {
        Ok(retention) => retention,
        Err(e) => return error_response(e, &request_id),
    };

    match state
        .storage
        .put_object_retention(&bucket, &key, retention)
        .await
    {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_object_retention(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_object_retention(&bucket, &key).await {
        Ok(retention) => xml_response(
            StatusCode::OK,
            xml::retention_response(&retention),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn put_object_legal_hold(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    info!(
        "PutObjectLegalHold bucket={} key={} request_id={}",
        bucket, key, request_id
    );

    let hold = match xml::parse_legal_hold(&String::from_utf8_lossy(&body)) {
        Ok(hold) => hold,
        Err(e) => return error_response(e, &request_id),
    };

    match state
        .storage
        .put_object_legal_hold(&bucket, &key, hold)
        .await
    {
        Ok(()) => empty_response(StatusCode::OK, &request_id),
        Err(e) => error_response(e, &request_id),
    }
}

pub async fn get_object_legal_hold(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Response {
    let request_id = generate_request_id();

    match state.storage.get_object_legal_hold(&bucket, &key).await {
        Ok(hold) => xml_response(
            StatusCode::OK,
            xml::legal_hold_response(&hold),
            &request_id,
        ),
        Err(e) => error_response(e, &request_id),
    }
}
