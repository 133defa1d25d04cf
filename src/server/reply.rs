//! Error response writer.
//!
//! Every failed request produces either the canonical `{message, status}`
//! JSON body or, when a placeholder image is configured, that image with
//! the JSON pushed into the `Error` header so caching proxies and `<img>`
//! tags still render something sensible.

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::debug;

use super::handlers::AppState;
use crate::engine::{OperationKind, TransformParams};
use crate::error::GatewayError;

/// Write the reply for a failed request.
///
/// With a placeholder configured the body is the placeholder image,
/// resized to the requested dimensions when the query carried any, and
/// the error itself travels in the `Error` header. The status comes from
/// the configured placeholder status override, falling back to the
/// error's own.
pub async fn error_reply(state: &AppState, width: u32, height: u32, err: GatewayError) -> Response {
    let status = err.status();
    debug!(status = status.as_u16(), error = %err, "replying with error");

    let Some(placeholder) = state.placeholder.clone() else {
        return json_reply(status, &err);
    };

    let body = sized_placeholder(state, placeholder, width, height).await;
    let mime = state
        .pipeline
        .engine()
        .detect_type(&body)
        .map(|t| t.mime())
        .unwrap_or("application/octet-stream");

    let status = if state.config.placeholder_status != 0 {
        StatusCode::from_u16(state.config.placeholder_status).unwrap_or(status)
    } else {
        status
    };

    let mut response = (status, Body::from(body)).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(mime));
    if let Ok(value) = HeaderValue::from_str(&err.json()) {
        response.headers_mut().insert("Error", value);
    }
    response
}

fn json_reply(status: StatusCode, err: &GatewayError) -> Response {
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        err.json(),
    )
        .into_response()
}

/// Resize the placeholder to the requested dimensions. Any resize failure
/// falls back to the placeholder as configured; the reply must never fail
/// twice.
async fn sized_placeholder(state: &AppState, placeholder: Bytes, width: u32, height: u32) -> Bytes {
    if width == 0 && height == 0 {
        return placeholder;
    }

    let engine = state.pipeline.engine();
    let original = placeholder.clone();
    let params = TransformParams {
        width,
        height,
        ..Default::default()
    };

    tokio::task::spawn_blocking(move || {
        engine.transform(&placeholder, OperationKind::Resize, &params)
    })
    .await
    .ok()
    .and_then(|result| result.ok())
    .map(|image| image.body)
    .unwrap_or(original)
}
