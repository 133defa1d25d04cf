//! HTTP request handlers.
//!
//! One generic image handler serves every transformation endpoint; the
//! endpoint only decides which operation (or the pipeline, or metadata)
//! runs against the resolved image bytes. The public endpoints (`/`,
//! `/health`, `/form`) are tiny and stateless.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{OriginalUri, Request, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE, VARY};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use super::policy::{dimensions_hint, query_pairs, PolicyChain};
use super::reply;
use super::signature::SignatureValidator;
use crate::config::{Config, MAX_BODY_BYTES};
use crate::engine::{OperationKind, TransformedImage};
use crate::error::GatewayError;
use crate::pipeline::{
    negotiate_format, parse_query, parse_steps, ImagePipeline, OutputFormat,
};
use crate::source::{ImageRequest, SourceRegistry};

// =============================================================================
// Application State
// =============================================================================

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SourceRegistry>,
    pub pipeline: Arc<ImagePipeline>,
    pub chain: Arc<PolicyChain>,
    pub signature: Option<SignatureValidator>,
    pub placeholder: Option<Bytes>,
    pub started_at: Instant,
}

/// What an image route executes.
#[derive(Debug, Clone, Copy)]
pub enum Endpoint {
    /// A single named operation
    Op(OperationKind),
    /// A JSON-described chain of operations
    Pipeline,
    /// Image metadata as JSON
    Info,
}

// =============================================================================
// Public Endpoints
// =============================================================================

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub pixgate: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

pub async fn index_handler() -> Json<IndexResponse> {
    Json(IndexResponse {
        pixgate: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Minimal upload form for manual testing against the POST endpoints.
pub async fn form_handler() -> Html<String> {
    let operations = [
        ("Resize", "resize?width=300&height=200"),
        ("Enlarge", "enlarge?width=1200&height=800"),
        ("Crop", "crop?width=300&height=300"),
        ("Extract", "extract?top=10&left=10&areawidth=300&areaheight=200"),
        ("Rotate", "rotate?rotate=90"),
        ("Convert", "convert?type=png"),
        ("Blur", "blur?sigma=3"),
        ("Thumbnail", "thumbnail?width=100"),
        ("Info", "info"),
    ];

    let mut html = String::from("<html><body>");
    for (label, action) in operations {
        html.push_str(&format!(
            "<h2>{label}</h2>\
             <form method=\"POST\" action=\"/{action}\" enctype=\"multipart/form-data\">\
             <input type=\"file\" name=\"file\" />\
             <input type=\"submit\" value=\"Upload\" />\
             </form>"
        ));
    }
    html.push_str("</body></html>");
    Html(html)
}

// =============================================================================
// Image Endpoints
// =============================================================================

/// The generic image handler behind every transformation route.
pub async fn process_image(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    endpoint: Endpoint,
    request: Request,
) -> Response {
    let method = request.method().clone();
    let headers = request.headers().clone();
    let query = query_pairs(uri.query());
    let (width, height) = dimensions_hint(&query);

    let accept = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    // Format negotiation advertises itself regardless of the outcome
    let vary = wants_auto_format(endpoint, &query);

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => {
            let err = GatewayError::PayloadTooLarge {
                max_bytes: MAX_BODY_BYTES,
            };
            return with_vary(reply::error_reply(&state, width, height, err).await, vary);
        }
    };

    let image_req = ImageRequest {
        method,
        path: uri.path().to_string(),
        query,
        headers,
        body,
    };

    match handle(&state, endpoint, &image_req, &accept).await {
        Ok(image) => with_vary(success_reply(&state, endpoint, image).await, vary),
        Err(err) => with_vary(reply::error_reply(&state, width, height, err).await, vary),
    }
}

async fn handle(
    state: &AppState,
    endpoint: Endpoint,
    req: &ImageRequest,
    accept: &str,
) -> Result<TransformedImage, GatewayError> {
    let source = state
        .registry
        .resolve(req)
        .ok_or(GatewayError::MissingSource)?;

    let buf = source.fetch(req).await?;
    if buf.is_empty() {
        return Err(GatewayError::EmptyBody);
    }
    debug!(bytes = buf.len(), path = %req.path, "image resolved");

    match endpoint {
        Endpoint::Info => state.pipeline.info(buf).await,
        Endpoint::Pipeline => {
            let raw = req.query_param("operations").ok_or_else(|| {
                GatewayError::InvalidInput("Missing pipeline operations".to_string())
            })?;
            let steps = parse_steps(raw)?;
            state.pipeline.run_chain(buf, &steps).await
        }
        Endpoint::Op(op) => {
            let parsed = parse_query(&req.query)?;
            let mut params = parsed.params;
            match parsed.output {
                OutputFormat::Fixed(format) => params.format = Some(format),
                OutputFormat::Auto => params.format = negotiate_format(accept),
                OutputFormat::Source => {}
            }
            state.pipeline.run_single(buf, op, params).await
        }
    }
}

async fn success_reply(state: &AppState, endpoint: Endpoint, image: TransformedImage) -> Response {
    let mut response = (StatusCode::OK, Body::from(image.body.clone())).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(image.mime));

    let is_image = !matches!(endpoint, Endpoint::Info);
    if is_image && state.config.return_size {
        if let Some((width, height)) = state.pipeline.output_dimensions(image.body).await {
            if let Ok(value) = HeaderValue::from_str(&width.to_string()) {
                response.headers_mut().insert("Image-Width", value);
            }
            if let Ok(value) = HeaderValue::from_str(&height.to_string()) {
                response.headers_mut().insert("Image-Height", value);
            }
        }
    }

    response
}

fn wants_auto_format(endpoint: Endpoint, query: &[(String, String)]) -> bool {
    matches!(endpoint, Endpoint::Op(_))
        && query
            .iter()
            .any(|(key, value)| key == "type" && value.eq_ignore_ascii_case("auto"))
}

fn with_vary(mut response: Response, vary: bool) -> Response {
    if vary {
        response
            .headers_mut()
            .insert(VARY, HeaderValue::from_static("Accept"));
    }
    response
}
