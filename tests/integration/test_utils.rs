//! Test utilities for integration tests.
//!
//! Helpers for building routers from ad-hoc configurations, generating
//! image fixtures and constructing multipart upload requests.

use std::io::Cursor;
use std::path::PathBuf;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;

use pixgate::config::Config;
use pixgate::server::{build_state, create_router};

/// Multipart boundary used by every upload helper.
pub const BOUNDARY: &str = "pixgate-test-boundary";

/// Baseline configuration: URL source enabled, everything else off.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 8088,
        path_prefix: String::new(),
        enable_url_source: true,
        allowed_origins: vec![],
        max_allowed_size: 0,
        max_allowed_pixels: 18.0,
        fetch_timeout: 60,
        mount: None,
        forward_headers: vec![],
        auth_forwarding: false,
        authorization: None,
        api_key: None,
        enable_url_signature: false,
        url_signature_key: None,
        rate: 0,
        burst: 0,
        cors: false,
        http_cache_ttl: -1,
        return_size: false,
        disable_endpoints: vec![],
        placeholder: None,
        placeholder_status: 0,
        verbose: false,
        no_tracing: true,
    }
}

/// Build a router from the baseline config after applying `mutate`.
pub fn make_router(mutate: impl FnOnce(&mut Config)) -> Router {
    let mut config = test_config();
    mutate(&mut config);
    create_router(build_state(config).expect("state should build"))
}

/// Solid-color PNG of the given dimensions.
pub fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        width,
        height,
        image::Rgb([90, 140, 190]),
    ));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("png encoding should not fail");
    buf.into_inner()
}

/// Dimensions of an encoded image.
pub fn dims_of(buf: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(buf).expect("image should decode");
    (img.width(), img.height())
}

/// Multipart form body carrying one `file` field.
pub fn multipart_body(image: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"test.png\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(image);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST request uploading `image` as multipart form data.
pub fn multipart_request(uri: &str, image: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(image)))
        .expect("request should build")
}

/// Collect the full response body.
pub async fn read_body(response: Response) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
}

/// Parse the canonical `{message, status}` error body.
pub async fn error_body(response: Response) -> serde_json::Value {
    let body = read_body(response).await;
    serde_json::from_slice(&body).expect("error body should be JSON")
}

/// Create (or reuse) a scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pixgate-it-{name}"));
    std::fs::create_dir_all(&dir).expect("scratch dir should be creatable");
    dir
}
