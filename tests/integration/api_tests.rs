//! End-to-end tests for the public endpoints and single-operation routes.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use super::test_utils::{
    dims_of, error_body, make_router, multipart_request, png_fixture, read_body, scratch_dir,
};

// =============================================================================
// Public Endpoints
// =============================================================================

#[tokio::test]
async fn test_index_reports_version() {
    let router = make_router(|_| {});
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let server = response.headers().get("server").unwrap().to_str().unwrap();
    assert!(server.starts_with("pixgate/"));

    let body = read_body(response).await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(value["pixgate"].is_string());
}

#[tokio::test]
async fn test_health() {
    let router = make_router(|_| {});
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_body(response).await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status"], "ok");
}

#[tokio::test]
async fn test_form_renders_upload_forms() {
    let router = make_router(|_| {});
    let request = Request::builder().uri("/form").body(Body::empty()).unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_body(response).await;
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("multipart/form-data"));
    assert!(html.contains("/resize"));
}

// =============================================================================
// Single Operations
// =============================================================================

#[tokio::test]
async fn test_resize_multipart_upload() {
    let router = make_router(|_| {});
    let request = multipart_request("/resize?width=5&height=5", &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/png"
    );

    let body = read_body(response).await;
    assert_eq!(dims_of(&body), (5, 5));
}

#[tokio::test]
async fn test_resize_raw_body_upload() {
    let router = make_router(|_| {});
    let request = Request::builder()
        .method("POST")
        .uri("/resize?width=4&height=4")
        .header("content-type", "image/png")
        .body(Body::from(png_fixture(8, 8)))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_body(response).await;
    assert_eq!(dims_of(&body), (4, 4));
}

#[tokio::test]
async fn test_convert_changes_content_type() {
    let router = make_router(|_| {});
    let request = multipart_request("/convert?type=jpeg", &png_fixture(6, 6));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/jpeg"
    );
}

#[tokio::test]
async fn test_missing_required_param() {
    let router = make_router(|_| {});
    let request = multipart_request("/rotate", &png_fixture(6, 6));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let value = error_body(response).await;
    assert_eq!(value["message"], "Missing required param: rotate");
    assert_eq!(value["status"], 400);
}

#[tokio::test]
async fn test_unsupported_media_type() {
    let router = make_router(|_| {});
    let request = multipart_request("/resize?width=5", b"this is not an image");

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_resolution_ceiling() {
    let router = make_router(|c| c.max_allowed_pixels = 0.001);
    let request = multipart_request("/resize?width=5", &png_fixture(100, 100));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// Format Negotiation
// =============================================================================

#[tokio::test]
async fn test_auto_format_negotiates_webp() {
    let router = make_router(|_| {});
    let mut request = multipart_request("/resize?width=5&type=auto", &png_fixture(10, 10));
    request
        .headers_mut()
        .insert("accept", "image/webp,image/png;q=0.9".parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/webp"
    );
    assert_eq!(response.headers().get("vary").unwrap(), "Accept");
}

#[tokio::test]
async fn test_auto_format_without_accept_keeps_source() {
    let router = make_router(|_| {});
    let request = multipart_request("/resize?width=5&type=auto", &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/png"
    );
    assert_eq!(response.headers().get("vary").unwrap(), "Accept");
}

// =============================================================================
// Response Headers
// =============================================================================

#[tokio::test]
async fn test_return_size_headers() {
    let router = make_router(|c| c.return_size = true);
    let request = multipart_request("/resize?width=7&height=3", &png_fixture(14, 6));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("image-width").unwrap(), "7");
    assert_eq!(response.headers().get("image-height").unwrap(), "3");
}

/// Router with a mounted fixture so image GETs succeed without a network.
fn caching_router(name: &str, ttl: i64) -> axum::Router {
    let dir = scratch_dir(name);
    std::fs::write(dir.join("sample.png"), png_fixture(10, 10)).unwrap();
    let mount = dir.to_string_lossy().into_owned();
    make_router(move |c| {
        c.http_cache_ttl = ttl;
        c.mount = Some(mount);
    })
}

#[tokio::test]
async fn test_cache_headers_on_image_get() {
    let router = caching_router("cache-ttl", 300);
    let request = Request::builder()
        .uri("/resize?file=sample.png&width=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, s-maxage=300, max-age=300, no-transform"
    );
}

#[tokio::test]
async fn test_zero_ttl_disables_caching() {
    let router = caching_router("cache-zero-ttl", 0);
    let request = Request::builder()
        .uri("/resize?file=sample.png&width=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "private, no-cache, no-store, must-revalidate"
    );
}

#[tokio::test]
async fn test_public_paths_never_cached() {
    let router = make_router(|c| c.http_cache_ttl = 300);

    for path in ["/", "/health", "/form"] {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers().get("cache-control").is_none(),
            "unexpected cache headers on {path}"
        );
    }
}

#[tokio::test]
async fn test_no_cache_headers_by_default() {
    let router = caching_router("cache-default", -1);
    let request = Request::builder()
        .uri("/resize?file=sample.png&width=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert!(response.headers().get("cache-control").is_none());
}

// =============================================================================
// Path Prefix
// =============================================================================

#[tokio::test]
async fn test_path_prefix() {
    let router = make_router(|c| c.path_prefix = "/imaging".to_string());

    let request = multipart_request("/imaging/resize?width=5&height=5", &png_fixture(10, 10));
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The unprefixed route no longer exists
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
