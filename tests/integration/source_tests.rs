//! End-to-end tests for image source resolution.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use super::test_utils::{
    dims_of, error_body, make_router, png_fixture, read_body, scratch_dir,
};

// =============================================================================
// Filesystem Source
// =============================================================================

fn mounted_router(name: &str) -> (axum::Router, std::path::PathBuf) {
    let dir = scratch_dir(name);
    std::fs::write(dir.join("sample.png"), png_fixture(10, 10)).unwrap();
    let mount = dir.to_string_lossy().into_owned();
    let router = make_router(move |c| {
        c.enable_url_source = false;
        c.mount = Some(mount);
    });
    (router, dir)
}

#[tokio::test]
async fn test_fs_source_serves_mounted_file() {
    let (router, _dir) = mounted_router("fs-read");
    let request = Request::builder()
        .uri("/resize?file=sample.png&width=5&height=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_body(response).await;
    assert_eq!(dims_of(&body), (5, 5));
}

#[tokio::test]
async fn test_fs_source_rejects_traversal() {
    let (router, _dir) = mounted_router("fs-traversal");
    let request = Request::builder()
        .uri("/resize?file=../../etc/passwd&width=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let value = error_body(response).await;
    assert_eq!(value["message"], "Invalid file path");
}

#[tokio::test]
async fn test_fs_source_missing_file_same_error() {
    let (router, _dir) = mounted_router("fs-missing");
    let request = Request::builder()
        .uri("/resize?file=no-such-file.png&width=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Indistinguishable from the traversal rejection
    let value = error_body(response).await;
    assert_eq!(value["message"], "Invalid file path");
}

// =============================================================================
// Remote URL Source
// =============================================================================

#[tokio::test]
async fn test_url_source_rejects_invalid_url() {
    let router = make_router(|_| {});
    let request = Request::builder()
        .uri("/resize?url=not-a-url&width=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_url_source_blocked_origin_fails_without_network() {
    let router = make_router(|c| {
        c.allowed_origins = vec!["images.example.com".to_string()];
    });
    let request = Request::builder()
        .uri("/resize?url=http://evil.example.net/cat.jpg&width=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let value = error_body(response).await;
    let message = value["message"].as_str().unwrap();
    assert!(message.contains("Not allowed remote URL origin"), "got: {message}");
}

#[tokio::test]
async fn test_url_source_disabled_is_not_resolved() {
    // With the URL source disabled but a mount present, a url-only GET
    // matches nothing
    let dir = scratch_dir("url-disabled");
    let mount = dir.to_string_lossy().into_owned();
    let router = make_router(move |c| {
        c.enable_url_source = false;
        c.mount = Some(mount);
    });

    let request = Request::builder()
        .uri("/resize?url=http://example.com/cat.jpg&width=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let value = error_body(response).await;
    assert_eq!(
        value["message"],
        "Cannot process the image due to missing or invalid params"
    );
}

// =============================================================================
// Body Source
// =============================================================================

#[tokio::test]
async fn test_empty_post_body() {
    let router = make_router(|_| {});
    let request = Request::builder()
        .method("POST")
        .uri("/resize?width=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let value = error_body(response).await;
    assert_eq!(value["message"], "Empty or unreadable image");
}

#[tokio::test]
async fn test_missing_source_on_bare_get() {
    let router = make_router(|_| {});
    let request = Request::builder()
        .uri("/resize?width=5")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let value = error_body(response).await;
    assert_eq!(
        value["message"],
        "Cannot process the image due to missing or invalid params"
    );
}
