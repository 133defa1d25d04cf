//! End-to-end tests for signed URL enforcement.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use pixgate::server::SignatureValidator;

use super::test_utils::{make_router, multipart_request, png_fixture};

const KEY: &str = "integration-signing-key";

fn signed_uri(path: &str, pairs: &[(&str, &str)]) -> String {
    let validator = SignatureValidator::new(KEY);
    let query: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let sign = validator.sign(path, &query);

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("sign", &sign);
    format!("{path}?{}", serializer.finish())
}

fn signing_router() -> axum::Router {
    make_router(|c| {
        c.enable_url_signature = true;
        c.url_signature_key = Some(KEY.to_string());
    })
}

#[tokio::test]
async fn test_valid_signature_admits_request() {
    let router = signing_router();
    let uri = signed_uri("/resize", &[("width", "5"), ("height", "5")]);
    let request = multipart_request(&uri, &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_signature_rejected() {
    let router = signing_router();
    let request = multipart_request("/resize?width=5&height=5", &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_tampered_parameter_rejected() {
    let router = signing_router();
    let uri = signed_uri("/resize", &[("width", "5"), ("height", "5")]);
    let tampered = uri.replace("width=5", "width=500");
    let request = multipart_request(&tampered, &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_malformed_signature_is_bad_request() {
    let router = signing_router();
    let request = multipart_request(
        "/resize?width=5&sign=%21%21not-base64url%21%21",
        &png_fixture(10, 10),
    );

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signature_bound_to_path() {
    let router = signing_router();
    // Signed for /resize, replayed against /crop
    let uri = signed_uri("/resize", &[("width", "5"), ("height", "5")]);
    let replayed = uri.replacen("/resize", "/crop", 1);
    let request = multipart_request(&replayed, &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_signature_checked_before_other_policies() {
    let router = make_router(|c| {
        c.enable_url_signature = true;
        c.url_signature_key = Some(KEY.to_string());
        c.api_key = Some("s3cret".to_string());
    });

    // Unsigned and unauthenticated: the signature guard answers first
    let request = multipart_request("/resize?width=5", &png_fixture(10, 10));
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_public_endpoints_skip_signature() {
    let router = signing_router();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
