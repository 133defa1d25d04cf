//! End-to-end tests for the pipeline and metadata endpoints.

use axum::http::StatusCode;
use tower::ServiceExt;

use super::test_utils::{
    dims_of, error_body, make_router, multipart_request, png_fixture, read_body,
};

fn pipeline_uri(operations: &str) -> String {
    format!(
        "/pipeline?operations={}",
        urlencoding::encode(operations)
    )
}

#[tokio::test]
async fn test_pipeline_chain() {
    let router = make_router(|_| {});
    let operations = r#"[
        {"operation": "crop", "params": {"width": 6, "height": 4}},
        {"operation": "convert", "params": {"type": "jpeg"}}
    ]"#;
    let request = multipart_request(&pipeline_uri(operations), &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/jpeg"
    );

    let body = read_body(response).await;
    assert_eq!(dims_of(&body), (6, 4));
}

#[tokio::test]
async fn test_pipeline_unknown_operation() {
    let router = make_router(|_| {});
    let operations = r#"[{"operation": "sharpen"}]"#;
    let request = multipart_request(&pipeline_uri(operations), &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let value = error_body(response).await;
    assert_eq!(value["message"], "Unsupported operation: sharpen");
}

#[tokio::test]
async fn test_pipeline_missing_operations_param() {
    let router = make_router(|_| {});
    let request = multipart_request("/pipeline", &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pipeline_too_many_operations() {
    let router = make_router(|_| {});
    let operations = format!(
        "[{}]",
        std::iter::repeat(r#"{"operation": "flip"}"#)
            .take(11)
            .collect::<Vec<_>>()
            .join(",")
    );
    let request = multipart_request(&pipeline_uri(&operations), &png_fixture(4, 4));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let value = error_body(response).await;
    assert_eq!(value["message"], "Maximum pipeline operations (10) exceeded");
}

#[tokio::test]
async fn test_pipeline_failed_step_reports_position() {
    let router = make_router(|_| {});
    let operations = r#"[
        {"operation": "flip"},
        {"operation": "extract", "params": {"areawidth": 999, "areaheight": 999}}
    ]"#;
    let request = multipart_request(&pipeline_uri(operations), &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let value = error_body(response).await;
    let message = value["message"].as_str().unwrap();
    assert!(message.contains("operation 2"), "got: {message}");
}

#[tokio::test]
async fn test_pipeline_ignore_failure_continues() {
    let router = make_router(|_| {});
    let operations = r#"[
        {"operation": "resize", "params": {"width": 8, "height": 8}},
        {"operation": "extract", "params": {"areawidth": 999, "areaheight": 999}, "ignoreFailure": true}
    ]"#;
    let request = multipart_request(&pipeline_uri(operations), &png_fixture(10, 10));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_body(response).await;
    assert_eq!(dims_of(&body), (8, 8));
}

#[tokio::test]
async fn test_info_returns_metadata() {
    let router = make_router(|_| {});
    let request = multipart_request("/info", &png_fixture(12, 7));

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );

    let body = read_body(response).await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["width"], 12);
    assert_eq!(value["height"], 7);
    assert_eq!(value["type"], "png");
}
