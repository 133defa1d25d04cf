//! Router configuration.
//!
//! Route structure (optionally nested under a path prefix):
//!
//! ```text
//! /            - version banner (public)
//! /health      - health check (public)
//! /form        - manual upload form (public)
//! /<operation> - one image route per transformation
//! /pipeline    - chained operations
//! /info        - image metadata
//! ```
//!
//! All routes pass through the admission policy chain. The image routes
//! additionally pass through the source/signature guard, layered outside
//! the chain so signatures and the GET source requirement are checked
//! before any other policy runs. Both guards extract `OriginalUri` so
//! they see the full request path under a nested prefix.

use axum::extract::{OriginalUri, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::routing::{any, get, MethodRouter};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    form_handler, health_handler, index_handler, process_image, AppState, Endpoint,
};
use super::policy;
use crate::engine::OperationKind;

/// Build the complete application router for the given state.
pub fn create_router(state: AppState) -> Router {
    let image_routes = Router::new()
        .route("/resize", endpoint_route(Endpoint::Op(OperationKind::Resize)))
        .route("/enlarge", endpoint_route(Endpoint::Op(OperationKind::Enlarge)))
        .route("/fit", endpoint_route(Endpoint::Op(OperationKind::Fit)))
        .route("/crop", endpoint_route(Endpoint::Op(OperationKind::Crop)))
        .route(
            "/smartcrop",
            endpoint_route(Endpoint::Op(OperationKind::SmartCrop)),
        )
        .route("/extract", endpoint_route(Endpoint::Op(OperationKind::Extract)))
        .route("/rotate", endpoint_route(Endpoint::Op(OperationKind::Rotate)))
        .route(
            "/autorotate",
            endpoint_route(Endpoint::Op(OperationKind::AutoRotate)),
        )
        .route("/flip", endpoint_route(Endpoint::Op(OperationKind::Flip)))
        .route("/flop", endpoint_route(Endpoint::Op(OperationKind::Flop)))
        .route(
            "/thumbnail",
            endpoint_route(Endpoint::Op(OperationKind::Thumbnail)),
        )
        .route("/zoom", endpoint_route(Endpoint::Op(OperationKind::Zoom)))
        .route("/convert", endpoint_route(Endpoint::Op(OperationKind::Convert)))
        .route(
            "/watermark",
            endpoint_route(Endpoint::Op(OperationKind::Watermark)),
        )
        .route(
            "/watermarkimage",
            endpoint_route(Endpoint::Op(OperationKind::WatermarkImage)),
        )
        .route("/blur", endpoint_route(Endpoint::Op(OperationKind::Blur)))
        .route("/pipeline", endpoint_route(Endpoint::Pipeline))
        .route("/info", endpoint_route(Endpoint::Info))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            policy::policy_middleware,
        ))
        // Added last, so it runs first
        .layer(middleware::from_fn_with_state(
            state.clone(),
            policy::image_guard_middleware,
        ));

    let mut router = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/form", get(form_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            policy::policy_middleware,
        ))
        .merge(image_routes);

    if state.config.cors {
        router = router.layer(build_cors_layer());
    }
    if !state.config.no_tracing {
        router = router.layer(TraceLayer::new_for_http());
    }

    let prefix = normalized_prefix(&state.config.path_prefix);
    let router = router.with_state(state);

    match prefix {
        Some(prefix) => Router::new().nest(&prefix, router),
        None => router,
    }
}

/// One image route: every method is admitted here so the policy chain,
/// not the router, owns method rejection.
fn endpoint_route(endpoint: Endpoint) -> MethodRouter<AppState> {
    any(
        move |state: State<AppState>, uri: OriginalUri, request: Request| async move {
            process_image(state, uri, endpoint, request).await
        },
    )
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

/// Normalize the configured path prefix into a nestable `/prefix` form.
fn normalized_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}

// =============================================================================
// Tests
// =============================================================================
