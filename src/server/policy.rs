//! Request admission policies.
//!
//! Every request passes through an explicit, ordered chain of policies
//! before reaching its handler: method validation, API key authorization,
//! throttling and the endpoint deny-list, each included only when the
//! configuration activates it. Authorization comes before throttling so
//! rejected credentials never consume rate-limit budget. The chain is
//! plain data built once at startup, so the effective order is
//! inspectable rather than implied by middleware nesting.
//!
//! Image endpoints pass through [`image_guard_middleware`] ahead of the
//! chain, enforcing URL signatures and the GET source requirement before
//! any other policy runs; the public endpoints (`/`, `/health`, `/form`)
//! never do.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{OriginalUri, Request, State};
use axum::http::header::{HeaderValue, CACHE_CONTROL, SERVER};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;
use url::form_urlencoded;

use super::handlers::AppState;
use super::rate_limit::{self, GlobalRateLimiter};
use super::reply;
use crate::error::GatewayError;

/// One admission policy, carrying the data it needs.
pub enum Policy {
    /// Reject methods other than GET and POST
    ValidateMethod,

    /// GCRA admission control
    Throttle(Arc<GlobalRateLimiter>),

    /// Require the configured API key via the `API-Key` header or the
    /// `key` query parameter
    Authorize { api_key: String },

    /// Reply 501 for endpoints named in the deny-list
    ValidateEndpoints { disabled: Vec<String> },
}

/// A policy rejection, with an optional admission retry hint.
pub struct PolicyReject {
    pub error: GatewayError,
    pub retry_after: Option<Duration>,
}

impl From<GatewayError> for PolicyReject {
    fn from(error: GatewayError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// Ordered admission chain evaluated on every request.
pub struct PolicyChain {
    policies: Vec<Policy>,
}

impl PolicyChain {
    /// Build the chain for a configuration. Order is fixed; inactive
    /// policies are simply absent.
    pub fn new(
        limiter: Option<Arc<GlobalRateLimiter>>,
        api_key: Option<String>,
        disabled_endpoints: Vec<String>,
    ) -> Self {
        let mut policies = vec![Policy::ValidateMethod];
        if let Some(api_key) = api_key.filter(|k| !k.is_empty()) {
            policies.push(Policy::Authorize { api_key });
        }
        if let Some(limiter) = limiter {
            policies.push(Policy::Throttle(limiter));
        }
        if !disabled_endpoints.is_empty() {
            policies.push(Policy::ValidateEndpoints {
                disabled: disabled_endpoints,
            });
        }
        Self { policies }
    }

    /// Evaluate all policies in order; the first rejection wins.
    pub fn evaluate(
        &self,
        method: &Method,
        path: &str,
        query: &[(String, String)],
        headers: &axum::http::HeaderMap,
    ) -> Result<(), PolicyReject> {
        for policy in &self.policies {
            match policy {
                Policy::ValidateMethod => {
                    if !matches!(*method, Method::GET | Method::POST) {
                        return Err(GatewayError::MethodNotAllowed.into());
                    }
                }
                Policy::Throttle(limiter) => {
                    if let Err(wait) = rate_limit::check(limiter) {
                        debug!(path, wait_ms = wait.as_millis() as u64, "request throttled");
                        return Err(PolicyReject {
                            error: GatewayError::RateLimited,
                            retry_after: Some(wait),
                        });
                    }
                }
                Policy::Authorize { api_key } => {
                    let provided = headers
                        .get("API-Key")
                        .and_then(|v| v.to_str().ok())
                        .or_else(|| {
                            query
                                .iter()
                                .find(|(key, _)| key == "key")
                                .map(|(_, value)| value.as_str())
                        })
                        .unwrap_or("");
                    if provided != api_key {
                        return Err(GatewayError::InvalidApiKey.into());
                    }
                }
                Policy::ValidateEndpoints { disabled } => {
                    let endpoint = path.rsplit('/').next().unwrap_or("");
                    if disabled.iter().any(|name| name == endpoint) {
                        return Err(GatewayError::NotImplemented.into());
                    }
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Decode the raw query string into ordered pairs.
pub fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// Width/height hint from the query, for placeholder sizing.
pub fn dimensions_hint(query: &[(String, String)]) -> (u32, u32) {
    let lookup = |name: &str| {
        query
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(0)
    };
    (lookup("width"), lookup("height"))
}

/// Outermost middleware: evaluate the policy chain, then stamp the
/// response headers every reply carries.
pub async fn policy_middleware(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let query = query_pairs(uri.query());

    let verdict = state
        .chain
        .evaluate(&method, uri.path(), &query, request.headers());

    let mut response = match verdict {
        Ok(()) => next.run(request).await,
        Err(reject) => {
            let (width, height) = dimensions_hint(&query);
            let mut response = reply::error_reply(&state, width, height, reject.error).await;
            if let Some(wait) = reject.retry_after {
                let secs = wait.as_secs().max(1).to_string();
                if let Ok(value) = HeaderValue::from_str(&secs) {
                    response.headers_mut().insert("Retry-After", value);
                }
            }
            response
        }
    };

    stamp_headers(&mut response, &method, uri.path(), state.config.http_cache_ttl);
    response
}

/// Guard applied to image endpoints only: GET needs a GET-capable source,
/// and signatures are verified when enforcement is enabled.
pub async fn image_guard_middleware(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    request: Request,
    next: Next,
) -> Response {
    let query = query_pairs(uri.query());

    if request.method() == Method::GET && !state.config.has_get_source() {
        let (width, height) = dimensions_hint(&query);
        return reply::error_reply(&state, width, height, GatewayError::GetMethodNotAllowed).await;
    }

    if let Some(validator) = &state.signature {
        if let Err(err) = validator.verify(uri.path(), &query) {
            let (width, height) = dimensions_hint(&query);
            return reply::error_reply(&state, width, height, err).await;
        }
    }

    next.run(request).await
}

fn stamp_headers(response: &mut Response, method: &Method, path: &str, cache_ttl: i64) {
    response.headers_mut().insert(
        SERVER,
        HeaderValue::from_static(concat!("pixgate/", env!("CARGO_PKG_VERSION"))),
    );

    if *method == Method::GET && !is_public_path(path) && cache_ttl >= 0 {
        if let Ok(value) = HeaderValue::from_str(&cache_control_value(cache_ttl)) {
            response.headers_mut().insert(CACHE_CONTROL, value);
        }
    }
}

/// Paths that never receive cache headers.
fn is_public_path(path: &str) -> bool {
    matches!(path, "/" | "/health" | "/form")
}

/// Cache-Control directives for the configured TTL. Zero means explicit
/// no-store; positive values advertise shared and private max-age.
fn cache_control_value(ttl: i64) -> String {
    if ttl == 0 {
        "private, no-cache, no-store, must-revalidate".to_string()
    } else {
        format!("public, s-maxage={ttl}, max-age={ttl}, no-transform")
    }
}

// =============================================================================
// Tests
// =============================================================================
