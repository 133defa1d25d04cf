//! HTTP server layer.
//!
//! Wires the configuration into shared application state (source
//! registry, transform pipeline, policy chain, signature validator,
//! placeholder image) and exposes the router.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::Config;
use crate::engine::RasterEngine;
use crate::pipeline::ImagePipeline;
use crate::source::http::parse_origins;
use crate::source::{
    BodySource, FilesystemSource, RemoteHttpSource, SourceConfig, SourceFactory, SourceRegistry,
};

pub mod handlers;
pub mod policy;
pub mod rate_limit;
pub mod reply;
pub mod routes;
pub mod signature;

pub use handlers::{AppState, Endpoint, HealthResponse, IndexResponse};
pub use policy::{Policy, PolicyChain};
pub use rate_limit::{build_limiter, GlobalRateLimiter};
pub use routes::create_router;
pub use signature::SignatureValidator;

/// Build the shared application state from a validated configuration.
///
/// Fails with a human-readable message on bad origins or an unreadable
/// placeholder image; both are startup errors, not request errors.
pub fn build_state(config: Config) -> Result<AppState, String> {
    config.validate()?;

    let allowed_origins = parse_origins(&config.allowed_origins)?;
    let source_config = SourceConfig {
        auth_forwarding: config.auth_forwarding,
        authorization: config.authorization.clone(),
        mount_path: config.mount.clone().map(PathBuf::from),
        forward_headers: config.forward_headers.clone(),
        allowed_origins,
        max_allowed_size: config.max_allowed_size,
        fetch_timeout: Duration::from_secs(config.fetch_timeout),
    };

    // Registration order is matching order
    let mut factories: Vec<SourceFactory> = Vec::new();
    if config.enable_url_source {
        factories.push(RemoteHttpSource::factory);
    }
    factories.push(BodySource::factory);
    if config.mount.is_some() {
        factories.push(FilesystemSource::factory);
    }
    let registry = Arc::new(SourceRegistry::from_factories(source_config, &factories));

    let engine = Arc::new(RasterEngine::new());
    let pipeline = Arc::new(ImagePipeline::new(engine, config.max_allowed_pixels));

    let limiter = build_limiter(config.rate, config.burst);
    let chain = Arc::new(PolicyChain::new(
        limiter,
        config.api_key.clone(),
        config.disable_endpoints.clone(),
    ));

    let signature = if config.enable_url_signature {
        config
            .url_signature_key
            .as_deref()
            .map(SignatureValidator::new)
    } else {
        None
    };

    let placeholder = match &config.placeholder {
        Some(path) => Some(load_placeholder(&pipeline, path)?),
        None => None,
    };

    info!(
        sources = registry.len(),
        policies = chain.len(),
        signature = signature.is_some(),
        placeholder = placeholder.is_some(),
        "application state initialized"
    );

    Ok(AppState {
        config: Arc::new(config),
        registry,
        pipeline,
        chain,
        signature,
        placeholder,
        started_at: Instant::now(),
    })
}

fn load_placeholder(pipeline: &ImagePipeline, path: &str) -> Result<bytes::Bytes, String> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("cannot read placeholder image {path}: {e}"))?;
    let bytes = bytes::Bytes::from(bytes);

    if pipeline.engine().detect_type(&bytes).is_none() {
        return Err(format!("placeholder image {path} is not a supported format"));
    }

    Ok(bytes)
}
