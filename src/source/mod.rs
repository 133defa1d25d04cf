//! Pluggable image sources.
//!
//! A source is a strategy for obtaining raw image bytes from an inbound
//! request: a remote URL fetch, the request body (raw or multipart) or a
//! mounted local directory. Sources are built once at startup from an
//! immutable [`SourceConfig`] snapshot and held by the [`SourceRegistry`],
//! which resolves each request to the first source claiming it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use bytes::Bytes;

use crate::error::GatewayError;

pub mod body;
pub mod fs;
pub mod http;

pub use body::BodySource;
pub use fs::FilesystemSource;
pub use http::{Origin, RemoteHttpSource};

// =============================================================================
// Request Snapshot
// =============================================================================

/// The parts of an inbound request a source needs to claim and serve it.
///
/// Built once per request at the handler boundary so sources never touch
/// framework types. Never shared across requests.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// HTTP method of the inbound request
    pub method: Method,

    /// Request path (without query string)
    pub path: String,

    /// Decoded query pairs in original order
    pub query: Vec<(String, String)>,

    /// Inbound request headers
    pub headers: HeaderMap,

    /// Request body bytes (empty for GET)
    pub body: Bytes,
}

impl ImageRequest {
    /// First value of a query parameter, if present.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Value of a header as a UTF-8 string, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

// =============================================================================
// Source Configuration
// =============================================================================

/// Immutable configuration snapshot shared by all sources.
///
/// Created once at process start; sources only ever read from it.
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    /// Forward the caller's Authorization header to remote origins
    pub auth_forwarding: bool,

    /// Fixed Authorization value for remote origins (highest priority)
    pub authorization: Option<String>,

    /// Mount root for the filesystem source
    pub mount_path: Option<PathBuf>,

    /// Headers forwarded verbatim to remote origins
    pub forward_headers: Vec<String>,

    /// Remote origin allow-list (empty admits any origin)
    pub allowed_origins: Vec<Origin>,

    /// Maximum remote image size in bytes (0 = unlimited)
    pub max_allowed_size: usize,

    /// Timeout applied to each outbound fetch call
    pub fetch_timeout: Duration,
}

// =============================================================================
// Source Trait and Registry
// =============================================================================

/// An image source claims requests and produces raw image bytes for them.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Whether this source claims the given request.
    fn matches(&self, req: &ImageRequest) -> bool;

    /// Fetch the raw image bytes for a claimed request.
    async fn fetch(&self, req: &ImageRequest) -> Result<Bytes, GatewayError>;
}

/// Factory signature used to build sources from the shared config.
pub type SourceFactory = fn(Arc<SourceConfig>) -> Box<dyn ImageSource>;

/// Ordered, immutable set of image sources.
///
/// Built once at startup and shared read-only by every request task, so
/// `resolve` is safe for unbounded concurrent callers. Resolution is
/// first-match-wins in registration order, which keeps claiming
/// deterministic per process.
pub struct SourceRegistry {
    sources: Vec<Box<dyn ImageSource>>,
}

impl SourceRegistry {
    /// Build a registry from an explicit factory list.
    pub fn from_factories(config: SourceConfig, factories: &[SourceFactory]) -> Self {
        let config = Arc::new(config);
        let sources = factories
            .iter()
            .map(|factory| factory(Arc::clone(&config)))
            .collect();
        Self { sources }
    }

    /// Build a registry with the standard source set: remote URL, request
    /// body, local filesystem (in that matching order).
    pub fn with_default_sources(config: SourceConfig) -> Self {
        Self::from_factories(
            config,
            &[
                RemoteHttpSource::factory,
                BodySource::factory,
                FilesystemSource::factory,
            ],
        )
    }

    /// First source claiming the request, or `None`.
    ///
    /// No match is not an error by itself; the caller decides how to reply.
    pub fn resolve(&self, req: &ImageRequest) -> Option<&dyn ImageSource> {
        self.sources
            .iter()
            .find(|source| source.matches(req))
            .map(|source| source.as_ref())
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the registry holds no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
