//! Remote HTTP image source.
//!
//! Claims GET requests carrying a non-empty `url` query parameter and
//! fetches the image from the remote origin, subject to the configured
//! origin allow-list and byte-size ceiling. When a size ceiling is set, a
//! HEAD probe runs first so oversized images are rejected before any body
//! bytes are downloaded.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use bytes::{Bytes, BytesMut};
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{ImageRequest, ImageSource, SourceConfig};
use crate::error::GatewayError;

/// Query parameter carrying the remote image URL.
pub const URL_QUERY_KEY: &str = "url";

// =============================================================================
// Origin Allow-List
// =============================================================================

/// A single allow-list entry: a host (optionally `*.` wildcarded) plus a
/// path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    host: String,
    path: String,
}

impl Origin {
    /// Parse an allow-list entry.
    ///
    /// Accepts full URLs (`https://images.example.com/photos`) as well as
    /// bare hosts (`*.cdn.example.org`). The scheme is ignored.
    pub fn parse(entry: &str) -> Result<Origin, String> {
        let rest = match entry.find("://") {
            Some(idx) => &entry[idx + 3..],
            None => entry,
        };

        let (host, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        if host.is_empty() {
            return Err(format!("invalid origin entry: {entry}"));
        }

        Ok(Origin {
            host: host.to_ascii_lowercase(),
            path: path.to_string(),
        })
    }

    /// Whether a request host and path fall under this entry.
    ///
    /// A `*.suffix` host matches `suffix` itself and any subdomain of it.
    pub fn matches(&self, host: &str, path: &str) -> bool {
        if !path.starts_with(&self.path) {
            return false;
        }

        if let Some(bare) = self.host.strip_prefix("*.") {
            let dotted = &self.host[1..]; // ".suffix"
            host == bare || host.ends_with(dotted)
        } else {
            host == self.host
        }
    }
}

/// Parse a comma-split origin list from configuration.
pub fn parse_origins(entries: &[String]) -> Result<Vec<Origin>, String> {
    entries
        .iter()
        .filter(|entry| !entry.is_empty())
        .map(|entry| Origin::parse(entry))
        .collect()
}

// =============================================================================
// Remote HTTP Source
// =============================================================================

/// Image source fetching from remote origins over HTTP(S).
pub struct RemoteHttpSource {
    config: Arc<SourceConfig>,
    client: Client,
}

impl RemoteHttpSource {
    pub fn new(config: Arc<SourceConfig>) -> Self {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .expect("HTTP client construction only fails with a broken TLS backend");
        Self { config, client }
    }

    /// Boxed factory for registry construction.
    pub fn factory(config: Arc<SourceConfig>) -> Box<dyn ImageSource> {
        Box::new(Self::new(config))
    }

    /// Whether the allow-list admits this URL. An empty list admits any
    /// origin.
    fn origin_allowed(&self, url: &Url) -> bool {
        if self.config.allowed_origins.is_empty() {
            return true;
        }

        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        self.config
            .allowed_origins
            .iter()
            .any(|origin| origin.matches(&host, url.path()))
    }

    /// HEAD probe rejecting oversized images before the download starts.
    async fn check_image_size(&self, url: &Url, req: &ImageRequest) -> Result<(), GatewayError> {
        let response = self
            .apply_headers(self.client.head(url.clone()), req)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamFetch {
                message: format!("error checking image size: {e}"),
                status: 502,
            })?;

        let status = response.status().as_u16();
        if !(200..=206).contains(&status) {
            return Err(GatewayError::UpstreamFetch {
                message: format!("invalid status checking image size: (status={status}) (url={url})"),
                status,
            });
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.config.max_allowed_size {
                return Err(GatewayError::PayloadTooLarge {
                    max_bytes: self.config.max_allowed_size,
                });
            }
        }

        Ok(())
    }

    async fn fetch_image(&self, url: &Url, req: &ImageRequest) -> Result<Bytes, GatewayError> {
        if self.config.max_allowed_size > 0 {
            self.check_image_size(url, req).await?;
        }

        let response = self
            .apply_headers(self.client.get(url.clone()), req)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamFetch {
                message: e.to_string(),
                status: 502,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(GatewayError::UpstreamFetch {
                message: format!("(status={}) (url={url})", status.as_u16()),
                status: status.as_u16(),
            });
        }

        debug!(url = %url, "fetching remote image");
        self.read_bounded(response).await
    }

    /// Read the response body, capping the total size when a ceiling is
    /// configured. The HEAD probe is advisory only; a lying Content-Length
    /// must not bypass the ceiling.
    async fn read_bounded(&self, mut response: reqwest::Response) -> Result<Bytes, GatewayError> {
        let max = self.config.max_allowed_size;
        let mut buf = BytesMut::with_capacity(
            response
                .content_length()
                .map(|len| len as usize)
                .unwrap_or(8 * 1024)
                .min(8 << 20),
        );

        while let Some(chunk) = response.chunk().await.map_err(|e| {
            GatewayError::UpstreamFetch {
                message: format!("unable to read image from response: {e}"),
                status: 502,
            }
        })? {
            if max > 0 && buf.len() + chunk.len() > max {
                return Err(GatewayError::PayloadTooLarge { max_bytes: max });
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(buf.freeze())
    }

    /// Apply forwarded headers and the Authorization priority chain:
    /// server-side override > caller's X-Forward-Authorization > caller's
    /// own Authorization header.
    fn apply_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
        req: &ImageRequest,
    ) -> reqwest::RequestBuilder {
        builder = builder.header(
            reqwest::header::USER_AGENT,
            concat!("pixgate/", env!("CARGO_PKG_VERSION")),
        );

        for name in &self.config.forward_headers {
            if let Some(value) = req.header(name) {
                builder = builder.header(name, value);
            }
        }

        if self.config.auth_forwarding || self.config.authorization.is_some() {
            let auth = self
                .config
                .authorization
                .as_deref()
                .or_else(|| req.header("X-Forward-Authorization"))
                .or_else(|| req.header("Authorization"));
            if let Some(auth) = auth {
                builder = builder.header(reqwest::header::AUTHORIZATION, auth);
            }
        }

        builder
    }
}

#[async_trait]
impl ImageSource for RemoteHttpSource {
    fn matches(&self, req: &ImageRequest) -> bool {
        req.method == Method::GET
            && req.query_param(URL_QUERY_KEY).is_some_and(|v| !v.is_empty())
    }

    async fn fetch(&self, req: &ImageRequest) -> Result<Bytes, GatewayError> {
        let raw = req
            .query_param(URL_QUERY_KEY)
            .ok_or(GatewayError::MissingSource)?;

        let url = Url::parse(raw)
            .map_err(|_| GatewayError::InvalidInput("Invalid image URL".to_string()))?;

        if !self.origin_allowed(&url) {
            return Err(GatewayError::OriginNotAllowed(format!(
                "{}{}",
                url.host_str().unwrap_or(""),
                url.path()
            )));
        }

        self.fetch_image(&url, req).await
    }
}

// =============================================================================
// Tests
// =============================================================================
