//! Local filesystem image source.
//!
//! Claims GET requests carrying a non-empty `file` query parameter and
//! reads the file from under the configured mount root. Path resolution is
//! purely lexical, so traversal attempts are rejected before any
//! filesystem access; read failures map to the same error as traversal so
//! nothing about the directory structure leaks.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use tracing::debug;

use super::{ImageRequest, ImageSource, SourceConfig};
use crate::error::GatewayError;

/// Query parameter carrying the mount-relative file path.
pub const FILE_QUERY_KEY: &str = "file";

/// Image source reading from a mounted local directory.
pub struct FilesystemSource {
    config: Arc<SourceConfig>,
}

impl FilesystemSource {
    pub fn new(config: Arc<SourceConfig>) -> Self {
        Self { config }
    }

    /// Boxed factory for registry construction.
    pub fn factory(config: Arc<SourceConfig>) -> Box<dyn ImageSource> {
        Box::new(Self::new(config))
    }
}

/// Resolve `file` under `mount` without touching the filesystem.
///
/// `..` segments are resolved lexically and may never climb above the
/// mount root; absolute paths and prefix components are rejected outright.
/// The result must be a strict descendant of the root.
fn resolve_under_mount(mount: &Path, file: &str) -> Result<PathBuf, GatewayError> {
    // A leading slash would make `join` replace the mount root entirely
    let trimmed = file.trim_start_matches('/');

    let mut resolved = mount.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(GatewayError::InvalidFilePath);
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(GatewayError::InvalidFilePath);
            }
        }
    }

    if depth == 0 {
        return Err(GatewayError::InvalidFilePath);
    }

    Ok(resolved)
}

#[async_trait]
impl ImageSource for FilesystemSource {
    fn matches(&self, req: &ImageRequest) -> bool {
        req.method == Method::GET
            && req
                .query_param(FILE_QUERY_KEY)
                .is_some_and(|v| !v.is_empty())
    }

    async fn fetch(&self, req: &ImageRequest) -> Result<Bytes, GatewayError> {
        let raw = req
            .query_param(FILE_QUERY_KEY)
            .filter(|v| !v.is_empty())
            .ok_or(GatewayError::MissingFileParam)?;

        let file = urlencoding::decode(raw)
            .map_err(|_| GatewayError::InvalidFilePath)?
            .into_owned();

        let mount = self
            .config
            .mount_path
            .as_deref()
            .ok_or(GatewayError::InvalidFilePath)?;

        let path = resolve_under_mount(mount, &file)?;
        debug!(path = %path.display(), "reading local image");

        // Missing files and permission failures are indistinguishable from
        // traversal rejections on the wire
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|_| GatewayError::InvalidFilePath)
    }
}

// =============================================================================
// Tests
// =============================================================================
