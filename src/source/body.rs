//! Request body image source.
//!
//! Claims POST and PUT requests. Multipart bodies are parsed for a fixed
//! `file` field; anything else is treated as a raw image payload. Both
//! paths run under a hard byte ceiling, and an empty payload is a distinct
//! error from an oversized one.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use multer::{Constraints, Multipart, SizeLimit};

use super::{ImageRequest, ImageSource, SourceConfig};
use crate::config::MAX_BODY_BYTES;
use crate::error::GatewayError;

/// Multipart form field holding the image file.
pub const FORM_FIELD_NAME: &str = "file";

/// Image source reading the inbound request payload.
pub struct BodySource {
    max_bytes: usize,
}

impl BodySource {
    pub fn new(_config: Arc<SourceConfig>) -> Self {
        Self {
            max_bytes: MAX_BODY_BYTES,
        }
    }

    /// Boxed factory for registry construction.
    pub fn factory(config: Arc<SourceConfig>) -> Box<dyn ImageSource> {
        Box::new(Self::new(config))
    }

    #[cfg(test)]
    fn with_limit(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    fn is_multipart(req: &ImageRequest) -> bool {
        req.header("Content-Type")
            .is_some_and(|ct| ct.starts_with("multipart/"))
    }

    async fn read_form_body(&self, req: &ImageRequest) -> Result<Bytes, GatewayError> {
        let content_type = req.header("Content-Type").unwrap_or("");
        let boundary = multer::parse_boundary(content_type)
            .map_err(|_| GatewayError::InvalidInput("Malformed multipart request".to_string()))?;

        let body = req.body.clone();
        let stream = futures::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
        let constraints = Constraints::new()
            .size_limit(SizeLimit::new().whole_stream(self.max_bytes as u64));
        let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

        while let Some(field) = multipart.next_field().await.map_err(map_multer_error)? {
            if field.name() != Some(FORM_FIELD_NAME) {
                continue;
            }

            let data = field.bytes().await.map_err(map_multer_error)?;
            if data.is_empty() {
                return Err(GatewayError::EmptyBody);
            }
            return Ok(data);
        }

        Err(GatewayError::InvalidInput(format!(
            "Missing form field: {FORM_FIELD_NAME}"
        )))
    }

    fn read_raw_body(&self, req: &ImageRequest) -> Result<Bytes, GatewayError> {
        if req.body.len() > self.max_bytes {
            return Err(GatewayError::PayloadTooLarge {
                max_bytes: self.max_bytes,
            });
        }
        if req.body.is_empty() {
            return Err(GatewayError::EmptyBody);
        }
        Ok(req.body.clone())
    }
}

fn map_multer_error(err: multer::Error) -> GatewayError {
    match err {
        multer::Error::StreamSizeExceeded { limit }
        | multer::Error::FieldSizeExceeded { limit, .. } => GatewayError::PayloadTooLarge {
            max_bytes: limit as usize,
        },
        other => GatewayError::InvalidInput(format!("Malformed multipart request: {other}")),
    }
}

#[async_trait]
impl ImageSource for BodySource {
    fn matches(&self, req: &ImageRequest) -> bool {
        req.method == Method::POST || req.method == Method::PUT
    }

    async fn fetch(&self, req: &ImageRequest) -> Result<Bytes, GatewayError> {
        if Self::is_multipart(req) {
            self.read_form_body(req).await
        } else {
            self.read_raw_body(req)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
