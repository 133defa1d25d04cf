//! Transform engine boundary.
//!
//! The gateway never interprets pixel data itself; it talks to an engine
//! through the [`TransformEngine`] trait: transform bytes, read metadata,
//! detect the image type. The bundled [`RasterEngine`] backs onto the
//! `image` crate, but anything honoring the trait plugs in.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

pub mod raster;

pub use raster::RasterEngine;

// =============================================================================
// Image Types
// =============================================================================

/// Supported image container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Jpeg,
    Png,
    Webp,
    Gif,
    Tiff,
}

impl ImageType {
    /// Parse a user-supplied format token (`jpeg`, `jpg`, `png`, ...).
    pub fn from_name(name: &str) -> Option<ImageType> {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(ImageType::Jpeg),
            "png" => Some(ImageType::Png),
            "webp" => Some(ImageType::Webp),
            "gif" => Some(ImageType::Gif),
            "tiff" => Some(ImageType::Tiff),
            _ => None,
        }
    }

    /// MIME type for response headers.
    pub fn mime(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "image/jpeg",
            ImageType::Png => "image/png",
            ImageType::Webp => "image/webp",
            ImageType::Gif => "image/gif",
            ImageType::Tiff => "image/tiff",
        }
    }

    /// Short type token used in metadata output.
    pub fn name(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpeg",
            ImageType::Png => "png",
            ImageType::Webp => "webp",
            ImageType::Gif => "gif",
            ImageType::Tiff => "tiff",
        }
    }
}

// =============================================================================
// Operations and Parameters
// =============================================================================

/// The pixel-level operations the gateway can request from an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Resize,
    Enlarge,
    Fit,
    Crop,
    SmartCrop,
    Extract,
    Rotate,
    AutoRotate,
    Flip,
    Flop,
    Thumbnail,
    Zoom,
    Convert,
    Watermark,
    WatermarkImage,
    Blur,
}

/// Parameters for a single transform invocation, parsed from the query
/// string (or a pipeline step's `params` object).
#[derive(Debug, Clone, Default)]
pub struct TransformParams {
    pub width: u32,
    pub height: u32,
    pub top: u32,
    pub left: u32,
    pub area_width: u32,
    pub area_height: u32,
    pub rotate: u32,
    pub factor: f64,
    pub quality: u8,
    pub sigma: f64,
    pub min_ampl: f64,
    pub text: String,
    pub font: String,
    pub text_width: u32,
    pub opacity: f32,
    pub image_url: String,
    pub no_crop: bool,
    /// Requested output format; `None` keeps the source format
    pub format: Option<ImageType>,
    /// Raw bytes of the watermark overlay, fetched by the pipeline
    pub overlay: Option<Bytes>,
}

impl TransformParams {
    pub fn quality_or_default(&self) -> u8 {
        if (1..=100).contains(&self.quality) {
            self.quality
        } else {
            80
        }
    }
}

// =============================================================================
// Engine Results
// =============================================================================

/// Engine output: encoded bytes plus their MIME type.
#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub body: Bytes,
    pub mime: &'static str,
}

/// Source image metadata as reported by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "type")]
    pub image_type: String,
    pub space: String,
    #[serde(rename = "hasAlpha")]
    pub has_alpha: bool,
    #[serde(rename = "hasProfile")]
    pub has_profile: bool,
    pub channels: u8,
    pub orientation: u8,
}

/// Failures raised by a transform engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("cannot decode image: {0}")]
    Decode(String),

    #[error("cannot encode image: {0}")]
    Encode(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    Invalid(String),

    /// A panic recovered at the engine boundary
    #[error("engine aborted: {0}")]
    Aborted(String),
}

/// The external transform capability.
///
/// Implementations are synchronous and CPU-bound; callers are expected to
/// move invocations off the async reactor themselves.
pub trait TransformEngine: Send + Sync {
    /// Apply one operation to the image bytes.
    fn transform(
        &self,
        buf: &[u8],
        op: OperationKind,
        params: &TransformParams,
    ) -> Result<TransformedImage, EngineError>;

    /// Read image metadata without transforming.
    fn metadata(&self, buf: &[u8]) -> Result<ImageMetadata, EngineError>;

    /// Detect the container format, if recognizable.
    fn detect_type(&self, buf: &[u8]) -> Option<ImageType>;
}
