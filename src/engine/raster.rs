//! Raster transform engine backed by the `image` crate.
//!
//! Every entry point runs behind a panic guard: abnormal termination inside
//! the codec stack surfaces as a typed [`EngineError::Aborted`] instead of
//! unwinding through the gateway.

use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use super::{
    EngineError, ImageMetadata, ImageType, OperationKind, TransformEngine, TransformParams,
    TransformedImage,
};

/// Transform engine decoding, processing and re-encoding in process memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterEngine;

impl RasterEngine {
    pub fn new() -> Self {
        RasterEngine
    }

    fn apply(
        &self,
        buf: &[u8],
        op: OperationKind,
        params: &TransformParams,
    ) -> Result<TransformedImage, EngineError> {
        let source_format =
            image::guess_format(buf).map_err(|e| EngineError::Decode(e.to_string()))?;
        let img = image::load_from_memory_with_format(buf, source_format)
            .map_err(|e| EngineError::Decode(e.to_string()))?;

        let (width, height) = img.dimensions();

        let out = match op {
            OperationKind::Resize | OperationKind::Enlarge => {
                let (w, h) = target_dims(params, width, height)?;
                img.resize_exact(w, h, FilterType::Lanczos3)
            }
            OperationKind::Fit => {
                // Contain within the requested box, preserving aspect ratio
                img.resize(params.width, params.height, FilterType::Lanczos3)
            }
            OperationKind::Crop | OperationKind::SmartCrop => {
                let (w, h) = target_dims(params, width, height)?;
                cover_crop(&img, w, h)
            }
            OperationKind::Extract => extract_area(&img, params)?,
            OperationKind::Rotate => match params.rotate % 360 {
                0 => img,
                90 => img.rotate90(),
                180 => img.rotate180(),
                270 => img.rotate270(),
                other => {
                    return Err(EngineError::Unsupported(format!(
                        "rotation must be a multiple of 90, got {other}"
                    )))
                }
            },
            // No EXIF orientation support in this engine; the image is
            // already upright after decoding
            OperationKind::AutoRotate => img,
            OperationKind::Flip => img.flipv(),
            OperationKind::Flop => img.fliph(),
            OperationKind::Thumbnail => {
                let w = if params.width > 0 { params.width } else { u32::MAX };
                let h = if params.height > 0 { params.height } else { u32::MAX };
                img.thumbnail(w, h)
            }
            OperationKind::Zoom => zoom(&img, params)?,
            OperationKind::Convert => img,
            OperationKind::Watermark => {
                return Err(EngineError::Unsupported(
                    "text watermark rendering is not supported by this engine".to_string(),
                ))
            }
            OperationKind::WatermarkImage => overlay_image(img, params)?,
            OperationKind::Blur => {
                let sigma = if params.sigma > 0.0 {
                    params.sigma
                } else {
                    params.min_ampl
                };
                img.blur(sigma as f32)
            }
        };

        let out_type = params
            .format
            .or_else(|| image_type_of(source_format))
            .unwrap_or(ImageType::Jpeg);

        encode(&out, out_type, params.quality_or_default())
    }
}

impl TransformEngine for RasterEngine {
    fn transform(
        &self,
        buf: &[u8],
        op: OperationKind,
        params: &TransformParams,
    ) -> Result<TransformedImage, EngineError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.apply(buf, op, params))) {
            Ok(result) => result,
            Err(payload) => Err(EngineError::Aborted(panic_message(&payload))),
        }
    }

    fn metadata(&self, buf: &[u8]) -> Result<ImageMetadata, EngineError> {
        match panic::catch_unwind(AssertUnwindSafe(|| read_metadata(buf))) {
            Ok(result) => result,
            Err(payload) => Err(EngineError::Aborted(panic_message(&payload))),
        }
    }

    fn detect_type(&self, buf: &[u8]) -> Option<ImageType> {
        image::guess_format(buf).ok().and_then(image_type_of)
    }
}

fn read_metadata(buf: &[u8]) -> Result<ImageMetadata, EngineError> {
    let format = image::guess_format(buf).map_err(|e| EngineError::Decode(e.to_string()))?;
    let img = image::load_from_memory_with_format(buf, format)
        .map_err(|e| EngineError::Decode(e.to_string()))?;

    let color = img.color();
    let (width, height) = img.dimensions();

    Ok(ImageMetadata {
        width,
        height,
        image_type: image_type_of(format)
            .map(|t| t.name().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        space: if color.has_color() { "srgb" } else { "b-w" }.to_string(),
        has_alpha: color.has_alpha(),
        has_profile: false,
        channels: color.channel_count(),
        orientation: 0,
    })
}

fn image_type_of(format: ImageFormat) -> Option<ImageType> {
    match format {
        ImageFormat::Jpeg => Some(ImageType::Jpeg),
        ImageFormat::Png => Some(ImageType::Png),
        ImageFormat::WebP => Some(ImageType::Webp),
        ImageFormat::Gif => Some(ImageType::Gif),
        ImageFormat::Tiff => Some(ImageType::Tiff),
        _ => None,
    }
}

/// Fill in a missing width or height from the source aspect ratio.
fn target_dims(params: &TransformParams, width: u32, height: u32) -> Result<(u32, u32), EngineError> {
    match (params.width, params.height) {
        (0, 0) => Err(EngineError::Invalid(
            "width or height must be greater than zero".to_string(),
        )),
        (w, 0) => {
            let h = ((w as u64 * height as u64) / width.max(1) as u64).max(1) as u32;
            Ok((w, h))
        }
        (0, h) => {
            let w = ((h as u64 * width as u64) / height.max(1) as u64).max(1) as u32;
            Ok((w, h))
        }
        (w, h) => Ok((w, h)),
    }
}

/// Scale to cover the target box, then center-crop to it.
fn cover_crop(img: &DynamicImage, w: u32, h: u32) -> DynamicImage {
    let (iw, ih) = img.dimensions();
    let scale = (w as f64 / iw as f64).max(h as f64 / ih as f64);
    let sw = ((iw as f64 * scale).ceil() as u32).max(w);
    let sh = ((ih as f64 * scale).ceil() as u32).max(h);

    let scaled = img.resize_exact(sw, sh, FilterType::Lanczos3);
    let x = (sw - w) / 2;
    let y = (sh - h) / 2;
    scaled.crop_imm(x, y, w, h)
}

fn extract_area(img: &DynamicImage, params: &TransformParams) -> Result<DynamicImage, EngineError> {
    let (iw, ih) = img.dimensions();
    let right = params.left as u64 + params.area_width as u64;
    let bottom = params.top as u64 + params.area_height as u64;
    if right > iw as u64 || bottom > ih as u64 {
        return Err(EngineError::Invalid(format!(
            "extract area {}x{}+{}+{} is out of bounds for a {iw}x{ih} image",
            params.area_width, params.area_height, params.left, params.top
        )));
    }
    Ok(img.crop_imm(params.left, params.top, params.area_width, params.area_height))
}

fn zoom(img: &DynamicImage, params: &TransformParams) -> Result<DynamicImage, EngineError> {
    let base = if params.area_width > 0 && params.area_height > 0 {
        extract_area(img, params)?
    } else {
        img.clone()
    };

    let (w, h) = base.dimensions();
    let zw = ((w as f64 * params.factor).round() as u32).max(1);
    let zh = ((h as f64 * params.factor).round() as u32).max(1);
    Ok(base.resize_exact(zw, zh, FilterType::Lanczos3))
}

fn overlay_image(
    mut base: DynamicImage,
    params: &TransformParams,
) -> Result<DynamicImage, EngineError> {
    let overlay_buf = params
        .overlay
        .as_ref()
        .ok_or_else(|| EngineError::Invalid("missing watermark image bytes".to_string()))?;
    let overlay = image::load_from_memory(overlay_buf)
        .map_err(|e| EngineError::Decode(format!("watermark image: {e}")))?;

    image::imageops::overlay(&mut base, &overlay, params.left as i64, params.top as i64);
    Ok(base)
}

fn encode(img: &DynamicImage, out: ImageType, quality: u8) -> Result<TransformedImage, EngineError> {
    let mut buf = Cursor::new(Vec::new());

    match out {
        ImageType::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            // JPEG has no alpha channel
            img.to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|e| EngineError::Encode(e.to_string()))?;
        }
        ImageType::Png => write_format(img, &mut buf, ImageFormat::Png)?,
        ImageType::Webp => write_format(img, &mut buf, ImageFormat::WebP)?,
        ImageType::Gif => write_format(img, &mut buf, ImageFormat::Gif)?,
        ImageType::Tiff => write_format(img, &mut buf, ImageFormat::Tiff)?,
    }

    Ok(TransformedImage {
        body: Bytes::from(buf.into_inner()),
        mime: out.mime(),
    })
}

fn write_format(
    img: &DynamicImage,
    buf: &mut Cursor<Vec<u8>>,
    format: ImageFormat,
) -> Result<(), EngineError> {
    img.write_to(buf, format)
        .map_err(|e| EngineError::Encode(e.to_string()))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "internal engine error".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
