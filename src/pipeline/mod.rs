//! Operation pipeline.
//!
//! Executes one named transformation, or an ordered chain of up to ten of
//! them, against fetched image bytes. The pipeline owns the cheap
//! pre-flight checks (supported MIME, megapixel ceiling, per-operation
//! parameter validation, unknown-name rejection) so the engine is only
//! invoked for work that can plausibly succeed.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::engine::{
    EngineError, ImageMetadata, OperationKind, TransformEngine, TransformParams, TransformedImage,
};
use crate::error::GatewayError;

pub mod params;

pub use params::{negotiate_format, parse_json_params, parse_query, OutputFormat, RequestParams};

/// Upper bound on chained operations per request.
pub const MAX_PIPELINE_OPERATIONS: usize = 10;

/// Byte cap for bespoke watermark image fetches.
const MAX_OVERLAY_BYTES: usize = 1 << 20;

// =============================================================================
// Operation Table
// =============================================================================

/// Look up a pipeline-able operation by its public name.
pub fn operation_by_name(name: &str) -> Option<OperationKind> {
    match name {
        "resize" => Some(OperationKind::Resize),
        "enlarge" => Some(OperationKind::Enlarge),
        "fit" => Some(OperationKind::Fit),
        "crop" => Some(OperationKind::Crop),
        "smartcrop" => Some(OperationKind::SmartCrop),
        "extract" => Some(OperationKind::Extract),
        "rotate" => Some(OperationKind::Rotate),
        "autorotate" => Some(OperationKind::AutoRotate),
        "flip" => Some(OperationKind::Flip),
        "flop" => Some(OperationKind::Flop),
        "thumbnail" => Some(OperationKind::Thumbnail),
        "zoom" => Some(OperationKind::Zoom),
        "convert" => Some(OperationKind::Convert),
        "watermark" => Some(OperationKind::Watermark),
        "watermarkimage" | "watermarkImage" => Some(OperationKind::WatermarkImage),
        "blur" => Some(OperationKind::Blur),
        _ => None,
    }
}

/// Check the operation-specific minimum parameter set before invoking the
/// engine.
pub fn validate_params(op: OperationKind, params: &TransformParams) -> Result<(), GatewayError> {
    let missing = |what: &str| Err(GatewayError::InvalidInput(format!("Missing required {what}")));

    match op {
        OperationKind::Resize
        | OperationKind::Crop
        | OperationKind::SmartCrop
        | OperationKind::Thumbnail => {
            if params.width == 0 && params.height == 0 {
                return missing("param: height or width");
            }
        }
        OperationKind::Enlarge | OperationKind::Fit => {
            if params.width == 0 || params.height == 0 {
                return missing("params: height, width");
            }
        }
        OperationKind::Extract => {
            if params.area_width == 0 || params.area_height == 0 {
                return missing("params: areawidth or areaheight");
            }
        }
        OperationKind::Rotate => {
            if params.rotate == 0 {
                return missing("param: rotate");
            }
        }
        OperationKind::Zoom => {
            if params.factor == 0.0 {
                return missing("param: factor");
            }
            if (params.top > 0 || params.left > 0)
                && params.area_width == 0
                && params.area_height == 0
            {
                return missing("params: areawidth, areaheight");
            }
        }
        OperationKind::Convert => {
            if params.format.is_none() {
                return missing("param: type");
            }
        }
        OperationKind::Watermark => {
            if params.text.is_empty() {
                return missing("param: text");
            }
        }
        OperationKind::WatermarkImage => {
            if params.image_url.is_empty() {
                return missing("param: image");
            }
        }
        OperationKind::Blur => {
            if params.sigma == 0.0 && params.min_ampl == 0.0 {
                return missing("param: sigma or minampl");
            }
        }
        OperationKind::AutoRotate | OperationKind::Flip | OperationKind::Flop => {}
    }

    Ok(())
}

// =============================================================================
// Pipeline Steps
// =============================================================================

/// One step of a chained pipeline, deserialized from the `operations`
/// JSON parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineStep {
    pub operation: String,

    #[serde(default)]
    pub params: Map<String, Value>,

    /// Keep the prior image and continue when this step fails
    #[serde(default, rename = "ignoreFailure", alias = "ignore_failure")]
    pub ignore_failure: bool,
}

/// Parse the `operations` query parameter into steps.
pub fn parse_steps(raw: &str) -> Result<Vec<PipelineStep>, GatewayError> {
    serde_json::from_str(raw)
        .map_err(|e| GatewayError::InvalidInput(format!("Invalid pipeline operations: {e}")))
}

// =============================================================================
// Pipeline Executor
// =============================================================================

/// Executes transformations against fetched image bytes.
///
/// Pure with respect to shared state: the engine and the configuration
/// snapshot are immutable, and every invocation works on its own buffers.
pub struct ImagePipeline {
    engine: Arc<dyn TransformEngine>,
    max_allowed_pixels: f64,
    overlay_client: reqwest::Client,
}

impl ImagePipeline {
    pub fn new(engine: Arc<dyn TransformEngine>, max_allowed_pixels: f64) -> Self {
        let overlay_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("HTTP client construction only fails with a broken TLS backend");
        Self {
            engine,
            max_allowed_pixels,
            overlay_client,
        }
    }

    pub fn engine(&self) -> Arc<dyn TransformEngine> {
        Arc::clone(&self.engine)
    }

    /// Run a single named operation.
    pub async fn run_single(
        &self,
        buf: Bytes,
        op: OperationKind,
        mut params: TransformParams,
    ) -> Result<TransformedImage, GatewayError> {
        self.guard_source(&buf).await?;
        validate_params(op, &params)?;

        if op == OperationKind::WatermarkImage {
            params.overlay = Some(self.fetch_overlay(&params.image_url).await?);
        }

        self.invoke(buf, op, params).await
    }

    /// Run an ordered chain of steps, feeding each step's output into the
    /// next.
    ///
    /// Bounds and unknown operation names are rejected before step one
    /// executes. A failed step marked `ignore_failure` is skipped, keeping
    /// the prior image; any other failure aborts with its 1-based position.
    pub async fn run_chain(
        &self,
        buf: Bytes,
        steps: &[PipelineStep],
    ) -> Result<TransformedImage, GatewayError> {
        if steps.is_empty() {
            return Err(GatewayError::InvalidInput(
                "Missing pipeline operations".to_string(),
            ));
        }
        if steps.len() > MAX_PIPELINE_OPERATIONS {
            return Err(GatewayError::InvalidInput(format!(
                "Maximum pipeline operations ({MAX_PIPELINE_OPERATIONS}) exceeded"
            )));
        }

        // Resolve every name up front so a typo at position k never
        // executes positions 1..k
        let resolved: Vec<OperationKind> = steps
            .iter()
            .map(|step| {
                operation_by_name(&step.operation).ok_or_else(|| {
                    GatewayError::InvalidInput(format!("Unsupported operation: {}", step.operation))
                })
            })
            .collect::<Result<_, _>>()?;

        self.guard_source(&buf).await?;

        let initial_mime = self
            .engine
            .detect_type(&buf)
            .map(|t| t.mime())
            .unwrap_or("application/octet-stream");

        let mut current = TransformedImage {
            body: buf,
            mime: initial_mime,
        };

        for (index, (step, op)) in steps.iter().zip(resolved).enumerate() {
            let position = index + 1;
            match self.run_step(&current, step, op).await {
                Ok(image) => current = image,
                Err(err) if step.ignore_failure => {
                    debug!(
                        operation = %step.operation,
                        position,
                        error = %err,
                        "pipeline step failed, keeping prior image"
                    );
                }
                Err(err) => return Err(annotate_step(err, position)),
            }
        }

        Ok(current)
    }

    /// Image metadata as a JSON document.
    pub async fn info(&self, buf: Bytes) -> Result<TransformedImage, GatewayError> {
        let meta = self.guard_source(&buf).await?;
        let body = serde_json::to_vec(&meta)
            .map_err(|e| GatewayError::TransformFailure(format!("cannot encode metadata: {e}")))?;
        Ok(TransformedImage {
            body: Bytes::from(body),
            mime: "application/json",
        })
    }

    /// Output dimensions of a processed image, when the engine can still
    /// read them (used for the size-reporting headers).
    pub async fn output_dimensions(&self, buf: Bytes) -> Option<(u32, u32)> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.metadata(&buf).ok())
            .await
            .ok()
            .flatten()
            .map(|meta| (meta.width, meta.height))
    }

    async fn run_step(
        &self,
        current: &TransformedImage,
        step: &PipelineStep,
        op: OperationKind,
    ) -> Result<TransformedImage, GatewayError> {
        let parsed = parse_json_params(&step.params)?;
        let mut params = parsed.params;
        if let OutputFormat::Fixed(format) = parsed.output {
            params.format = Some(format);
        }
        validate_params(op, &params)?;

        if op == OperationKind::WatermarkImage {
            params.overlay = Some(self.fetch_overlay(&params.image_url).await?);
        }

        self.invoke(current.body.clone(), op, params).await
    }

    /// Cheap pre-flight checks: the bytes must be a supported image and
    /// under the megapixel ceiling. Runs before any transform is invoked.
    async fn guard_source(&self, buf: &Bytes) -> Result<ImageMetadata, GatewayError> {
        let engine = Arc::clone(&self.engine);
        let buf = buf.clone();
        let meta = tokio::task::spawn_blocking(move || {
            if engine.detect_type(&buf).is_none() {
                return Err(GatewayError::UnsupportedMedia);
            }
            engine
                .metadata(&buf)
                .map_err(|_| GatewayError::UnsupportedMedia)
        })
        .await
        .map_err(|_| GatewayError::TransformFailure("engine task aborted".to_string()))??;

        let megapixels = (meta.width as f64 * meta.height as f64) / 1_000_000.0;
        if megapixels > self.max_allowed_pixels {
            warn!(
                width = meta.width,
                height = meta.height,
                limit = self.max_allowed_pixels,
                "rejecting image over megapixel ceiling"
            );
            return Err(GatewayError::ResolutionTooLarge);
        }

        Ok(meta)
    }

    /// Invoke the CPU-bound engine off the async reactor.
    async fn invoke(
        &self,
        buf: Bytes,
        op: OperationKind,
        params: TransformParams,
    ) -> Result<TransformedImage, GatewayError> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.transform(&buf, op, &params))
            .await
            .map_err(|_| GatewayError::TransformFailure("engine task aborted".to_string()))?
            .map_err(engine_error)
    }

    /// Bespoke watermark image fetch: a direct GET capped at 1 MiB,
    /// intentionally not routed through the remote source's origin and
    /// size guards.
    async fn fetch_overlay(&self, url: &str) -> Result<Bytes, GatewayError> {
        let mut response = self
            .overlay_client
            .get(url)
            .send()
            .await
            .map_err(|_| {
                GatewayError::InvalidInput(format!("Unable to retrieve watermark image: {url}"))
            })?;

        let mut buf = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            GatewayError::InvalidInput(format!("Unable to read watermark image: {e}"))
        })? {
            if buf.len() + chunk.len() > MAX_OVERLAY_BYTES {
                return Err(GatewayError::InvalidInput(format!(
                    "Watermark image exceeds the {MAX_OVERLAY_BYTES} byte limit: {url}"
                )));
            }
            buf.extend_from_slice(&chunk);
        }

        if buf.is_empty() {
            return Err(GatewayError::InvalidInput(
                "Unable to read watermark image".to_string(),
            ));
        }

        Ok(buf.freeze())
    }
}

fn engine_error(err: EngineError) -> GatewayError {
    GatewayError::TransformFailure(err.to_string())
}

/// Re-wrap a failed step's error with its 1-based position, preserving the
/// error kind (and therefore the HTTP status).
fn annotate_step(err: GatewayError, position: usize) -> GatewayError {
    let message = format!("Pipeline operation {position} failed: {err}");
    match err {
        GatewayError::InvalidInput(_) => GatewayError::InvalidInput(message),
        GatewayError::TransformFailure(_) => GatewayError::TransformFailure(message),
        other => other,
    }
}

// =============================================================================
// Tests
// =============================================================================
