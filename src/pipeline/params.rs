//! Operation parameter parsing.
//!
//! Parameters travel as query-string key/value pairs for the single
//! operation endpoints and as a JSON `params` object for pipeline steps;
//! both forms funnel into the same [`TransformParams`].

use serde_json::{Map, Value};

use crate::engine::{ImageType, TransformParams};
use crate::error::GatewayError;

/// Requested output format, resolved before the engine is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Keep the source image format
    Source,
    /// Negotiate via the Accept header
    Auto,
    /// Explicitly requested format
    Fixed(ImageType),
}

/// Query-derived operation parameters plus the output format request.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub params: TransformParams,
    pub output: OutputFormat,
}

fn invalid(key: &str) -> GatewayError {
    GatewayError::InvalidInput(format!("Invalid value for parameter: {key}"))
}

fn parse_format(token: &str) -> Result<OutputFormat, GatewayError> {
    if token.eq_ignore_ascii_case("auto") {
        return Ok(OutputFormat::Auto);
    }
    ImageType::from_name(token)
        .map(OutputFormat::Fixed)
        .ok_or_else(|| GatewayError::InvalidInput("Unsupported output image format".to_string()))
}

/// Parse operation parameters from decoded query pairs.
///
/// Unrelated keys (`url`, `file`, `sign`, `key`, `operations`, ...) are
/// ignored; they belong to other layers.
pub fn parse_query(query: &[(String, String)]) -> Result<RequestParams, GatewayError> {
    let mut params = TransformParams::default();
    let mut output = OutputFormat::Source;

    for (key, value) in query {
        match key.as_str() {
            "width" => params.width = value.parse().map_err(|_| invalid(key))?,
            "height" => params.height = value.parse().map_err(|_| invalid(key))?,
            "top" => params.top = value.parse().map_err(|_| invalid(key))?,
            "left" => params.left = value.parse().map_err(|_| invalid(key))?,
            "areawidth" => params.area_width = value.parse().map_err(|_| invalid(key))?,
            "areaheight" => params.area_height = value.parse().map_err(|_| invalid(key))?,
            "rotate" => params.rotate = value.parse().map_err(|_| invalid(key))?,
            "factor" => params.factor = value.parse().map_err(|_| invalid(key))?,
            "quality" => params.quality = value.parse().map_err(|_| invalid(key))?,
            "sigma" => params.sigma = value.parse().map_err(|_| invalid(key))?,
            "minampl" => params.min_ampl = value.parse().map_err(|_| invalid(key))?,
            "textwidth" => params.text_width = value.parse().map_err(|_| invalid(key))?,
            "opacity" => params.opacity = value.parse().map_err(|_| invalid(key))?,
            "text" => params.text = value.clone(),
            "font" => params.font = value.clone(),
            "image" => params.image_url = value.clone(),
            "nocrop" => params.no_crop = value.parse().map_err(|_| invalid(key))?,
            "type" if !value.is_empty() => output = parse_format(value)?,
            _ => {}
        }
    }

    Ok(RequestParams { params, output })
}

/// Parse a pipeline step's JSON `params` object.
///
/// `auto` output negotiation only applies at the request level, so an
/// explicit `type` here must name a concrete format.
pub fn parse_json_params(map: &Map<String, Value>) -> Result<RequestParams, GatewayError> {
    let pairs: Vec<(String, String)> = map
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(GatewayError::InvalidInput(format!(
                        "Invalid value for parameter: {key}"
                    )))
                }
            };
            Ok((key.clone(), rendered))
        })
        .collect::<Result<_, _>>()?;

    let parsed = parse_query(&pairs)?;
    if parsed.output == OutputFormat::Auto {
        return Err(GatewayError::InvalidInput(
            "Unsupported output image format".to_string(),
        ));
    }
    Ok(parsed)
}

/// Scan the Accept header in order and pick the first supported format.
pub fn negotiate_format(accept: &str) -> Option<ImageType> {
    for part in accept.split(',') {
        let media = part
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match media.as_str() {
            "image/webp" => return Some(ImageType::Webp),
            "image/png" => return Some(ImageType::Png),
            "image/jpeg" => return Some(ImageType::Jpeg),
            _ => {}
        }
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
