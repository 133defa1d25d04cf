use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Canonical gateway error taxonomy.
///
/// Every layer converts its internal failures into a `GatewayError` before
/// crossing the middleware boundary, so the response writer only ever sees
/// a typed error with a concrete HTTP status.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No registered image source claimed the request
    #[error("Cannot process the image due to missing or invalid params")]
    MissingSource,

    /// Malformed path, URL, parameters or pipeline description
    #[error("{0}")]
    InvalidInput(String),

    /// API key missing or mismatched
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Remote origin is not in the allow-list
    #[error("Not allowed remote URL origin: {0}")]
    OriginNotAllowed(String),

    /// Request or upstream body exceeds the configured byte ceiling
    #[error("Image payload exceeds the maximum allowed size of {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: usize },

    /// Image bytes could not be decoded or the MIME type is disallowed
    #[error("Unsupported media type")]
    UnsupportedMedia,

    /// Source image exceeds the megapixel ceiling
    #[error("Image resolution is too big")]
    ResolutionTooLarge,

    /// Network or status failure while fetching from a remote source
    #[error("Error fetching remote http image: {message}")]
    UpstreamFetch { message: String, status: u16 },

    /// The transform engine failed (including recovered panics)
    #[error("Error processing image: {0}")]
    TransformFailure(String),

    /// Endpoint disabled via the deny-list
    #[error("Not implemented endpoint")]
    NotImplemented,

    /// Admission control rejected the request
    #[error("Too many requests, please retry later")]
    RateLimited,

    /// URL signature is not valid base64url (format error)
    #[error("Invalid URL signature")]
    SignatureFormat,

    /// URL signature decoded but does not match (integrity error)
    #[error("URL signature mismatch")]
    SignatureMismatch,

    /// Body read produced zero bytes
    #[error("Empty or unreadable image")]
    EmptyBody,

    /// Method other than GET or POST
    #[error("HTTP method not allowed. Try with a POST or GET method")]
    MethodNotAllowed,

    /// GET requested but no GET-capable source is enabled
    #[error("GET method not allowed. Make sure the remote URL source is enabled with --enable-url-source")]
    GetMethodNotAllowed,

    /// `file` query parameter missing or empty
    #[error("Missing required param: file")]
    MissingFileParam,

    /// Traversal attempt, unreadable or nonexistent file (never distinguished)
    #[error("Invalid file path")]
    InvalidFilePath,
}

/// JSON body serialized for every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub status: u16,
}

impl GatewayError {
    /// HTTP status for this error, clamped to the valid error range.
    ///
    /// Statuses outside [400, 511] degrade to 503 so a bad upstream status
    /// can never turn an error into a success.
    pub fn status(&self) -> StatusCode {
        let code = match self {
            GatewayError::MissingSource => 400,
            GatewayError::InvalidInput(_) => 400,
            GatewayError::InvalidApiKey => 401,
            GatewayError::OriginNotAllowed(_) => 403,
            GatewayError::PayloadTooLarge { .. } => 413,
            GatewayError::UnsupportedMedia => 406,
            GatewayError::ResolutionTooLarge => 422,
            GatewayError::UpstreamFetch { status, .. } => *status,
            GatewayError::TransformFailure(_) => 400,
            GatewayError::NotImplemented => 501,
            GatewayError::RateLimited => 429,
            GatewayError::SignatureFormat => 400,
            GatewayError::SignatureMismatch => 403,
            GatewayError::EmptyBody => 400,
            GatewayError::MethodNotAllowed => 405,
            GatewayError::GetMethodNotAllowed => 405,
            GatewayError::MissingFileParam => 400,
            GatewayError::InvalidFilePath => 400,
        };

        if (400..=511).contains(&code) {
            StatusCode::from_u16(code).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }

    /// The `{message, status}` body serialized on every error reply.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            message: self.to_string().replace('\n', ""),
            status: self.status().as_u16(),
        }
    }

    /// JSON-encoded error body, also used for the `Error` header in
    /// placeholder replies.
    pub fn json(&self) -> String {
        serde_json::to_string(&self.body())
            .unwrap_or_else(|_| format!("{{\"message\":\"{}\",\"status\":503}}", self))
    }
}
