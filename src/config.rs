//! Configuration management for pixgate.
//!
//! Options come from command-line arguments via clap, with environment
//! variable fallbacks using the `PIXGATE_` prefix and sensible defaults
//! for everything optional.
//!
//! # Example
//!
//! ```ignore
//! use pixgate::config::Config;
//!
//! let config = Config::parse();
//! println!("Listening on {}", config.bind_address());
//! ```

use clap::Parser;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8088;

/// Default megapixel ceiling for source images.
pub const DEFAULT_MAX_ALLOWED_PIXELS: f64 = 18.0;

/// Default remote fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT: u64 = 60;

/// Hard ceiling for request body and multipart reads (64 MiB).
pub const MAX_BODY_BYTES: usize = 64 << 20;

// =============================================================================
// CLI Arguments
// =============================================================================

/// pixgate - an HTTP gateway for on-the-fly image processing.
///
/// Accepts an image from a remote URL, the request body or a mounted
/// directory, applies a named transformation (or a pipeline of them) and
/// returns the result.
#[derive(Parser, Debug, Clone)]
#[command(name = "pixgate")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PIXGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PIXGATE_PORT")]
    pub port: u16,

    /// URL path prefix for all routes (e.g. "/imaging").
    #[arg(long, default_value = "", env = "PIXGATE_PATH_PREFIX")]
    pub path_prefix: String,

    // =========================================================================
    // Source Configuration
    // =========================================================================
    /// Enable fetching images from remote URLs via the `url` query parameter.
    #[arg(long, default_value_t = false, env = "PIXGATE_ENABLE_URL_SOURCE")]
    pub enable_url_source: bool,

    /// Allowed remote origins (comma-separated).
    ///
    /// Entries may carry a path prefix and a `*.` wildcard subdomain, e.g.
    /// `https://images.example.com/photos,*.cdn.example.org`. An empty list
    /// admits any origin.
    #[arg(long, env = "PIXGATE_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Maximum remote image size in bytes (0 = unlimited).
    #[arg(long, default_value_t = 0, env = "PIXGATE_MAX_ALLOWED_SIZE")]
    pub max_allowed_size: usize,

    /// Maximum source image resolution in megapixels.
    #[arg(long, default_value_t = DEFAULT_MAX_ALLOWED_PIXELS, env = "PIXGATE_MAX_ALLOWED_PIXELS")]
    pub max_allowed_pixels: f64,

    /// Remote fetch timeout in seconds (applies to HEAD probe and GET).
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT, env = "PIXGATE_FETCH_TIMEOUT")]
    pub fetch_timeout: u64,

    /// Local directory to serve images from via the `file` query parameter.
    #[arg(long, env = "PIXGATE_MOUNT")]
    pub mount: Option<String>,

    /// Headers to forward to remote image origins (comma-separated).
    #[arg(long, env = "PIXGATE_FORWARD_HEADERS", value_delimiter = ',')]
    pub forward_headers: Vec<String>,

    /// Forward the caller's Authorization header to remote origins.
    #[arg(long, default_value_t = false, env = "PIXGATE_AUTH_FORWARDING")]
    pub auth_forwarding: bool,

    /// Fixed Authorization header value for remote origins (overrides
    /// any forwarded header).
    #[arg(long, env = "PIXGATE_AUTHORIZATION")]
    pub authorization: Option<String>,

    // =========================================================================
    // Access Control
    // =========================================================================
    /// API key required via the `API-Key` header or `key` query parameter.
    #[arg(long, env = "PIXGATE_API_KEY")]
    pub api_key: Option<String>,

    /// Enable HMAC-SHA256 URL signature enforcement on image endpoints.
    #[arg(long, default_value_t = false, env = "PIXGATE_ENABLE_URL_SIGNATURE")]
    pub enable_url_signature: bool,

    /// Shared secret for URL signatures.
    #[arg(long, env = "PIXGATE_URL_SIGNATURE_KEY")]
    pub url_signature_key: Option<String>,

    // =========================================================================
    // Admission Control
    // =========================================================================
    /// Sustained request rate per second (0 = unlimited).
    #[arg(long, default_value_t = 0, env = "PIXGATE_RATE")]
    pub rate: u32,

    /// Burst allowance on top of the sustained rate.
    #[arg(long, default_value_t = 0, env = "PIXGATE_BURST")]
    pub burst: u32,

    // =========================================================================
    // HTTP Behavior
    // =========================================================================
    /// Enable CORS support.
    #[arg(long, default_value_t = false, env = "PIXGATE_CORS")]
    pub cors: bool,

    /// Cache-Control TTL in seconds for GET responses (-1 disables cache
    /// headers, 0 emits explicit no-store directives).
    #[arg(long, default_value_t = -1, env = "PIXGATE_HTTP_CACHE_TTL")]
    pub http_cache_ttl: i64,

    /// Report the output image dimensions via Image-Width/Image-Height headers.
    #[arg(long, default_value_t = false, env = "PIXGATE_RETURN_SIZE")]
    pub return_size: bool,

    /// Endpoint names to disable (comma-separated, e.g. "blur,watermark").
    #[arg(long, env = "PIXGATE_DISABLE_ENDPOINTS", value_delimiter = ',')]
    pub disable_endpoints: Vec<String>,

    // =========================================================================
    // Placeholder Configuration
    // =========================================================================
    /// Path to a fallback image served instead of JSON error bodies.
    #[arg(long, env = "PIXGATE_PLACEHOLDER")]
    pub placeholder: Option<String>,

    /// Fixed HTTP status for placeholder replies (0 = use the original
    /// error status).
    #[arg(long, default_value_t = 0, env = "PIXGATE_PLACEHOLDER_STATUS")]
    pub placeholder_status: u16,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.enable_url_signature
            && self
                .url_signature_key
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(
                "URL signature enforcement is enabled but no key provided. \
                 Set --url-signature-key or PIXGATE_URL_SIGNATURE_KEY"
                    .to_string(),
            );
        }

        if self.rate > 0 && self.burst == 0 {
            return Err("burst must be greater than 0 when rate limiting is enabled".to_string());
        }

        if self.max_allowed_pixels <= 0.0 {
            return Err("max_allowed_pixels must be greater than 0".to_string());
        }

        if self.placeholder_status != 0 && !(400..=511).contains(&self.placeholder_status) {
            return Err("placeholder_status must be within 400-511".to_string());
        }

        if let Some(ref mount) = self.mount {
            if mount.is_empty() {
                return Err("mount directory must not be empty".to_string());
            }
        }

        if self.fetch_timeout == 0 {
            return Err("fetch_timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether any GET-capable image source is enabled.
    pub fn has_get_source(&self) -> bool {
        self.mount.is_some() || self.enable_url_source
    }
}

// =============================================================================
// Tests
// =============================================================================
