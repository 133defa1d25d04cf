//! pixgate - an HTTP gateway for on-the-fly image processing.
//!
//! Accepts an image from a remote URL, the request body (raw or
//! multipart) or a mounted local directory, applies a named
//! transformation or a JSON-described pipeline of them, and returns the
//! processed bytes.
//!
//! # Architecture
//!
//! ```text
//! request ──> policy chain ──> source registry ──> operation pipeline ──> reply
//!             (method, rate,   (url / body / fs)   (validate, guard,
//!              key, deny-list)                      transform engine)
//! ```
//!
//! - [`source`] resolves where the image bytes come from
//! - [`engine`] performs the pixel work behind the [`engine::TransformEngine`] trait
//! - [`pipeline`] validates parameters and drives single or chained operations
//! - [`server`] owns routing, admission policies, signed URLs and error replies
//!
//! # Example
//!
//! ```ignore
//! use pixgate::config::Config;
//! use pixgate::server::{build_state, create_router};
//!
//! let config = Config::parse();
//! let state = build_state(config)?;
//! let router = create_router(state);
//! axum::serve(listener, router).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod source;

pub use config::Config;
pub use error::GatewayError;
pub use server::{build_state, create_router, AppState};
