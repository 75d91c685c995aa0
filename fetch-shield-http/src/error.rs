//! Transport error types
//!
//! [`HttpError`] covers setting the transport up. Failures of individual
//! calls are reported as [`TransportError`] so the pipeline can retry them.

use fetch_shield_core::TransportError;
use thiserror::Error;

/// Errors raised while building an [`HttpTransport`](crate::HttpTransport)
#[derive(Error, Debug)]
pub enum HttpError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The underlying client could not be built
    #[error("Client error: {0}")]
    ClientError(#[from] reqwest::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// A configured header name or value is not valid HTTP
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// Result type alias for transport setup
pub type HttpResult<T> = Result<T, HttpError>;

/// Longest response body excerpt carried in a status error message.
const MAX_ERROR_BODY: usize = 256;

/// Classify a `reqwest` failure into the pipeline's error kinds.
pub fn classify_reqwest_error(error: &reqwest::Error) -> TransportError {
    let message = error.to_string();
    if error.is_timeout() {
        TransportError::timeout(message)
    } else if error.is_connect() {
        TransportError::connect(message)
    } else if error.is_decode() || error.is_body() {
        TransportError::decode(message)
    } else if let Some(status) = error.status() {
        TransportError::status(status.as_u16(), message)
    } else {
        TransportError::other(message)
    }
}

/// Failure for a non-2xx answer, keeping a short excerpt of the body.
pub fn status_error(status: u16, body: &[u8]) -> TransportError {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    let message = if text.is_empty() {
        format!("HTTP {}", status)
    } else if text.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("HTTP {}: {}...", status, &text[..end])
    } else {
        format!("HTTP {}: {}", status, text)
    };
    TransportError::status(status, message)
}
