//! Error taxonomy for the relay
//!
//! Every variant carries a fixed, user-safe client message. Raw upstream
//! bodies and transport errors are logged server-side only; the mapped
//! message is the single thing that crosses the trust boundary.

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// The inbound request is syntactically invalid (e.g. malformed
    /// conversation id)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested entity is not in the caller's visible set
    #[error("Model not available: {0}")]
    ForbiddenModel(String),

    /// Upstream answered 429 or 504
    #[error("Upstream rate limited or gateway timeout")]
    RateLimitOrGateway,

    /// Upstream rejected the request with its content filter
    #[error("Upstream content filter triggered")]
    ContentFiltered,

    /// The upstream SSE stream produced an undecodable event
    #[error("Stream transport error: {0}")]
    StreamTransport(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Everything else: network failures, unexpected upstream statuses
    #[error("{0}")]
    General(String),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// The fixed, localized message shown to the client for this error.
    pub fn client_message(&self) -> &'static str {
        match self {
            RelayError::BadRequest(_) => "The request is malformed and cannot be processed.",
            RelayError::ForbiddenModel(_) => "You are not allowed to use this model.",
            RelayError::RateLimitOrGateway => {
                "The server is busy right now. Please try again later."
            }
            RelayError::ContentFiltered => {
                "The message was blocked by the content safety filter. Please rephrase it and try again."
            }
            RelayError::StreamTransport(_) | RelayError::Config(_) | RelayError::General(_) => {
                "Something went wrong while generating the answer. Please try again."
            }
        }
    }

    /// HTTP status used when the error occurs before streaming has begun.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::ForbiddenModel(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        tracing::error!("Relay request failed: {self}");

        let body = serde_json::json!({ "message": self.client_message() });
        Response::builder()
            .status(self.status())
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|_| {
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::empty())
                    .unwrap()
            })
    }
}

/// Map a non-success upstream completion response to the taxonomy.
///
/// 429 and 504 become [`RelayError::RateLimitOrGateway`]; an error body with
/// `error.type == "content_filter"` becomes [`RelayError::ContentFiltered`];
/// anything else, including an unparseable error body, is a general failure.
pub fn classify_upstream(status: u16, body: &[u8]) -> RelayError {
    if status == 429 || status == 504 {
        return RelayError::RateLimitOrGateway;
    }

    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let error_type = json
            .pointer("/error/type")
            .and_then(serde_json::Value::as_str);
        if error_type == Some("content_filter") {
            return RelayError::ContentFiltered;
        }
    }

    RelayError::General(format!(
        "upstream returned status {status}: {}",
        String::from_utf8_lossy(body)
    ))
}
