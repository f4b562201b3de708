//! Error types for thinkgate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for thinkgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for thinkgate.
///
/// Configuration failures never reach request handling; they surface from
/// `Config::from_file` as `ConfigError` before the server starts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned an error response (status {status})")]
    UpstreamStatus { status: u16 },

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Upstream problems are collapsed into one generic gateway error;
        // status codes and bodies from the provider go to the log only.
        let (status, message) = match &self {
            Error::Transport(_) | Error::UpstreamStatus { .. } => {
                (StatusCode::BAD_GATEWAY, "Upstream request failed".to_string())
            }
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        // OpenAI-compatible error format
        let body = serde_json::json!({
            "error": {
                "message": message,
                "type": "thinkgate_error",
                "code": status.as_u16()
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
