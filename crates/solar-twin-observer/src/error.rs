//! Error types for the HTTP API.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors that can occur in the HTTP API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource does not exist (e.g. no replay data to
    /// sample).
    #[error("not found: {0}")]
    NotFound(String),

    /// An engine command was refused in the current state.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An invalid query parameter was provided.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::BadRequest(msg) | Self::InvalidQuery(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
