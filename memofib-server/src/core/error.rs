use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to the client of the fib endpoint
#[derive(Debug, Error)]
pub enum FibError {
    #[error("Invalid value: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FibError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message written in the response body. Details stay in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid value",
            Self::Internal(_) => "internal error",
        }
    }
}

impl IntoResponse for FibError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.public_message() }));
        (self.status_code(), body).into_response()
    }
}

/// Result type alias for fib operations
pub type Result<T> = std::result::Result<T, FibError>;
