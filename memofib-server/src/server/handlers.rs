use crate::core::{FibError, FibService, Outcome};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub fib: FibService,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FibResponse {
    pub result: i64,
}

/// Logs the request duration when the handler finishes or is dropped
struct RequestTimer(Instant);

impl Drop for RequestTimer {
    fn drop(&mut self) {
        info!(duration = ?self.0.elapsed(), "request completed");
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "memofib",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /fib/{n} - nth Fibonacci number, served from the cache when possible
pub async fn fib(
    State(state): State<AppState>,
    Path(n): Path<String>,
) -> Result<Response, FibError> {
    let _timer = RequestTimer(Instant::now());

    // Dropping the handler (client went away) cancels the token
    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    match state.fib.resolve(&n, cancel).await? {
        Outcome::Completed(result) => {
            Ok((StatusCode::OK, Json(FibResponse { result })).into_response())
        }
        Outcome::Cancelled => Ok(StatusCode::SERVICE_UNAVAILABLE.into_response()),
    }
}
