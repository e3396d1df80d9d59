use axum::{extract::State, http::StatusCode, routing::get, Router};
use serde_json::{json, Value};
use tracing::error;

use crate::app_state::AppState;
use crate::utils::api_response::ApiResponse;

/// Liveness and readiness checks, mounted outside authentication.
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check))
}

/// The process is up. Does not touch the store.
async fn liveness_check() -> ApiResponse<Value> {
    ApiResponse::ok("API is live", json!({ "status": "live" }))
}

/// The store answers a ping.
async fn readiness_check(State(state): State<AppState>) -> ApiResponse<Value> {
    match state.store.ping().await {
        Ok(()) => ApiResponse::ok("API is ready", json!({ "status": "ready" })),
        Err(e) => {
            error!(error = %e, "readiness check failed");
            ApiResponse::error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Store unavailable",
                Some(json!({ "error": e.to_string() })),
            )
        }
    }
}
