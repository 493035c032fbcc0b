use axum::{extract::State, http::StatusCode, Json};
use tracing::warn;

use crate::app_state::AppState;
use crate::models::{ApiResponse, HealthResponse};

/// Reports store connectivity and whether the header window can sign.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let database = match state.oracle.ping_store().await {
        Ok(()) => "up",
        Err(err) => {
            warn!(error = %err, "health check: store unreachable");
            "down"
        }
    };
    let headers = match state.tracker.recent_sig_hash().await {
        Ok(_) => "ready",
        Err(_) => "syncing",
    };

    let healthy = database == "up" && headers == "ready";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ApiResponse::ok(HealthResponse {
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            database: database.to_string(),
            headers: headers.to_string(),
        })),
    )
}
