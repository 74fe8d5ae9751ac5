//! API route handlers for the gateway.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::server::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "scout-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "cron_phase": state.orchestrator.phase().as_str(),
    }))
}

/// Daily cron trigger. Runs every phase once and reports the outcome.
///
/// The sweep runs on its own task, so a caller that disconnects or times
/// out does not cut it short. Phase-level failures become a 500 with the
/// error message; they never escape the handler.
pub async fn daily_cron(State(state): State<Arc<AppState>>) -> Response {
    let orchestrator = state.orchestrator.clone();
    let sweep = tokio::spawn(async move { orchestrator.run().await });

    let outcome = match sweep.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("[Daily Cron] Sweep task aborted: {e}");
            return failure_response(e.to_string());
        }
    };

    match outcome {
        Ok(report) => {
            tracing::debug!(
                "[Daily Cron] report: {}",
                serde_json::to_string(&report).unwrap_or_default()
            );
            Json(serde_json::json!({ "success": true })).into_response()
        }
        Err(failure) => {
            let error = if failure.message.is_empty() {
                failure.to_string()
            } else {
                failure.message
            };
            failure_response(error)
        }
    }
}

fn failure_response(error: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "success": false, "error": error })),
    )
        .into_response()
}
