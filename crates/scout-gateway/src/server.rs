//! HTTP server implementation using Axum.

use axum::{Router, extract::State, response::IntoResponse, routing::get};
use scout_core::{Environment, GatewayConfig};
use scout_scheduler::CronOrchestrator;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub environment: Environment,
    /// Expected bearer token for the cron trigger.
    pub cron_secret: String,
    pub orchestrator: Arc<CronOrchestrator>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        environment: Environment,
        cron_secret: String,
        orchestrator: Arc<CronOrchestrator>,
    ) -> Self {
        Self {
            environment,
            cron_secret,
            orchestrator,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Compare `Authorization` against `Bearer <secret>` by SHA-256 digest.
/// An empty secret matches nothing.
fn bearer_matches(header: Option<&str>, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let expected = Sha256::digest(format!("Bearer {secret}").as_bytes());
    let provided = Sha256::digest(header.unwrap_or("").as_bytes());
    expected == provided
}

/// Cron secret middleware. Only enforced in production.
async fn require_cron_secret(
    State(state): State<Arc<AppState>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    if !state.environment.requires_trigger_auth() {
        return next.run(req).await;
    }

    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if bearer_matches(header, &state.cron_secret) {
        return next.run(req).await;
    }

    tracing::warn!("[Daily Cron] Rejected trigger with missing or invalid secret");
    (axum::http::StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    let protected = Router::new()
        .route("/api/internal/cron/daily", get(super::routes::daily_cron))
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_cron_secret,
        ));

    let public = Router::new().route("/health", get(super::routes::health_check));

    protected
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn start(config: &GatewayConfig, state: AppState) -> anyhow::Result<()> {
    if state.environment.requires_trigger_auth() && state.cron_secret.is_empty() {
        tracing::warn!("⚠️ CRON_SECRET is empty: every trigger will be rejected");
    }

    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
