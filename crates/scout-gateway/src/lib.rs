//! # Scout Gateway
//!
//! Axum server exposing the daily cron trigger.
//!
//! ```text
//! GET /api/internal/cron/daily ── require_cron_secret ──→ CronOrchestrator::run()
//! GET /health
//! ```

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
