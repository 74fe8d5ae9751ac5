//! # Scout Core
//!
//! Configuration and the shared error type for the Scout cron workspace.
//! Everything here is plain data: config is loaded once at startup and passed
//! explicitly into the components that need it.

pub mod config;
pub mod error;

pub use config::{
    AnalyticsConfig, CronConfig, DatabaseConfig, DrainConfig, Environment, GatewayConfig,
    InternalConfig, RateLimitConfig, ScoutConfig,
};
pub use error::{Result, ScoutError};
