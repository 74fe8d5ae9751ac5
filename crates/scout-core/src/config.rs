//! Scout cron configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ScoutError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoutConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub internal: InternalConfig,
    #[serde(default)]
    pub drain: DrainConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl ScoutConfig {
    /// Resolve the config path: explicit path, then `SCOUT_CONFIG`, then the default.
    /// A missing file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("SCOUT_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(Self::default_path);
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        config.drain.validate()?;
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScoutError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ScoutError::Config(format!("Failed to parse config: {e}")))
    }

    /// Secrets are usually injected by the platform, not written to disk.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("CRON_SECRET") {
            self.cron.secret = secret;
        }
        if let Ok(secret) = std::env::var("INTERNAL_SHARED_SECRET") {
            self.internal.shared_secret = secret;
        }
        if let Ok(key) = std::env::var("POSTHOG_API_KEY")
            && !key.is_empty()
        {
            self.analytics.posthog_api_key = Some(key);
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Scout home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".scout")
    }
}

/// Execution mode. Only production enforces the trigger secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn requires_trigger_auth(self) -> bool {
        match self {
            Environment::Production => true,
            Environment::Development => false,
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Trigger endpoint auth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronConfig {
    /// Expected `Authorization: Bearer <secret>` value.
    #[serde(default)]
    pub secret: String,
}

/// Internal API used to hand items to their processing handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalConfig {
    #[serde(default = "default_internal_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub shared_secret: String,
    #[serde(default = "default_internal_timeout")]
    pub timeout_secs: u64,
}

fn default_internal_base_url() -> String { "http://127.0.0.1:3000".into() }
fn default_internal_timeout() -> u64 { 30 }

impl Default for InternalConfig {
    fn default() -> Self {
        Self {
            base_url: default_internal_base_url(),
            shared_secret: String::new(),
            timeout_secs: default_internal_timeout(),
        }
    }
}

/// Batch widths and pacing for the drain routines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainConfig {
    #[serde(default = "default_inter_batch_delay")]
    pub inter_batch_delay_ms: u64,
    #[serde(default = "default_wide_batch")]
    pub stalled_batch_width: usize,
    #[serde(default = "default_narrow_batch")]
    pub scheduled_batch_width: usize,
    #[serde(default = "default_wide_batch")]
    pub queue_batch_width: usize,
    #[serde(default = "default_narrow_batch")]
    pub automation_batch_width: usize,
}

fn default_inter_batch_delay() -> u64 { 1000 }
fn default_wide_batch() -> usize { 10 }
fn default_narrow_batch() -> usize { 5 }

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            inter_batch_delay_ms: default_inter_batch_delay(),
            stalled_batch_width: default_wide_batch(),
            scheduled_batch_width: default_narrow_batch(),
            queue_batch_width: default_wide_batch(),
            automation_batch_width: default_narrow_batch(),
        }
    }
}

impl DrainConfig {
    pub fn inter_batch_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.inter_batch_delay_ms)
    }

    /// Every batch width must be at least 1.
    pub fn validate(&self) -> Result<()> {
        let widths = [
            ("stalled_batch_width", self.stalled_batch_width),
            ("scheduled_batch_width", self.scheduled_batch_width),
            ("queue_batch_width", self.queue_batch_width),
            ("automation_batch_width", self.automation_batch_width),
        ];
        for (name, width) in widths {
            if width == 0 {
                return Err(ScoutError::Config(format!("drain.{name} must be >= 1")));
            }
        }
        Ok(())
    }
}

/// SQLite due-item store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Active sessions idle for longer than this are considered stalled.
    #[serde(default = "default_stalled_after")]
    pub stalled_after_secs: u64,
}

fn default_db_path() -> String { "~/.scout/scout.db".into() }
fn default_stalled_after() -> u64 { 86_400 }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            stalled_after_secs: default_stalled_after(),
        }
    }
}

impl DatabaseConfig {
    pub fn expanded_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// Sandbox creation quota, read by the rate-limited queue drain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_sandbox_creation_max")]
    pub sandbox_creation_max: u64,
    #[serde(default = "default_sandbox_creation_window")]
    pub sandbox_creation_window_secs: u64,
}

fn default_sandbox_creation_max() -> u64 { 10 }
fn default_sandbox_creation_window() -> u64 { 3600 }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sandbox_creation_max: default_sandbox_creation_max(),
            sandbox_creation_window_secs: default_sandbox_creation_window(),
        }
    }
}

/// Product analytics sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub posthog_api_key: Option<String>,
    #[serde(default = "default_posthog_host")]
    pub posthog_host: String,
}

fn default_posthog_host() -> String { "https://us.i.posthog.com".into() }

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            posthog_api_key: None,
            posthog_host: default_posthog_host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScoutConfig::default();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.drain.inter_batch_delay_ms, 1000);
        assert_eq!(config.drain.stalled_batch_width, 10);
        assert_eq!(config.drain.scheduled_batch_width, 5);
        assert_eq!(config.drain.queue_batch_width, 10);
        assert_eq!(config.drain.automation_batch_width, 5);
        assert!(config.analytics.posthog_api_key.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            environment = "development"

            [gateway]
            port = 8080

            [drain]
            inter_batch_delay_ms = 250
            scheduled_batch_width = 3

            [internal]
            base_url = "https://app.example.com"
        "#;

        let config = ScoutConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.drain.inter_batch_delay_ms, 250);
        assert_eq!(config.drain.scheduled_batch_width, 3);
        assert_eq!(config.drain.automation_batch_width, 5);
        assert_eq!(config.internal.base_url, "https://app.example.com");
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config = ScoutConfig::from_toml("").unwrap();
        assert_eq!(config.database.stalled_after_secs, 86_400);
        assert_eq!(config.rate_limit.sandbox_creation_max, 10);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ScoutConfig::from_toml("environment = 3").unwrap_err();
        assert!(matches!(err, ScoutError::Config(_)));
    }

    #[test]
    fn test_zero_width_rejected() {
        let drain = DrainConfig {
            queue_batch_width: 0,
            ..Default::default()
        };
        let err = drain.validate().unwrap_err();
        assert!(err.to_string().contains("queue_batch_width"));
    }

    #[test]
    fn test_only_production_requires_auth() {
        assert!(Environment::Production.requires_trigger_auth());
        assert!(!Environment::Development.requires_trigger_auth());
    }

    #[test]
    fn test_home_dir() {
        let home = ScoutConfig::home_dir();
        assert!(home.to_string_lossy().contains(".scout"));
    }
}
