//! Analytics events — backlog counts per phase, sent to PostHog.
//! Supports: PostHog capture API, tracing-only fallback.

use std::sync::Arc;

use async_trait::async_trait;
use scout_core::{AnalyticsConfig, Result, ScoutError};
use serde::Serialize;

use crate::traits::EventSink;

/// Every sweep event is attributed to the system, not a user.
pub const SYSTEM_DISTINCT_ID: &str = "system";

/// A named event with the counts observed at that moment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub event: String,
    pub distinct_id: String,
    pub properties: serde_json::Value,
}

impl AnalyticsEvent {
    pub fn system(event: &str, properties: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            distinct_id: SYSTEM_DISTINCT_ID.to_string(),
            properties,
        }
    }

    pub fn stalled_sessions(count: usize) -> Self {
        Self::system(
            "cron_stalled_sessions",
            serde_json::json!({ "stalledSessionCount": count }),
        )
    }

    pub fn scheduled_tasks(count: usize) -> Self {
        Self::system(
            "cron_scheduled_tasks",
            serde_json::json!({ "dueThreadChatCount": count }),
        )
    }

    pub fn rate_limited_owners(count: usize) -> Self {
        Self::system(
            "cron_queue_processing",
            serde_json::json!({
                "usersWithRateLimitedThreads": count,
                "queueType": "other_rate_limit",
            }),
        )
    }

    pub fn concurrency_stuck_owners(count: usize) -> Self {
        Self::system(
            "cron_queue_stuck_users",
            serde_json::json!({
                "stuckUserCount": count,
                "queueType": "tasks_concurrency",
            }),
        )
    }

    pub fn automations(count: usize) -> Self {
        Self::system(
            "cron_automations",
            serde_json::json!({ "dueAutomationCount": count }),
        )
    }
}

/// PostHog capture API sink.
pub struct PostHogSink {
    client: reqwest::Client,
    api_key: String,
    capture_url: String,
}

impl PostHogSink {
    pub fn new(api_key: &str, host: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            capture_url: format!("{}/capture/", host.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl EventSink for PostHogSink {
    async fn capture(&self, event: AnalyticsEvent) -> Result<()> {
        let resp = self
            .client
            .post(&self.capture_url)
            .json(&serde_json::json!({
                "api_key": self.api_key,
                "event": event.event,
                "distinct_id": event.distinct_id,
                "properties": event.properties,
            }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| ScoutError::Analytics(format!("PostHog send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!("📊 PostHog event sent: {}", event.event);
            Ok(())
        } else {
            Err(ScoutError::Analytics(format!(
                "PostHog capture error {}",
                resp.status()
            )))
        }
    }
}

/// Writes events to the log only. Used when no analytics key is configured.
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn capture(&self, event: AnalyticsEvent) -> Result<()> {
        tracing::info!("📊 {} {}", event.event, event.properties);
        Ok(())
    }
}

/// Build the sink the config asks for.
pub fn sink_from_config(config: &AnalyticsConfig) -> Arc<dyn EventSink> {
    match &config.posthog_api_key {
        Some(key) if !key.is_empty() => Arc::new(PostHogSink::new(key, &config.posthog_host)),
        _ => Arc::new(LogSink),
    }
}
