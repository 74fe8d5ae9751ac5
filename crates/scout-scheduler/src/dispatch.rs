//! Internal dispatch — hands due items to their processing handlers.
//! Every call is an authenticated POST to `{base_url}/api/internal/{path}`
//! with the shared secret header; the path encodes the queue kind and ids.

use async_trait::async_trait;
use scout_core::{InternalConfig, Result, ScoutError};

use crate::items::{HibernationTarget, OwnerId, ScheduledChat};
use crate::traits::{InternalDispatcher, SandboxHibernator};

/// Header carrying the internal shared secret.
pub const SECRET_HEADER: &str = "X-Scout-Secret";

/// Client for the internal processing API.
#[derive(Clone)]
pub struct InternalClient {
    http: reqwest::Client,
    base_url: String,
    shared_secret: String,
    timeout: std::time::Duration,
}

impl InternalClient {
    pub fn new(config: &InternalConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            shared_secret: config.shared_secret.clone(),
            timeout: std::time::Duration::from_secs(config.timeout_secs),
        }
    }

    /// Full URL for a relative internal path. Absolute paths and URLs are refused.
    pub fn url_for(&self, path: &str) -> Result<String> {
        if path.starts_with('/') || path.starts_with("http") {
            return Err(ScoutError::InvalidPath(format!(
                "'{path}' must not start with / or http"
            )));
        }
        Ok(format!("{}/api/internal/{}", self.base_url, path))
    }

    /// POST to an internal path. A non-2xx answer is an error.
    pub async fn post(&self, path: &str, body: Option<serde_json::Value>) -> Result<()> {
        let url = self.url_for(path)?;
        tracing::debug!("internalPOST {path}");

        let resp = self
            .http
            .post(&url)
            .header(SECRET_HEADER, &self.shared_secret)
            .json(&body.unwrap_or_else(|| serde_json::json!({})))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ScoutError::Http(format!("POST {path}: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ScoutError::Dispatch {
                path: path.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

pub fn scheduled_task_path(chat: &ScheduledChat) -> String {
    format!(
        "process-scheduled-task/{}/{}/{}",
        chat.owner, chat.thread_id, chat.chat_id
    )
}

pub fn thread_queue_path(owner: &OwnerId) -> String {
    format!("process-thread-queue/{owner}")
}

pub fn hibernate_path(target: &HibernationTarget<'_>) -> String {
    format!(
        "hibernate-sandbox/{}/{}/{}",
        target.owner, target.thread_id, target.sandbox.sandbox_id
    )
}

#[async_trait]
impl InternalDispatcher for InternalClient {
    async fn process_scheduled_chat(&self, chat: &ScheduledChat) -> Result<()> {
        self.post(&scheduled_task_path(chat), None).await
    }

    async fn process_owner_queue(&self, owner: &OwnerId) -> Result<()> {
        self.post(&thread_queue_path(owner), None).await
    }
}

#[async_trait]
impl SandboxHibernator for InternalClient {
    async fn hibernate(&self, target: HibernationTarget<'_>) -> Result<()> {
        let body = serde_json::json!({ "sandboxProvider": target.sandbox.provider });
        self.post(&hibernate_path(&target), Some(body)).await
    }
}
