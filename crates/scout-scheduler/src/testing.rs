//! In-memory collaborators for routine and orchestrator tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scout_core::{Result, ScoutError};

use crate::analytics::AnalyticsEvent;
use crate::items::{
    DueAutomation, HibernationTarget, LimitedResource, OwnerId, Quota, RunSource, ScheduledChat,
    StalledSession,
};
use crate::routines::Collaborators;
use crate::traits::{
    AutomationExecutor, DueItemSource, EventSink, InternalDispatcher, RateLimiter,
    SandboxHibernator,
};

const DEFAULT_QUOTA: u64 = 10;

/// One fake standing in for every collaborator; records each side effect
/// in call order.
#[derive(Default)]
pub struct FakeWorld {
    pub stalled: Vec<StalledSession>,
    pub scheduled: Vec<ScheduledChat>,
    pub rate_limited: Vec<OwnerId>,
    pub concurrency_stuck: Vec<OwnerId>,
    pub automations: Vec<DueAutomation>,
    /// Owner id to remaining quota; unlisted owners get the default.
    pub quotas: Vec<(String, u64)>,
    /// Thread ids whose hibernation fails.
    pub failing_hibernations: Vec<String>,
    pub failing_events: bool,
    /// Name of the query that fails: stalled, scheduled, rate_limited,
    /// concurrency_stuck, or automations.
    pub failing_query: Option<&'static str>,
    /// How long each scheduled-chat dispatch takes.
    pub scheduled_delay: Option<Duration>,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) captured: Mutex<Vec<AnalyticsEvent>>,
    pub(crate) stopped: Mutex<Vec<String>>,
}

impl FakeWorld {
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            source: self.clone(),
            rate_limiter: self.clone(),
            hibernator: self.clone(),
            dispatcher: self.clone(),
            automations: self.clone(),
            events: self.clone(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.captured.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn query<T: Clone>(&self, name: &str, items: &[T]) -> Result<Vec<T>> {
        if self.failing_query == Some(name) {
            return Err(ScoutError::Database(format!("{name} query failed")));
        }
        Ok(items.to_vec())
    }
}

#[async_trait]
impl DueItemSource for FakeWorld {
    async fn stalled_sessions(&self) -> Result<Vec<StalledSession>> {
        self.query("stalled", &self.stalled)
    }

    async fn stop_sessions(&self, thread_ids: &[String]) -> Result<()> {
        self.record(format!("stop:{}", thread_ids.join(",")));
        self.stopped.lock().unwrap().extend(thread_ids.iter().cloned());
        Ok(())
    }

    async fn scheduled_chats_due(&self) -> Result<Vec<ScheduledChat>> {
        self.query("scheduled", &self.scheduled)
    }

    async fn rate_limited_owners(&self) -> Result<Vec<OwnerId>> {
        self.query("rate_limited", &self.rate_limited)
    }

    async fn concurrency_stuck_owners(&self) -> Result<Vec<OwnerId>> {
        self.query("concurrency_stuck", &self.concurrency_stuck)
    }

    async fn automations_due(&self) -> Result<Vec<DueAutomation>> {
        self.query("automations", &self.automations)
    }
}

#[async_trait]
impl RateLimiter for FakeWorld {
    async fn remaining(&self, _resource: LimitedResource, owner: &OwnerId) -> Result<Quota> {
        self.record(format!("quota:{owner}"));
        let remaining = self
            .quotas
            .iter()
            .find(|(id, _)| id == owner.as_str())
            .map_or(DEFAULT_QUOTA, |(_, q)| *q);
        Ok(Quota { remaining })
    }
}

#[async_trait]
impl SandboxHibernator for FakeWorld {
    async fn hibernate(&self, target: HibernationTarget<'_>) -> Result<()> {
        self.record(format!(
            "hibernate:{}/{}",
            target.thread_id, target.sandbox.sandbox_id
        ));
        if self.failing_hibernations.iter().any(|t| t == target.thread_id) {
            return Err(ScoutError::Other(format!("{} hibernation failed", target.thread_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl InternalDispatcher for FakeWorld {
    async fn process_scheduled_chat(&self, chat: &ScheduledChat) -> Result<()> {
        self.record(format!(
            "scheduled:{}/{}/{}",
            chat.owner, chat.thread_id, chat.chat_id
        ));
        if let Some(delay) = self.scheduled_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn process_owner_queue(&self, owner: &OwnerId) -> Result<()> {
        self.record(format!("queue:{owner}"));
        Ok(())
    }
}

#[async_trait]
impl AutomationExecutor for FakeWorld {
    async fn run_automation(&self, automation: &DueAutomation, source: RunSource) -> Result<()> {
        self.record(format!(
            "automation:{}:{}",
            automation.automation_id,
            source.as_str()
        ));
        Ok(())
    }
}

#[async_trait]
impl EventSink for FakeWorld {
    async fn capture(&self, event: AnalyticsEvent) -> Result<()> {
        if self.failing_events {
            return Err(ScoutError::Analytics("sink down".into()));
        }
        self.captured.lock().unwrap().push(event);
        Ok(())
    }
}
