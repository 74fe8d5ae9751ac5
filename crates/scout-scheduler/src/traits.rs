//! Collaborator seams. The sweep reads due state and hands items off through
//! these traits; it never owns the state or the processing itself.

use async_trait::async_trait;
use scout_core::Result;

use crate::analytics::AnalyticsEvent;
use crate::items::{
    DueAutomation, HibernationTarget, LimitedResource, OwnerId, Quota, RunSource, ScheduledChat,
    StalledSession,
};

/// Persistent storage answering "what is due now" per queue kind.
///
/// Each query is evaluated once at the start of a routine; items that become
/// due while the routine runs wait for the next trigger.
#[async_trait]
pub trait DueItemSource: Send + Sync {
    /// Active sessions whose last activity exceeds the staleness threshold.
    async fn stalled_sessions(&self) -> Result<Vec<StalledSession>>;

    /// Move every listed session to the terminal stopped state in one write.
    async fn stop_sessions(&self, thread_ids: &[String]) -> Result<()>;

    /// Thread chats whose scheduled run time has arrived.
    async fn scheduled_chats_due(&self) -> Result<Vec<ScheduledChat>>;

    /// Owners with at least one item blocked purely on a rate limit.
    async fn rate_limited_owners(&self) -> Result<Vec<OwnerId>>;

    /// Owners with items blocked purely on a concurrency ceiling.
    async fn concurrency_stuck_owners(&self) -> Result<Vec<OwnerId>>;

    /// Automations whose schedule has become due.
    async fn automations_due(&self) -> Result<Vec<DueAutomation>>;
}

/// Read-only quota lookup. Consumption happens inside the dispatched handler.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn remaining(&self, resource: LimitedResource, owner: &OwnerId) -> Result<Quota>;
}

#[async_trait]
pub trait SandboxHibernator: Send + Sync {
    async fn hibernate(&self, target: HibernationTarget<'_>) -> Result<()>;
}

/// Remote processing handlers reached over the internal API.
#[async_trait]
pub trait InternalDispatcher: Send + Sync {
    async fn process_scheduled_chat(&self, chat: &ScheduledChat) -> Result<()>;

    /// One call per owner; the handler drains as many of the owner's items as
    /// its current quota allows.
    async fn process_owner_queue(&self, owner: &OwnerId) -> Result<()>;
}

/// In-process automation entry point.
#[async_trait]
pub trait AutomationExecutor: Send + Sync {
    async fn run_automation(&self, automation: &DueAutomation, source: RunSource) -> Result<()>;
}

/// External analytics sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn capture(&self, event: AnalyticsEvent) -> Result<()>;
}
