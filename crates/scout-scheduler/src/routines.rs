//! Queue drain routines — one due-item query plus one Batch Runner per queue kind.
//!
//! Each routine snapshots its due items once, emits a backlog event when the
//! snapshot is non-empty, and drains the snapshot. Query failures propagate
//! to the orchestrator; per-item failures stay inside the runner.

use std::sync::Arc;

use scout_core::{DrainConfig, Result};
use serde::Serialize;

use crate::analytics::AnalyticsEvent;
use crate::batch::{BatchRunner, DrainReport, FailurePolicy, Outcome};
use crate::items::{
    DueAutomation, LimitedResource, OwnerId, RunSource, ScheduledChat, StalledSession,
};
use crate::traits::{
    AutomationExecutor, DueItemSource, EventSink, InternalDispatcher, RateLimiter,
    SandboxHibernator,
};

/// Everything the routines talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn DueItemSource>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub hibernator: Arc<dyn SandboxHibernator>,
    pub dispatcher: Arc<dyn InternalDispatcher>,
    pub automations: Arc<dyn AutomationExecutor>,
    pub events: Arc<dyn EventSink>,
}

/// Both halves of the queue phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueReport {
    pub rate_limited: DrainReport,
    pub concurrency_stuck: DrainReport,
}

pub struct DrainRoutines {
    deps: Collaborators,
    drain: DrainConfig,
}

impl DrainRoutines {
    pub fn new(deps: Collaborators, drain: DrainConfig) -> Self {
        Self { deps, drain }
    }

    fn runner(&self, label: &'static str, width: usize) -> BatchRunner {
        BatchRunner::new(label, width, self.drain.inter_batch_delay())
    }

    /// Send an event. A failing sink is logged and otherwise ignored.
    async fn emit(&self, event: AnalyticsEvent) {
        let name = event.event.clone();
        if let Err(e) = self.deps.events.capture(event).await {
            tracing::warn!("[Daily Cron] Failed to emit {name}: {e}");
        }
    }

    // ─── Stalled sessions ─────────────────────────────────────

    /// Stop every stalled session in one write, then hibernate their sandboxes.
    ///
    /// An empty snapshot returns before the write. Hibernation errors are
    /// counted only: the stop already happened.
    pub async fn reap_stalled_sessions(&self) -> Result<DrainReport> {
        tracing::info!("[Daily Cron] Processing stalled threads");
        let stalled = self.deps.source.stalled_sessions().await?;
        tracing::info!("[Daily Cron] Found {} stalled threads", stalled.len());
        if stalled.is_empty() {
            return Ok(DrainReport::default());
        }
        self.emit(AnalyticsEvent::stalled_sessions(stalled.len()))
            .await;

        let ids: Vec<String> = stalled.iter().map(|s| s.thread_id.clone()).collect();
        self.deps.source.stop_sessions(&ids).await?;

        tracing::info!("[Daily Cron] Hibernating sandboxes");
        let hibernator = self.deps.hibernator.as_ref();
        let report = self
            .runner("Hibernation", self.drain.stalled_batch_width)
            .with_policy(FailurePolicy::CountOnly)
            .drain(&stalled, move |session| hibernate_one(hibernator, session))
            .await;
        Ok(report)
    }

    // ─── Scheduled tasks ──────────────────────────────────────

    pub async fn run_scheduled_tasks(&self) -> Result<DrainReport> {
        tracing::info!("[Daily Cron] Processing scheduled tasks");
        let due = self.deps.source.scheduled_chats_due().await?;
        tracing::info!("[Daily Cron] Found {} thread chats due to run", due.len());
        if !due.is_empty() {
            self.emit(AnalyticsEvent::scheduled_tasks(due.len())).await;
        }

        let dispatcher = self.deps.dispatcher.as_ref();
        let report = self
            .runner("Scheduled tasks", self.drain.scheduled_batch_width)
            .drain(&due, move |chat| dispatch_chat(dispatcher, chat))
            .await;
        Ok(report)
    }

    // ─── Owner queues ─────────────────────────────────────────

    /// Rate-limited owners first, then concurrency-stuck owners.
    pub async fn drain_queues(&self) -> Result<QueueReport> {
        tracing::info!("[Daily Cron] Processing queued tasks");
        let rate_limited = self.drain_rate_limited().await?;
        let concurrency_stuck = self.drain_concurrency_stuck().await?;
        Ok(QueueReport {
            rate_limited,
            concurrency_stuck,
        })
    }

    /// One dispatch per owner with quota left. Owners at zero are skipped.
    pub async fn drain_rate_limited(&self) -> Result<DrainReport> {
        let owners = self.deps.source.rate_limited_owners().await?;
        tracing::info!(
            "[Daily Cron] Found {} users with rate-limited threads",
            owners.len()
        );
        if !owners.is_empty() {
            self.emit(AnalyticsEvent::rate_limited_owners(owners.len()))
                .await;
        }

        let limiter = self.deps.rate_limiter.as_ref();
        let dispatcher = self.deps.dispatcher.as_ref();
        let report = self
            .runner("Rate-limited queues", self.drain.queue_batch_width)
            .drain(&owners, move |owner| {
                dispatch_owner_with_quota(limiter, dispatcher, owner)
            })
            .await;
        Ok(report)
    }

    /// One dispatch per owner, no quota check.
    pub async fn drain_concurrency_stuck(&self) -> Result<DrainReport> {
        let owners = self.deps.source.concurrency_stuck_owners().await?;
        tracing::info!(
            "[Daily Cron] Found {} users with stuck threads",
            owners.len()
        );
        if !owners.is_empty() {
            self.emit(AnalyticsEvent::concurrency_stuck_owners(owners.len()))
                .await;
        }

        let dispatcher = self.deps.dispatcher.as_ref();
        let report = self
            .runner("Stuck queues", self.drain.queue_batch_width)
            .drain(&owners, move |owner| dispatch_owner(dispatcher, owner))
            .await;
        Ok(report)
    }

    // ─── Automations ──────────────────────────────────────────

    pub async fn run_automations(&self) -> Result<DrainReport> {
        tracing::info!("[Daily Cron] Processing automations");
        let due = self.deps.source.automations_due().await?;
        tracing::info!("[Daily Cron] Found {} automations due to run", due.len());
        if !due.is_empty() {
            self.emit(AnalyticsEvent::automations(due.len())).await;
        }

        let executor = self.deps.automations.as_ref();
        let report = self
            .runner("Automations", self.drain.automation_batch_width)
            .drain(&due, move |automation| run_automation(executor, automation))
            .await;
        Ok(report)
    }
}

// ─── Per-item dispatch ────────────────────────────────────────

async fn hibernate_one(
    hibernator: &dyn SandboxHibernator,
    session: &StalledSession,
) -> Result<Outcome> {
    let Some(target) = session.hibernation_target() else {
        return Ok(Outcome::Skipped);
    };
    hibernator.hibernate(target).await?;
    Ok(Outcome::Dispatched)
}

async fn dispatch_chat(dispatcher: &dyn InternalDispatcher, chat: &ScheduledChat) -> Result<Outcome> {
    dispatcher.process_scheduled_chat(chat).await?;
    Ok(Outcome::Dispatched)
}

async fn dispatch_owner_with_quota(
    limiter: &dyn RateLimiter,
    dispatcher: &dyn InternalDispatcher,
    owner: &OwnerId,
) -> Result<Outcome> {
    let quota = limiter
        .remaining(LimitedResource::SandboxCreation, owner)
        .await?;
    if quota.is_exhausted() {
        tracing::debug!("[Daily Cron] {owner} has no sandbox quota left, skipping");
        return Ok(Outcome::Skipped);
    }
    dispatch_owner(dispatcher, owner).await
}

async fn dispatch_owner(dispatcher: &dyn InternalDispatcher, owner: &OwnerId) -> Result<Outcome> {
    dispatcher.process_owner_queue(owner).await?;
    Ok(Outcome::Dispatched)
}

async fn run_automation(
    executor: &dyn AutomationExecutor,
    automation: &DueAutomation,
) -> Result<Outcome> {
    executor
        .run_automation(automation, RunSource::Automated)
        .await?;
    Ok(Outcome::Dispatched)
}
