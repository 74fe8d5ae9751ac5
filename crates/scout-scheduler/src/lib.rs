//! # Scout Scheduler
//!
//! Periodic work-queue drainer. One trigger sweeps every persistent queue
//! once and hands each due item to its processing handler, a bounded window
//! at a time.
//!
//! ## Architecture
//! ```text
//! CronOrchestrator (one run per trigger, phases in sequence)
//!   ├── Stalled sessions   → stop all → BatchRunner(10) → hibernate (count only)
//!   ├── Scheduled chats    → BatchRunner(5)  → POST process-scheduled-task/{owner}/{thread}/{chat}
//!   ├── Owner queues
//!   │     ├── rate-limited → BatchRunner(10) → quota? → POST process-thread-queue/{owner}
//!   │     └── stuck        → BatchRunner(10) → POST process-thread-queue/{owner}
//!   └── Automations        → BatchRunner(5)  → run_automation(source = automated)
//!
//! Collaborators (traits)
//!   ├── DueItemSource / RateLimiter / AutomationExecutor ← SchedulerDb (SQLite)
//!   ├── InternalDispatcher / SandboxHibernator          ← InternalClient (reqwest)
//!   └── EventSink                                       ← PostHogSink | LogSink
//! ```

pub mod analytics;
pub mod batch;
pub mod cron;
pub mod dispatch;
pub mod engine;
pub mod items;
pub mod persistence;
pub mod routines;
pub mod traits;

#[cfg(test)]
mod testing;

pub use analytics::{AnalyticsEvent, LogSink, PostHogSink, sink_from_config};
pub use batch::{BatchRunner, DrainReport, FailurePolicy, Outcome};
pub use dispatch::InternalClient;
pub use engine::{CronOrchestrator, Phase, RunFailure, RunReport};
pub use items::{DueAutomation, OwnerId, RunSource, ScheduledChat, StalledSession};
pub use persistence::SchedulerDb;
pub use routines::{Collaborators, DrainRoutines, QueueReport};
