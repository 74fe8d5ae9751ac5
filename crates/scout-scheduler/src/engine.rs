//! Cron orchestrator — runs the drain routines in a fixed sequence per trigger.
//!
//! ```text
//! Idle → RunningStalled → RunningScheduled → RunningQueued → RunningAutomations → Done
//!             └──────────────┴─────────────────┴──────────────────┴──→ Failed
//! ```
//!
//! A phase starts only after the previous phase's batches have all settled.
//! A failed run is not resumed: the next trigger starts over from
//! `RunningStalled` and re-derives every due set from current state.

use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::batch::DrainReport;
use crate::routines::{DrainRoutines, QueueReport};

/// Where the orchestrator is in its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    RunningStalled,
    RunningScheduled,
    RunningQueued,
    RunningAutomations,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::RunningStalled => "running-stalled",
            Phase::RunningScheduled => "running-scheduled",
            Phase::RunningQueued => "running-queued",
            Phase::RunningAutomations => "running-automations",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts for one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub stalled: DrainReport,
    pub scheduled: DrainReport,
    pub queued: QueueReport,
    pub automations: DrainReport,
    pub elapsed_ms: u64,
}

/// A phase-level error that ended the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{phase} failed: {message}")]
pub struct RunFailure {
    /// The phase that was running when the error surfaced.
    pub phase: Phase,
    pub message: String,
}

pub struct CronOrchestrator {
    routines: DrainRoutines,
    phase: Mutex<Phase>,
}

impl CronOrchestrator {
    pub fn new(routines: DrainRoutines) -> Self {
        Self {
            routines,
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// Phase of the current or most recent run.
    pub fn phase(&self) -> Phase {
        self.phase.lock().map(|p| *p).unwrap_or(Phase::Failed)
    }

    /// Move this run to `next` and mirror it into the shared phase that
    /// `/health` reads. Overlapping runs only ever race on the mirror.
    fn enter(&self, current: &mut Phase, next: Phase) {
        tracing::debug!("[Daily Cron] {} → {}", *current, next);
        *current = next;
        if let Ok(mut phase) = self.phase.lock() {
            *phase = next;
        }
    }

    /// Run all four phases once.
    pub async fn run(&self) -> Result<RunReport, RunFailure> {
        tracing::info!("[Daily Cron] Daily cron task triggered");
        let started = Instant::now();
        let mut report = RunReport::default();
        let mut current = Phase::Idle;

        match self.run_phases(&mut current, &mut report).await {
            Ok(()) => {
                self.enter(&mut current, Phase::Done);
                report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(
                    "[Daily Cron] Daily cron task completed in {}ms",
                    report.elapsed_ms
                );
                Ok(report)
            }
            Err(e) => {
                let phase = current;
                self.enter(&mut current, Phase::Failed);
                tracing::error!("[Daily Cron] Error in daily cron task ({phase}): {e}");
                Err(RunFailure {
                    phase,
                    message: e.to_string(),
                })
            }
        }
    }

    async fn run_phases(
        &self,
        current: &mut Phase,
        report: &mut RunReport,
    ) -> scout_core::Result<()> {
        self.enter(current, Phase::RunningStalled);
        report.stalled = self.routines.reap_stalled_sessions().await?;

        self.enter(current, Phase::RunningScheduled);
        report.scheduled = self.routines.run_scheduled_tasks().await?;

        self.enter(current, Phase::RunningQueued);
        report.queued = self.routines.drain_queues().await?;

        self.enter(current, Phase::RunningAutomations);
        report.automations = self.routines.run_automations().await?;
        Ok(())
    }
}
