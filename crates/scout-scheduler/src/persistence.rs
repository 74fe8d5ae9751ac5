//! SQLite-backed due-item store.
//!
//! Holds the rows the sweep reads (threads, thread chats, automations) and
//! the sandbox-creation log the rate limiter counts over. Implements
//! [`DueItemSource`], [`RateLimiter`], and [`AutomationExecutor`] so a single
//! database file can back a whole sweep.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use scout_core::{RateLimitConfig, Result, ScoutError};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::cron::next_run_from_cron;
use crate::items::{
    DueAutomation, LimitedResource, OwnerId, Quota, RunSource, SandboxProvider, SandboxRef,
    ScheduledChat, StalledSession,
};
use crate::traits::{AutomationExecutor, DueItemSource, RateLimiter};

/// Thread statuses that count as active for the stalled query.
pub const ACTIVE_STATUSES: [&str; 2] = ["booting", "working"];
pub const STATUS_STOPPED: &str = "stopped";
pub const STATUS_SCHEDULED: &str = "scheduled";
/// Chat is waiting only on the sandbox-creation rate limit.
pub const STATUS_QUEUED_RATE_LIMIT: &str = "queued-sandbox-creation-rate-limit";
/// Chat is waiting only on the per-owner task concurrency ceiling.
pub const STATUS_QUEUED_CONCURRENCY: &str = "queued-tasks-concurrency";

/// Persisted bookkeeping for one automation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationState {
    pub run_count: u32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// SQLite store for everything the sweep reads.
pub struct SchedulerDb {
    conn: Mutex<Connection>,
    stalled_after: Duration,
    rate_limit: RateLimitConfig,
}

impl SchedulerDb {
    /// Open or create the database, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db("DB open"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            stalled_after: Duration::days(1),
            rate_limit: RateLimitConfig::default(),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Sessions idle longer than this are stalled.
    pub fn with_stalled_after(mut self, secs: u64) -> Self {
        self.stalled_after = Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX));
        self
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ScoutError::Database(format!("Lock: {e}")))
    }

    /// Create tables. Safe to run on every open.
    pub fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                codesandbox_id TEXT,
                sandbox_provider TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_threads_status ON threads(status, updated_at);

            CREATE TABLE IF NOT EXISTS thread_chats (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                scheduled_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_thread_chats_status ON thread_chats(status);

            CREATE TABLE IF NOT EXISTS automations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                cron_expression TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                next_run_at TEXT,
                last_run_at TEXT,
                run_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS automation_runs (
                id TEXT PRIMARY KEY,
                automation_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sandbox_creations (
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sandbox_creations_user
                ON sandbox_creations(user_id, created_at);
         ",
            )
            .map_err(db("Migration"))
    }

    // ─── Seeding ──────────────────────────────────────────────

    pub fn insert_thread(
        &self,
        id: &str,
        owner: &OwnerId,
        status: &str,
        sandbox: Option<&SandboxRef>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO threads
                 (id, user_id, status, codesandbox_id, sandbox_provider, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    owner.as_str(),
                    status,
                    sandbox.map(|s| s.sandbox_id.as_str()),
                    sandbox.map(|s| s.provider.as_str()),
                    ts(updated_at),
                ],
            )
            .map_err(db("Insert thread"))?;
        Ok(())
    }

    pub fn insert_thread_chat(
        &self,
        id: &str,
        thread_id: &str,
        owner: &OwnerId,
        status: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO thread_chats (id, thread_id, user_id, status, scheduled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, thread_id, owner.as_str(), status, scheduled_at.map(ts)],
            )
            .map_err(db("Insert thread chat"))?;
        Ok(())
    }

    pub fn insert_automation(
        &self,
        id: &str,
        owner: &OwnerId,
        name: &str,
        cron_expression: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO automations
                 (id, user_id, name, cron_expression, enabled, next_run_at, run_count)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, 0)",
                params![id, owner.as_str(), name, cron_expression, next_run_at.map(ts)],
            )
            .map_err(db("Insert automation"))?;
        Ok(())
    }

    pub fn set_automation_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE automations SET enabled = ?1 WHERE id = ?2",
                params![enabled as i32, id],
            )
            .map_err(db("Update automation"))?;
        Ok(())
    }

    pub fn record_sandbox_creation(&self, owner: &OwnerId, at: DateTime<Utc>) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO sandbox_creations (user_id, created_at) VALUES (?1, ?2)",
                params![owner.as_str(), ts(at)],
            )
            .map_err(db("Record sandbox creation"))?;
        Ok(())
    }

    // ─── Inspection ───────────────────────────────────────────

    pub fn thread_status(&self, id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT status FROM threads WHERE id = ?1")
            .map_err(db("Thread status"))?;
        let mut rows = stmt
            .query_map([id], |row| row.get::<_, String>(0))
            .map_err(db("Thread status"))?;
        rows.next().transpose().map_err(db("Thread status"))
    }

    pub fn automation_state(&self, id: &str) -> Result<Option<AutomationState>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT run_count, last_run_at, next_run_at FROM automations WHERE id = ?1")
            .map_err(db("Automation state"))?;
        let mut rows = stmt
            .query_map([id], |row| {
                Ok(AutomationState {
                    run_count: row.get(0)?,
                    last_run_at: row.get::<_, Option<String>>(1)?.as_deref().and_then(parse_ts),
                    next_run_at: row.get::<_, Option<String>>(2)?.as_deref().and_then(parse_ts),
                })
            })
            .map_err(db("Automation state"))?;
        rows.next().transpose().map_err(db("Automation state"))
    }

    /// Run sources recorded for an automation, oldest first.
    pub fn automation_run_sources(&self, automation_id: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT source FROM automation_runs WHERE automation_id = ?1
                 ORDER BY created_at, rowid",
            )
            .map_err(db("Automation runs"))?;
        let rows = stmt
            .query_map([automation_id], |row| row.get::<_, String>(0))
            .map_err(db("Automation runs"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db("Automation runs"))
    }

    fn owners_with_chat_status(&self, status: &str) -> Result<Vec<OwnerId>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT user_id FROM thread_chats WHERE status = ?1 ORDER BY user_id")
            .map_err(db("Queued owners"))?;
        let rows = stmt
            .query_map([status], |row| Ok(OwnerId(row.get(0)?)))
            .map_err(db("Queued owners"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db("Queued owners"))
    }
}

#[async_trait]
impl DueItemSource for SchedulerDb {
    async fn stalled_sessions(&self) -> Result<Vec<StalledSession>> {
        let cutoff = ts(Utc::now() - self.stalled_after);
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, codesandbox_id, sandbox_provider FROM threads
                 WHERE status IN (?1, ?2) AND updated_at < ?3
                 ORDER BY updated_at",
            )
            .map_err(db("Stalled query"))?;
        let rows = stmt
            .query_map(
                params![ACTIVE_STATUSES[0], ACTIVE_STATUSES[1], cutoff],
                |row| {
                    let sandbox_id: Option<String> = row.get(2)?;
                    let provider: Option<String> = row.get(3)?;
                    Ok(StalledSession {
                        thread_id: row.get(0)?,
                        owner: OwnerId(row.get(1)?),
                        sandbox: sandbox_id.map(|sandbox_id| SandboxRef {
                            sandbox_id,
                            // Rows written before multi-provider support carry no provider.
                            provider: provider
                                .as_deref()
                                .and_then(SandboxProvider::parse)
                                .unwrap_or(SandboxProvider::E2b),
                        }),
                    })
                },
            )
            .map_err(db("Stalled query"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db("Stalled query"))
    }

    async fn stop_sessions(&self, thread_ids: &[String]) -> Result<()> {
        if thread_ids.is_empty() {
            return Ok(());
        }
        let now = ts(Utc::now());
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db("Stop sessions"))?;
        {
            let mut stmt = tx
                .prepare("UPDATE threads SET status = ?1, updated_at = ?2 WHERE id = ?3")
                .map_err(db("Stop sessions"))?;
            for id in thread_ids {
                stmt.execute(params![STATUS_STOPPED, now, id])
                    .map_err(db("Stop sessions"))?;
            }
        }
        tx.commit().map_err(db("Stop sessions"))?;
        tracing::info!("⏹️ Stopped {} stalled sessions", thread_ids.len());
        Ok(())
    }

    async fn scheduled_chats_due(&self) -> Result<Vec<ScheduledChat>> {
        let now = ts(Utc::now());
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, thread_id, user_id FROM thread_chats
                 WHERE status = ?1 AND scheduled_at IS NOT NULL AND scheduled_at <= ?2
                 ORDER BY scheduled_at",
            )
            .map_err(db("Scheduled query"))?;
        let rows = stmt
            .query_map(params![STATUS_SCHEDULED, now], |row| {
                Ok(ScheduledChat {
                    chat_id: row.get(0)?,
                    thread_id: row.get(1)?,
                    owner: OwnerId(row.get(2)?),
                })
            })
            .map_err(db("Scheduled query"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db("Scheduled query"))
    }

    async fn rate_limited_owners(&self) -> Result<Vec<OwnerId>> {
        self.owners_with_chat_status(STATUS_QUEUED_RATE_LIMIT)
    }

    async fn concurrency_stuck_owners(&self) -> Result<Vec<OwnerId>> {
        self.owners_with_chat_status(STATUS_QUEUED_CONCURRENCY)
    }

    async fn automations_due(&self) -> Result<Vec<DueAutomation>> {
        let now = ts(Utc::now());
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id FROM automations
                 WHERE enabled = 1 AND next_run_at IS NOT NULL AND next_run_at <= ?1
                 ORDER BY next_run_at",
            )
            .map_err(db("Automations query"))?;
        let rows = stmt
            .query_map([now], |row| {
                Ok(DueAutomation {
                    automation_id: row.get(0)?,
                    owner: OwnerId(row.get(1)?),
                })
            })
            .map_err(db("Automations query"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db("Automations query"))
    }
}

#[async_trait]
impl RateLimiter for SchedulerDb {
    async fn remaining(&self, resource: LimitedResource, owner: &OwnerId) -> Result<Quota> {
        let LimitedResource::SandboxCreation = resource;
        let window = Duration::seconds(
            i64::try_from(self.rate_limit.sandbox_creation_window_secs).unwrap_or(i64::MAX),
        );
        let since = ts(Utc::now() - window);
        let used: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM sandbox_creations WHERE user_id = ?1 AND created_at > ?2",
                params![owner.as_str(), since],
                |row| row.get(0),
            )
            .map_err(|e| ScoutError::RateLimiter(format!("{}: {e}", resource.as_str())))?;
        Ok(Quota {
            remaining: self
                .rate_limit
                .sandbox_creation_max
                .saturating_sub(u64::try_from(used).unwrap_or(0)),
        })
    }
}

#[async_trait]
impl AutomationExecutor for SchedulerDb {
    async fn run_automation(&self, automation: &DueAutomation, source: RunSource) -> Result<()> {
        let now = Utc::now();
        let mut conn = self.conn()?;

        let expression: String = conn
            .query_row(
                "SELECT cron_expression FROM automations WHERE id = ?1",
                [&automation.automation_id],
                |row| row.get(0),
            )
            .map_err(|e| {
                ScoutError::Database(format!(
                    "Automation '{}' lookup: {e}",
                    automation.automation_id
                ))
            })?;
        // Fails before any write, so a broken schedule stays due.
        let next = next_run_from_cron(&expression, now)?;

        let tx = conn.transaction().map_err(db("Run automation"))?;
        tx.execute(
            "INSERT INTO automation_runs (id, automation_id, user_id, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                uuid::Uuid::new_v4().to_string(),
                automation.automation_id,
                automation.owner.as_str(),
                source.as_str(),
                ts(now),
            ],
        )
        .map_err(db("Run automation"))?;
        tx.execute(
            "UPDATE automations SET run_count = run_count + 1, last_run_at = ?1, next_run_at = ?2
             WHERE id = ?3",
            params![ts(now), ts(next), automation.automation_id],
        )
        .map_err(db("Run automation"))?;
        tx.commit().map_err(db("Run automation"))?;

        tracing::info!(
            "⚡ Automation {} ran ({}), next at {}",
            automation.automation_id,
            source.as_str(),
            next.format("%Y-%m-%d %H:%M UTC")
        );
        Ok(())
    }
}

/// Fixed-width UTC timestamps so TEXT comparison orders correctly.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn db(context: &'static str) -> impl Fn(rusqlite::Error) -> ScoutError {
    move |e| ScoutError::Database(format!("{context}: {e}"))
}
