//! Work item definitions — one shape per queue kind, no shared schema.
//!
//! Items are transient views over rows owned by the due-item source. They are
//! materialized once per routine per trigger and dropped after dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant scope for rate and concurrency limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a session's sandbox runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxProvider {
    E2b,
    Daytona,
    Docker,
}

impl SandboxProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            SandboxProvider::E2b => "e2b",
            SandboxProvider::Daytona => "daytona",
            SandboxProvider::Docker => "docker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "e2b" => Some(SandboxProvider::E2b),
            "daytona" => Some(SandboxProvider::Daytona),
            "docker" => Some(SandboxProvider::Docker),
            _ => None,
        }
    }
}

impl fmt::Display for SandboxProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisioned sandbox attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRef {
    pub sandbox_id: String,
    pub provider: SandboxProvider,
}

/// An active session whose last activity is older than the staleness threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalledSession {
    pub thread_id: String,
    pub owner: OwnerId,
    /// None when the session never got a sandbox.
    pub sandbox: Option<SandboxRef>,
}

/// Everything a hibernation call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HibernationTarget<'a> {
    pub owner: &'a OwnerId,
    pub thread_id: &'a str,
    pub sandbox: &'a SandboxRef,
}

impl StalledSession {
    pub fn hibernation_target(&self) -> Option<HibernationTarget<'_>> {
        self.sandbox.as_ref().map(|sandbox| HibernationTarget {
            owner: &self.owner,
            thread_id: &self.thread_id,
            sandbox,
        })
    }
}

/// A thread chat whose scheduled run time has arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledChat {
    pub owner: OwnerId,
    pub thread_id: String,
    pub chat_id: String,
}

/// A recurring automation whose schedule has become due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueAutomation {
    pub automation_id: String,
    pub owner: OwnerId,
}

/// Who started an automation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunSource {
    /// Fired by the periodic sweep.
    Automated,
    /// Fired by a user from the UI.
    Manual,
}

impl RunSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RunSource::Automated => "automated",
            RunSource::Manual => "manual",
        }
    }
}

/// A named resource guarded by the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitedResource {
    SandboxCreation,
}

impl LimitedResource {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitedResource::SandboxCreation => "sandbox-creation",
        }
    }
}

/// Remaining quota for one owner on one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub remaining: u64,
}

impl Quota {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_provider_roundtrip_names() {
        for provider in [
            SandboxProvider::E2b,
            SandboxProvider::Daytona,
            SandboxProvider::Docker,
        ] {
            assert_eq!(SandboxProvider::parse(provider.as_str()), Some(provider));
        }
        assert_eq!(SandboxProvider::parse("vercel"), None);
    }

    #[test]
    fn test_hibernation_target_requires_sandbox() {
        let mut session = StalledSession {
            thread_id: "t1".into(),
            owner: OwnerId::new("u1"),
            sandbox: None,
        };
        assert!(session.hibernation_target().is_none());

        session.sandbox = Some(SandboxRef {
            sandbox_id: "sb-1".into(),
            provider: SandboxProvider::E2b,
        });
        let target = session.hibernation_target().unwrap();
        assert_eq!(target.thread_id, "t1");
        assert_eq!(target.sandbox.sandbox_id, "sb-1");
    }

    #[test]
    fn test_quota_exhausted_only_at_zero() {
        assert!(Quota { remaining: 0 }.is_exhausted());
        assert!(!Quota { remaining: 1 }.is_exhausted());
    }

    #[test]
    fn test_run_source_serializes_lowercase() {
        let json = serde_json::to_string(&RunSource::Automated).unwrap();
        assert_eq!(json, "\"automated\"");
    }
}
