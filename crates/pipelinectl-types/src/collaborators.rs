//! Capability interfaces for external collaborators (§6, §9 "ad-hoc
//! polymorphism via duck-typed services maps" substitution). Each is a
//! narrow, object-safe trait so the orchestrator can hold `Arc<dyn Trait>`
//! without a generic parameter; a nil/absent implementation is never
//! represented here — callers decide whether to wire one in, and its
//! absence is handled by the orchestrator per component (§4.10, §6).

use crate::error::Result;
use crate::ids::BackupRef;
use crate::Repository;

/// Outcome of a restore attempt (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Ok,
    Partial { failed_services: Vec<String> },
    Failed { failed_services: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    Corrupt,
}

/// Backup artifact lifecycle (§6).
pub trait Backup: Send + Sync {
    fn create(&self, repository: &Repository, commit: &str) -> Result<BackupRef>;
    fn restore(&self, backup_ref: &BackupRef) -> Result<RestoreOutcome>;
    fn verify(&self, backup_ref: &BackupRef) -> Result<VerifyOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Ok,
    Failed { kind: String, message: String },
}

/// Template/config application, invoked as an opaque sub-process (§1, §6).
pub trait Applier: Send + Sync {
    fn apply(&self, repository: &Repository, commit: &str) -> Result<ApplyOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHealthSnapshot {
    pub healthy: bool,
    pub version: Option<String>,
    pub states: Vec<(String, String)>,
}

/// Target-service health endpoint used by the `verify` stage (§6).
pub trait TargetHealth: Send + Sync {
    fn check(&self, repository: &Repository) -> Result<TargetHealthSnapshot>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// Optional alerting sink (§6). When absent, the caller logs at `warn`
/// instead of calling this trait at all.
pub trait NotificationSink: Send + Sync {
    fn alert(&self, level: AlertLevel, title: &str, message: &str, context: serde_json::Value);
}
