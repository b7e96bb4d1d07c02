//! Opaque identity types shared across the whole workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Repository identity (`owner/name`). Unique within the system.
///
/// Deliberately a thin newtype over `String` rather than a parsed
/// `(owner, name)` pair: the core never needs to split it, and keeping it
/// opaque matches how `Repository` flows untouched through the store,
/// event bus, and metrics contracts (§3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Repository(String);

impl Repository {
    pub fn new(owner_slash_name: impl Into<String>) -> Self {
        Self(owner_slash_name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Repository {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Repository {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Opaque unique deployment identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generate a new random-looking id from a monotonic counter + a caller
    /// supplied random seed. Kept deterministic-friendly (no hidden call to
    /// a clock or RNG) so callers in tests can control ids; production
    /// callers pass `rand::random()` as the seed.
    pub fn generate(seed: u64) -> Self {
        Self(format!("dep_{seed:016x}"))
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque append-only audit event identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEventId(String);

impl AuditEventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate(seed: u64) -> Self {
        Self(format!("aud_{seed:016x}"))
    }
}

impl fmt::Display for AuditEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a backup artifact produced by the `Backup`
/// collaborator (§6). The orchestrator never inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupRef(String);

impl BackupRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
