//! # pipelinectl-types
//!
//! Core domain types shared across every `pipelinectl-*` crate: the
//! deployment state machine, stage results, pipeline runs, health reports,
//! failure predictions, trend reports, the audit trail, the closed-set
//! error kind, and the capability interfaces (`Backup`, `Applier`,
//! `TargetHealth`, `NotificationSink`) external collaborators implement.
//!
//! Nothing in this crate performs I/O; it is pure data plus the small
//! amount of pure logic (state-machine legality, health-score weighting,
//! factor consolidation, z-score classification) that every consumer needs
//! to agree on bit-for-bit.

pub mod anomaly;
pub mod audit;
pub mod collaborators;
pub mod deployment;
pub mod error;
pub mod event;
pub mod health;
pub mod ids;
pub mod pipeline_run;
pub mod prediction;
pub mod trend;

pub use error::{Error, Result};
pub use ids::Repository;
