//! # pipelinectl
//!
//! Facade crate: wires the workspace's narrow-trait components behind one
//! [`Deps`] bundle and exposes the Deployment Orchestrator (C10, §4.10) and
//! Audit Log (C2, §4.2) built on top of them. Binary entry points
//! (`pipelinectl-cli`, the webhook HTTP server) depend on this crate rather
//! than reaching into the component crates directly.

pub mod adapters;
pub mod audit;
pub mod deps;
pub mod orchestrator;
pub mod requests;

pub use adapters::TrendDegradationAdapter;
pub use deps::Deps;
pub use orchestrator::{Orchestrator, TriggerOutcome};
pub use requests::{ManualDeploymentRequest, RollbackRequest};
