//! Normative per-channel event payloads consumed by the Event Bus (§4.3, §6).
//! Each channel carries its own well-typed payload enum rather than a single
//! catch-all event type (§9 "a single Event Bus contract with well-typed
//! per-channel payloads"); the bus crate is generic over the payload type
//! and wraps deliveries in its own overflow-aware envelope.

use serde::{Deserialize, Serialize};

use crate::deployment::{DeploymentError, RollbackOutcome, StageName, StageState};
use crate::health::HealthStatus;
use crate::ids::DeploymentId;
use crate::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Deployments,
    Pipelines,
    Compliance,
    Health,
    Alerts,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Deployments => "deployments",
            Channel::Pipelines => "pipelines",
            Channel::Compliance => "compliance",
            Channel::Health => "health",
            Channel::Alerts => "alerts",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeploymentEvent {
    Started {
        deployment_id: DeploymentId,
        repository: Repository,
    },
    StageUpdate {
        deployment_id: DeploymentId,
        stage: StageName,
        state: StageState,
    },
    Completed {
        deployment_id: DeploymentId,
    },
    Failed {
        deployment_id: DeploymentId,
        error: DeploymentError,
    },
    RollbackInitiated {
        deployment_id: DeploymentId,
        rollback_deployment_id: DeploymentId,
    },
    RollbackCompleted {
        deployment_id: DeploymentId,
        rollback_deployment_id: DeploymentId,
        outcome: RollbackOutcome,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PipelineEvent {
    Started { repository: Repository, run_id: String },
    StepUpdate { repository: Repository, run_id: String, step: String },
    Completed { repository: Repository, run_id: String },
    Failed { repository: Repository, run_id: String, reason: String },
    Metrics { repository: Repository },
    StatusSummary { repository: Repository, status: HealthStatus },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HealthEvent {
    Update { repository: Repository, status: HealthStatus, score: f64 },
    ThresholdBreach { repository: Repository, status: HealthStatus, score: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AlertEvent {
    New {
        level: AlertLevel,
        title: String,
        message: String,
        repository: Option<Repository>,
    },
}
