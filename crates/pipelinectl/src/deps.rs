//! The orchestrator's collaborator bundle, built once at process start and
//! threaded through by `Arc` (§9 "dependency injection via an explicit
//! struct, never a global/service-locator").

use std::sync::Arc;

use pipelinectl_config::DeploymentConfig;
use pipelinectl_events::Bus;
use pipelinectl_health::HealthChecker;
use pipelinectl_store::Store;
use pipelinectl_types::collaborators::{Applier, Backup, NotificationSink, TargetHealth};
use pipelinectl_types::event::DeploymentEvent;

pub struct Deps {
    pub store: Arc<dyn Store>,
    pub backup: Arc<dyn Backup>,
    pub applier: Arc<dyn Applier>,
    pub target_health: Arc<dyn TargetHealth>,
    pub health_checker: Arc<HealthChecker>,
    pub notifications: Option<Arc<dyn NotificationSink>>,
    pub deployment_bus: Bus<DeploymentEvent>,
    pub config: DeploymentConfig,
}

impl Deps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        backup: Arc<dyn Backup>,
        applier: Arc<dyn Applier>,
        target_health: Arc<dyn TargetHealth>,
        health_checker: Arc<HealthChecker>,
        config: DeploymentConfig,
    ) -> Self {
        Self {
            store,
            backup,
            applier,
            target_health,
            health_checker,
            notifications: None,
            deployment_bus: Bus::with_default_capacity(),
            config,
        }
    }

    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = Some(sink);
        self
    }
}
