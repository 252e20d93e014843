use std::sync::Arc;

use seerrbridge_core::audit::AuditStore;
use seerrbridge_core::{Config, ReconciliationGateway, SanitizedConfig, Scheduler};

/// Shared application state
pub struct AppState {
    config: Config,
    gateway: ReconciliationGateway,
    scheduler: Arc<Scheduler>,
    audit_store: Arc<dyn AuditStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        gateway: ReconciliationGateway,
        scheduler: Arc<Scheduler>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            config,
            gateway,
            scheduler,
            audit_store,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn gateway(&self) -> &ReconciliationGateway {
        &self.gateway
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.scheduler.as_ref()
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }
}
