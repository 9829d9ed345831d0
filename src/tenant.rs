use std::sync::Arc;

use dashmap::DashMap;

use crate::auth::Authorizer;
use crate::engine::{FleetEngine, FleetError};
use crate::limits::*;
use crate::model::TenantId;
use crate::notify::NotifyHub;
use crate::repository::FleetStore;
use crate::scheduler::TenantSource;

/// Manages per-tenant engines. Each tenant gets its own FleetEngine and
/// NotifyHub; all of them share one store and one authorizer.
pub struct TenantManager {
    engines: DashMap<TenantId, Arc<FleetEngine>>,
    hubs: DashMap<TenantId, Arc<NotifyHub>>,
    store: Arc<dyn FleetStore>,
    authorizer: Arc<dyn Authorizer>,
}

impl TenantManager {
    pub fn new(store: Arc<dyn FleetStore>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            engines: DashMap::new(),
            hubs: DashMap::new(),
            store,
            authorizer,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: TenantId) -> Result<Arc<FleetEngine>, FleetError> {
        if let Some(engine) = self.engines.get(&tenant) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(FleetError::LimitExceeded("too many tenants"));
        }

        let engine = self
            .engines
            .entry(tenant)
            .or_insert_with(|| {
                let hub = self.hub(tenant);
                Arc::new(FleetEngine::new(
                    tenant,
                    self.store.clone(),
                    self.authorizer.clone(),
                    hub,
                ))
            })
            .clone();
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        tracing::debug!(tenant_id = %tenant, "tenant engine ready");
        Ok(engine)
    }

    /// Notification hub for a tenant; subscribe here to hear its events.
    pub fn hub(&self, tenant: TenantId) -> Arc<NotifyHub> {
        self.hubs
            .entry(tenant)
            .or_insert_with(|| Arc::new(NotifyHub::new()))
            .clone()
    }

    /// Drop a tenant's engine. Its data stays in the store.
    pub fn remove(&self, tenant: &TenantId) {
        self.engines.remove(tenant);
        self.hubs.remove(tenant);
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Every tenant with a loaded engine, in id order.
impl TenantSource for TenantManager {
    fn tenants(&self) -> Vec<TenantId> {
        let mut ids: Vec<TenantId> = self.engines.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }
}
