mod alerts;
mod analytics;
mod conflict;
mod drivers;
mod error;
mod fuel;
mod maintenance;
mod store;
mod trips;
mod vehicles;

pub use alerts::{
    register_fleet_jobs, FleetJobConfig, INSURANCE_EXPIRY_JOB, LICENSE_EXPIRY_JOB, MAINTENANCE_DUE_JOB,
    REGISTRATION_EXPIRY_JOB,
};
pub use analytics::{
    month_bounds, vehicle_cost, vehicle_utilization, DailyTrend, DashboardStats, VehicleCost, VehicleUtilization,
};
pub use conflict::{find_conflict, find_driver_conflict};
pub use error::{ErrorKind, FleetError};
pub use fuel::{analyze_fuel_entry, FuelAnalysis};
pub use maintenance::{predict_next_service, NextService};
pub use store::InMemoryStore;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

use crate::auth::{self, Actor, Authorizer, Permission};
use crate::model::*;
use crate::notify::NotificationSink;
use crate::repository::FleetStore;

/// Per-tenant orchestrator. All reads and writes go through the store with
/// this engine's tenant id.
pub struct FleetEngine {
    tenant_id: TenantId,
    store: Arc<dyn FleetStore>,
    authorizer: Arc<dyn Authorizer>,
    sink: Arc<dyn NotificationSink>,
    /// Serializes booking-affecting operations per vehicle.
    vehicle_locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl FleetEngine {
    pub fn new(
        tenant_id: TenantId,
        store: Arc<dyn FleetStore>,
        authorizer: Arc<dyn Authorizer>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            tenant_id,
            store,
            authorizer,
            sink,
            vehicle_locks: DashMap::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub(super) async fn authorize(&self, actor: &Actor, permission: Permission) -> Result<(), FleetError> {
        auth::authorize(self.authorizer.as_ref(), actor, permission).await
    }

    /// Held across check-then-write sequences touching one vehicle.
    pub(super) async fn lock_vehicle(&self, vehicle_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self
            .vehicle_locks
            .entry(vehicle_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub(super) fn publish(&self, event: Event) {
        self.sink.publish(event);
    }

    pub(super) async fn load_vehicle(&self, id: Ulid) -> Result<Vehicle, FleetError> {
        self.store
            .vehicle(self.tenant_id, id)
            .await
            .map_err(FleetError::store("get vehicle"))?
            .ok_or(FleetError::not_found("vehicle", id))
    }

    pub(super) async fn load_driver(&self, id: Ulid) -> Result<Driver, FleetError> {
        self.store
            .driver(self.tenant_id, id)
            .await
            .map_err(FleetError::store("get driver"))?
            .ok_or(FleetError::not_found("driver", id))
    }

    pub(super) async fn load_trip(&self, id: Ulid) -> Result<Trip, FleetError> {
        self.store
            .trip(self.tenant_id, id)
            .await
            .map_err(FleetError::store("get trip"))?
            .filter(|t| !t.deleted)
            .ok_or(FleetError::not_found("trip", id))
    }

    /// Rejects entities that claim a different tenant than this engine.
    pub(super) fn ensure_tenant(&self, entity: &'static str, id: Ulid, tenant_id: TenantId) -> Result<(), FleetError> {
        if tenant_id == self.tenant_id {
            Ok(())
        } else {
            Err(FleetError::not_found(entity, id))
        }
    }
}
