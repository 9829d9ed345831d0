//! Storage collaborator contracts.
//!
//! The engine never talks to a database directly. Every method takes the
//! tenant explicitly; a per-tenant engine always passes its own id, so rows
//! belonging to another tenant are simply invisible.

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Ulid },
    /// An active trip already holds the vehicle for an overlapping window.
    #[error("vehicle {vehicle_id} already booked by trip {trip_id}")]
    Conflict { vehicle_id: Ulid, trip_id: Ulid },
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait VehicleRepository: Send + Sync {
    async fn vehicle(&self, tenant: TenantId, id: Ulid) -> StoreResult<Option<Vehicle>>;
    /// Insert or replace.
    async fn save_vehicle(&self, vehicle: &Vehicle) -> StoreResult<()>;
    async fn vehicles(&self, tenant: TenantId) -> StoreResult<Vec<Vehicle>>;
    /// Vehicles whose registration expires within `[now, now + days]`, soonest first.
    async fn expiring_registrations(&self, tenant: TenantId, now: Timestamp, days: i64) -> StoreResult<Vec<Vehicle>>;
    async fn expiring_insurance(&self, tenant: TenantId, now: Timestamp, days: i64) -> StoreResult<Vec<Vehicle>>;
}

#[async_trait]
pub trait DriverRepository: Send + Sync {
    async fn driver(&self, tenant: TenantId, id: Ulid) -> StoreResult<Option<Driver>>;
    async fn save_driver(&self, driver: &Driver) -> StoreResult<()>;
    async fn drivers(&self, tenant: TenantId) -> StoreResult<Vec<Driver>>;
    /// Drivers whose license expires within `[now, now + days]`, soonest first.
    async fn expiring_licenses(&self, tenant: TenantId, now: Timestamp, days: i64) -> StoreResult<Vec<Driver>>;
}

#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn trip(&self, tenant: TenantId, id: Ulid) -> StoreResult<Option<Trip>>;

    /// Persist a new trip. Implementations must re-check for an overlapping
    /// active trip on the same vehicle atomically with the write and fail
    /// with [`StoreError::Conflict`] if one exists.
    async fn insert_trip(&self, trip: &Trip) -> StoreResult<()>;

    async fn update_trip(&self, trip: &Trip) -> StoreResult<()>;

    /// Non-deleted trips on a vehicle, ordered by start time.
    async fn trips_by_vehicle(&self, tenant: TenantId, vehicle_id: Ulid) -> StoreResult<Vec<Trip>>;
    async fn trips_by_driver(&self, tenant: TenantId, driver_id: Ulid) -> StoreResult<Vec<Trip>>;

    /// Scheduled and InProgress trips.
    async fn active_trips(&self, tenant: TenantId) -> StoreResult<Vec<Trip>>;

    /// Whether an active, non-deleted trip other than `exclude` intersects `window`.
    async fn check_conflict(
        &self,
        tenant: TenantId,
        vehicle_id: Ulid,
        window: Span,
        exclude: Option<Ulid>,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait MaintenanceRepository: Send + Sync {
    async fn insert_maintenance(&self, record: &MaintenanceRecord) -> StoreResult<()>;
    async fn maintenance_by_vehicle(&self, tenant: TenantId, vehicle_id: Ulid) -> StoreResult<Vec<MaintenanceRecord>>;
    /// Records whose next due date is on or before `now`, soonest first.
    async fn due_maintenance(&self, tenant: TenantId, now: Timestamp) -> StoreResult<Vec<MaintenanceRecord>>;
}

#[async_trait]
pub trait FuelEntryRepository: Send + Sync {
    async fn insert_fuel_entry(&self, entry: &FuelEntry) -> StoreResult<()>;
    /// All entries for a vehicle in chronological order.
    async fn fuel_entries_by_vehicle(&self, tenant: TenantId, vehicle_id: Ulid) -> StoreResult<Vec<FuelEntry>>;
    async fn last_fuel_entry(&self, tenant: TenantId, vehicle_id: Ulid) -> StoreResult<Option<FuelEntry>>;
}

/// Everything the engine needs from storage.
pub trait FleetStore:
    VehicleRepository + DriverRepository + TripRepository + MaintenanceRepository + FuelEntryRepository
{
}

impl<T> FleetStore for T where
    T: VehicleRepository + DriverRepository + TripRepository + MaintenanceRepository + FuelEntryRepository
{
}
