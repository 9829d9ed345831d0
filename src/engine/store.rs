use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;
use crate::repository::*;

use super::conflict::find_conflict;

/// `FleetStore` kept entirely in memory.
///
/// Trips are grouped per vehicle so that the overlap re-check and the insert
/// run under the same shard write lock.
pub struct InMemoryStore {
    vehicles: DashMap<Ulid, Vehicle>,
    drivers: DashMap<Ulid, Driver>,
    trips: DashMap<Ulid, Vec<Trip>>,
    /// Reverse lookup: trip id → vehicle id
    trip_to_vehicle: DashMap<Ulid, Ulid>,
    maintenance: DashMap<Ulid, Vec<MaintenanceRecord>>,
    /// Per vehicle, sorted chronologically.
    fuel: DashMap<Ulid, Vec<FuelEntry>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            vehicles: DashMap::new(),
            drivers: DashMap::new(),
            trips: DashMap::new(),
            trip_to_vehicle: DashMap::new(),
            maintenance: DashMap::new(),
            fuel: DashMap::new(),
        }
    }

    pub fn trip_count(&self) -> usize {
        self.trip_to_vehicle.len()
    }
}

/// `[now, now + days]`. A horizon past the representable range is unbounded.
fn expiring_within(expiry: Timestamp, now: Timestamp, days: i64) -> bool {
    let horizon = Duration::try_days(days).and_then(|d| now.checked_add_signed(d));
    expiry >= now && horizon.map_or(days > 0, |h| expiry <= h)
}

#[async_trait]
impl VehicleRepository for InMemoryStore {
    async fn vehicle(&self, tenant: TenantId, id: Ulid) -> StoreResult<Option<Vehicle>> {
        Ok(self
            .vehicles
            .get(&id)
            .filter(|v| v.tenant_id == tenant)
            .map(|v| v.value().clone()))
    }

    async fn save_vehicle(&self, vehicle: &Vehicle) -> StoreResult<()> {
        self.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(())
    }

    async fn vehicles(&self, tenant: TenantId) -> StoreResult<Vec<Vehicle>> {
        Ok(self
            .vehicles
            .iter()
            .filter(|v| v.tenant_id == tenant)
            .map(|v| v.value().clone())
            .collect())
    }

    async fn expiring_registrations(&self, tenant: TenantId, now: Timestamp, days: i64) -> StoreResult<Vec<Vehicle>> {
        let mut out: Vec<Vehicle> = self
            .vehicles
            .iter()
            .filter(|v| v.tenant_id == tenant && expiring_within(v.registration_expiry, now, days))
            .map(|v| v.value().clone())
            .collect();
        out.sort_by_key(|v| v.registration_expiry);
        Ok(out)
    }

    async fn expiring_insurance(&self, tenant: TenantId, now: Timestamp, days: i64) -> StoreResult<Vec<Vehicle>> {
        let mut out: Vec<Vehicle> = self
            .vehicles
            .iter()
            .filter(|v| v.tenant_id == tenant && expiring_within(v.insurance_expiry, now, days))
            .map(|v| v.value().clone())
            .collect();
        out.sort_by_key(|v| v.insurance_expiry);
        Ok(out)
    }
}

#[async_trait]
impl DriverRepository for InMemoryStore {
    async fn driver(&self, tenant: TenantId, id: Ulid) -> StoreResult<Option<Driver>> {
        Ok(self
            .drivers
            .get(&id)
            .filter(|d| d.tenant_id == tenant)
            .map(|d| d.value().clone()))
    }

    async fn save_driver(&self, driver: &Driver) -> StoreResult<()> {
        self.drivers.insert(driver.id, driver.clone());
        Ok(())
    }

    async fn drivers(&self, tenant: TenantId) -> StoreResult<Vec<Driver>> {
        Ok(self
            .drivers
            .iter()
            .filter(|d| d.tenant_id == tenant)
            .map(|d| d.value().clone())
            .collect())
    }

    async fn expiring_licenses(&self, tenant: TenantId, now: Timestamp, days: i64) -> StoreResult<Vec<Driver>> {
        let mut out: Vec<Driver> = self
            .drivers
            .iter()
            .filter(|d| d.tenant_id == tenant && expiring_within(d.license_expiry, now, days))
            .map(|d| d.value().clone())
            .collect();
        out.sort_by_key(|d| d.license_expiry);
        Ok(out)
    }
}

#[async_trait]
impl TripRepository for InMemoryStore {
    async fn trip(&self, tenant: TenantId, id: Ulid) -> StoreResult<Option<Trip>> {
        let Some(vehicle_id) = self.trip_to_vehicle.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.trips.get(&vehicle_id).and_then(|trips| {
            trips
                .iter()
                .find(|t| t.id == id && t.tenant_id == tenant)
                .cloned()
        }))
    }

    async fn insert_trip(&self, trip: &Trip) -> StoreResult<()> {
        {
            let mut trips = self.trips.entry(trip.vehicle_id).or_default();
            let window = trip.effective_window();
            let same_tenant = trips.iter().filter(|t| t.tenant_id == trip.tenant_id);
            if trip.holds_vehicle()
                && let Some(existing) = find_conflict(same_tenant, trip.vehicle_id, &window, Some(trip.id))
            {
                return Err(StoreError::Conflict {
                    vehicle_id: trip.vehicle_id,
                    trip_id: existing.id,
                });
            }
            let pos = trips.partition_point(|t| t.start_time <= trip.start_time);
            trips.insert(pos, trip.clone());
        }
        self.trip_to_vehicle.insert(trip.id, trip.vehicle_id);
        Ok(())
    }

    async fn update_trip(&self, trip: &Trip) -> StoreResult<()> {
        let not_found = || StoreError::NotFound { entity: "trip", id: trip.id };
        let vehicle_id = self
            .trip_to_vehicle
            .get(&trip.id)
            .map(|e| *e.value())
            .ok_or_else(not_found)?;
        if vehicle_id != trip.vehicle_id {
            return Err(StoreError::Backend(format!(
                "trip {} cannot move from vehicle {vehicle_id} to {}",
                trip.id, trip.vehicle_id
            )));
        }
        let mut trips = self.trips.get_mut(&vehicle_id).ok_or_else(not_found)?;
        let slot = trips
            .iter_mut()
            .find(|t| t.id == trip.id && t.tenant_id == trip.tenant_id)
            .ok_or_else(not_found)?;
        *slot = trip.clone();
        Ok(())
    }

    async fn trips_by_vehicle(&self, tenant: TenantId, vehicle_id: Ulid) -> StoreResult<Vec<Trip>> {
        Ok(self
            .trips
            .get(&vehicle_id)
            .map(|trips| {
                trips
                    .iter()
                    .filter(|t| t.tenant_id == tenant && !t.deleted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn trips_by_driver(&self, tenant: TenantId, driver_id: Ulid) -> StoreResult<Vec<Trip>> {
        let mut out: Vec<Trip> = self
            .trips
            .iter()
            .flat_map(|e| e.value().clone())
            .filter(|t| t.tenant_id == tenant && t.driver_id == driver_id && !t.deleted)
            .collect();
        out.sort_by_key(|t| t.start_time);
        Ok(out)
    }

    async fn active_trips(&self, tenant: TenantId) -> StoreResult<Vec<Trip>> {
        let mut out: Vec<Trip> = self
            .trips
            .iter()
            .flat_map(|e| e.value().clone())
            .filter(|t| t.tenant_id == tenant && t.holds_vehicle())
            .collect();
        out.sort_by_key(|t| t.start_time);
        Ok(out)
    }

    async fn check_conflict(
        &self,
        tenant: TenantId,
        vehicle_id: Ulid,
        window: Span,
        exclude: Option<Ulid>,
    ) -> StoreResult<bool> {
        Ok(self.trips.get(&vehicle_id).is_some_and(|trips| {
            let same_tenant = trips.iter().filter(|t| t.tenant_id == tenant);
            find_conflict(same_tenant, vehicle_id, &window, exclude).is_some()
        }))
    }
}

#[async_trait]
impl MaintenanceRepository for InMemoryStore {
    async fn insert_maintenance(&self, record: &MaintenanceRecord) -> StoreResult<()> {
        self.maintenance
            .entry(record.vehicle_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn maintenance_by_vehicle(&self, tenant: TenantId, vehicle_id: Ulid) -> StoreResult<Vec<MaintenanceRecord>> {
        let mut out: Vec<MaintenanceRecord> = self
            .maintenance
            .get(&vehicle_id)
            .map(|recs| recs.iter().filter(|r| r.tenant_id == tenant).cloned().collect())
            .unwrap_or_default();
        out.sort_by_key(|r| r.service_date);
        Ok(out)
    }

    async fn due_maintenance(&self, tenant: TenantId, now: Timestamp) -> StoreResult<Vec<MaintenanceRecord>> {
        let mut out: Vec<MaintenanceRecord> = self
            .maintenance
            .iter()
            .flat_map(|e| e.value().clone())
            .filter(|r| r.tenant_id == tenant && r.next_due_date.is_some_and(|due| due <= now))
            .collect();
        out.sort_by_key(|r| r.next_due_date);
        Ok(out)
    }
}

#[async_trait]
impl FuelEntryRepository for InMemoryStore {
    async fn insert_fuel_entry(&self, entry: &FuelEntry) -> StoreResult<()> {
        let mut entries = self.fuel.entry(entry.vehicle_id).or_default();
        let key = entry.chronological_key();
        let pos = entries.partition_point(|e| e.chronological_key() <= key);
        entries.insert(pos, entry.clone());
        Ok(())
    }

    async fn fuel_entries_by_vehicle(&self, tenant: TenantId, vehicle_id: Ulid) -> StoreResult<Vec<FuelEntry>> {
        Ok(self
            .fuel
            .get(&vehicle_id)
            .map(|entries| entries.iter().filter(|e| e.tenant_id == tenant).cloned().collect())
            .unwrap_or_default())
    }

    async fn last_fuel_entry(&self, tenant: TenantId, vehicle_id: Ulid) -> StoreResult<Option<FuelEntry>> {
        Ok(self
            .fuel
            .get(&vehicle_id)
            .and_then(|entries| entries.iter().rev().find(|e| e.tenant_id == tenant).cloned()))
    }
}
