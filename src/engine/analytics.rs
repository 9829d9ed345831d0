//! Fleet reporting: dashboard counters, per-vehicle utilization and cost,
//! and daily trends.
//!
//! Every report period is half-open, `[start, end)`: an item dated exactly at
//! `end` belongs to the next period.

use chrono::{Datelike, Duration, Months, NaiveTime};
use futures::TryFutureExt;
use serde::Serialize;
use ulid::Ulid;

use crate::auth::{Actor, Permission};
use crate::limits::MAX_REPORT_DAYS;
use crate::model::*;
use crate::status::{DriverStatus, TripStatus, VehicleStatus};

use super::conflict::now;
use super::{FleetEngine, FleetError};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_vehicles: usize,
    pub available_vehicles: usize,
    pub vehicles_in_use: usize,
    pub vehicles_in_maintenance: usize,
    pub active_drivers: usize,
    pub due_maintenance: usize,
    pub fuel_cost_month: f64,
    pub maintenance_cost_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleUtilization {
    pub vehicle_id: Ulid,
    pub vehicle_name: String,
    pub total_trips: usize,
    pub total_hours: f64,
    pub total_distance: u64,
    /// Hours on closed trips as a percentage of the period length.
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleCost {
    pub vehicle_id: Ulid,
    pub vehicle_name: String,
    pub fuel_cost: f64,
    pub maintenance_cost: f64,
    pub total_cost: f64,
    /// `None` when nothing was driven in the period.
    pub cost_per_distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTrend {
    /// Start of the 24h bucket.
    pub day: Timestamp,
    pub fuel_cost: f64,
    pub maintenance_cost: f64,
    pub trip_count: usize,
    pub distance: u64,
}

/// Everything recorded against one vehicle.
struct VehicleHistory {
    vehicle: Vehicle,
    trips: Vec<Trip>,
    fuel: Vec<FuelEntry>,
    maintenance: Vec<MaintenanceRecord>,
}

fn in_period(t: Timestamp, start: Timestamp, end: Timestamp) -> bool {
    start <= t && t < end
}

fn hours(from: Timestamp, to: Timestamp) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}

/// Only a completed trip has a real end time; a planned one does not count.
fn trip_hours(trip: &Trip) -> f64 {
    match (trip.status, trip.end_time) {
        (TripStatus::Completed, Some(end)) => hours(trip.start_time, end),
        _ => 0.0,
    }
}

fn trip_distance(trip: &Trip) -> u64 {
    trip.end_odometer.map_or(0, |end| end.saturating_sub(trip.start_odometer))
}

fn ensure_period(start: Timestamp, end: Timestamp) -> Result<(), FleetError> {
    if end < start {
        return Err(FleetError::InvariantViolation(format!(
            "report period end {end} is before start {start}"
        )));
    }
    Ok(())
}

/// First instant of `at`'s calendar month (UTC) and of the month after.
pub fn month_bounds(at: Timestamp) -> Option<(Timestamp, Timestamp)> {
    let start = at.date_naive().with_day(1)?.and_time(NaiveTime::MIN).and_utc();
    let end = start.checked_add_months(Months::new(1))?;
    Some((start, end))
}

/// Trips starting in the period. Every one counts toward `total_trips`;
/// only completed ones add hours or distance.
pub fn vehicle_utilization(vehicle: &Vehicle, trips: &[Trip], start: Timestamp, end: Timestamp) -> VehicleUtilization {
    let mut report = VehicleUtilization {
        vehicle_id: vehicle.id,
        vehicle_name: vehicle.display_name(),
        total_trips: 0,
        total_hours: 0.0,
        total_distance: 0,
        utilization_pct: 0.0,
    };
    for trip in trips.iter().filter(|t| !t.deleted && in_period(t.start_time, start, end)) {
        report.total_trips += 1;
        report.total_hours += trip_hours(trip);
        report.total_distance += trip_distance(trip);
    }
    let period = hours(start, end);
    if period > 0.0 {
        report.utilization_pct = report.total_hours / period * 100.0;
    }
    report
}

pub fn vehicle_cost(
    vehicle: &Vehicle,
    trips: &[Trip],
    fuel: &[FuelEntry],
    maintenance: &[MaintenanceRecord],
    start: Timestamp,
    end: Timestamp,
) -> VehicleCost {
    let fuel_cost: f64 = fuel
        .iter()
        .filter(|f| in_period(f.date, start, end))
        .map(|f| f.cost)
        .sum();
    let maintenance_cost: f64 = maintenance
        .iter()
        .filter(|m| in_period(m.service_date, start, end))
        .map(|m| m.cost)
        .sum();
    let distance: u64 = trips
        .iter()
        .filter(|t| !t.deleted && in_period(t.start_time, start, end))
        .map(trip_distance)
        .sum();
    let total_cost = fuel_cost + maintenance_cost;
    VehicleCost {
        vehicle_id: vehicle.id,
        vehicle_name: vehicle.display_name(),
        fuel_cost,
        maintenance_cost,
        total_cost,
        cost_per_distance: (distance > 0).then(|| total_cost / distance as f64),
    }
}

impl FleetEngine {
    /// Load every vehicle with its trips, fuel entries and service records,
    /// ordered by vehicle id.
    async fn fleet_history(&self) -> Result<Vec<VehicleHistory>, FleetError> {
        let tenant = self.tenant_id();
        let mut vehicles = self
            .store
            .vehicles(tenant)
            .await
            .map_err(FleetError::store("list vehicles"))?;
        vehicles.sort_by_key(|v| v.id);

        let mut history = Vec::with_capacity(vehicles.len());
        for vehicle in vehicles {
            let (trips, fuel, maintenance) = futures::try_join!(
                self.store
                    .trips_by_vehicle(tenant, vehicle.id)
                    .map_err(FleetError::store("list trips by vehicle")),
                self.store
                    .fuel_entries_by_vehicle(tenant, vehicle.id)
                    .map_err(FleetError::store("list fuel entries")),
                self.store
                    .maintenance_by_vehicle(tenant, vehicle.id)
                    .map_err(FleetError::store("list maintenance")),
            )?;
            history.push(VehicleHistory {
                vehicle,
                trips,
                fuel,
                maintenance,
            });
        }
        Ok(history)
    }

    /// Fleet counters plus fuel and maintenance spend for the current
    /// calendar month (UTC).
    pub async fn dashboard_stats(&self, actor: &Actor) -> Result<DashboardStats, FleetError> {
        self.authorize(actor, Permission::VehicleRead).await?;
        let now = now();
        let (month_start, month_end) = month_bounds(now)
            .ok_or_else(|| FleetError::InvariantViolation(format!("no calendar month around {now}")))?;

        let history = self.fleet_history().await?;
        let drivers = self
            .store
            .drivers(self.tenant_id())
            .await
            .map_err(FleetError::store("list drivers"))?;
        let due = self
            .store
            .due_maintenance(self.tenant_id(), now)
            .await
            .map_err(FleetError::store("list due maintenance"))?;

        let mut stats = DashboardStats {
            total_vehicles: history.len(),
            active_drivers: drivers.iter().filter(|d| d.status == DriverStatus::Active).count(),
            due_maintenance: due.len(),
            ..DashboardStats::default()
        };
        for h in &history {
            match h.vehicle.status {
                VehicleStatus::Available => stats.available_vehicles += 1,
                VehicleStatus::InUse => stats.vehicles_in_use += 1,
                VehicleStatus::Maintenance => stats.vehicles_in_maintenance += 1,
                VehicleStatus::OutOfService | VehicleStatus::Retired => {}
            }
            let cost = vehicle_cost(&h.vehicle, &[], &h.fuel, &h.maintenance, month_start, month_end);
            stats.fuel_cost_month += cost.fuel_cost;
            stats.maintenance_cost_month += cost.maintenance_cost;
        }
        Ok(stats)
    }

    pub async fn utilization_report(
        &self,
        actor: &Actor,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<VehicleUtilization>, FleetError> {
        self.authorize(actor, Permission::VehicleRead).await?;
        ensure_period(start, end)?;
        Ok(self
            .fleet_history()
            .await?
            .iter()
            .map(|h| vehicle_utilization(&h.vehicle, &h.trips, start, end))
            .collect())
    }

    pub async fn cost_analysis(
        &self,
        actor: &Actor,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<VehicleCost>, FleetError> {
        self.authorize(actor, Permission::VehicleRead).await?;
        ensure_period(start, end)?;
        Ok(self
            .fleet_history()
            .await?
            .iter()
            .map(|h| vehicle_cost(&h.vehicle, &h.trips, &h.fuel, &h.maintenance, start, end))
            .collect())
    }

    /// Fleet-wide totals in consecutive 24h buckets from `start`. The last
    /// bucket may extend past `end` but only counts items before it.
    pub async fn trend_data(&self, actor: &Actor, start: Timestamp, end: Timestamp) -> Result<Vec<DailyTrend>, FleetError> {
        self.authorize(actor, Permission::VehicleRead).await?;
        ensure_period(start, end)?;
        if end - start > Duration::days(MAX_REPORT_DAYS) {
            return Err(FleetError::LimitExceeded("trend period too long"));
        }

        let mut trends = Vec::new();
        let mut day = start;
        while day < end {
            trends.push(DailyTrend {
                day,
                fuel_cost: 0.0,
                maintenance_cost: 0.0,
                trip_count: 0,
                distance: 0,
            });
            match day.checked_add_signed(Duration::days(1)) {
                Some(next) => day = next,
                None => break,
            }
        }
        let bucket = |t: Timestamp| {
            in_period(t, start, end)
                .then(|| (t - start).num_days())
                .and_then(|i| usize::try_from(i).ok())
        };

        for h in self.fleet_history().await? {
            for f in &h.fuel {
                if let Some(trend) = bucket(f.date).and_then(|i| trends.get_mut(i)) {
                    trend.fuel_cost += f.cost;
                }
            }
            for m in &h.maintenance {
                if let Some(trend) = bucket(m.service_date).and_then(|i| trends.get_mut(i)) {
                    trend.maintenance_cost += m.cost;
                }
            }
            for t in &h.trips {
                if let Some(trend) = bucket(t.start_time).and_then(|i| trends.get_mut(i)) {
                    trend.trip_count += 1;
                    trend.distance += trip_distance(t);
                }
            }
        }
        Ok(trends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{FuelType, ServiceType};
    use chrono::{TimeZone, Utc};

    fn at(day: u32, h: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 3, day, h, 0, 0).unwrap()
    }

    fn van() -> Vehicle {
        Vehicle::new(Ulid::new(), Ulid::new(), "Ford", "Transit", "V-1")
    }

    fn closed_trip(v: &Vehicle, start: Timestamp, end: Timestamp, distance: u64) -> Trip {
        Trip::new(Ulid::new(), v.tenant_id, v.id, Ulid::new(), "A", "B", start, 500)
            .complete(end, 500 + distance)
            .unwrap()
    }

    #[test]
    fn month_bounds_cover_calendar_month() {
        let (start, end) = month_bounds(Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 0).unwrap()).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn utilization_counts_trips_starting_in_period() {
        let v = van();
        let trips = vec![
            closed_trip(&v, at(1, 8), at(1, 14), 120),
            closed_trip(&v, at(2, 0), at(2, 6), 80),
            // Starts at the period end: next period.
            closed_trip(&v, at(3, 0), at(3, 5), 999),
            Trip::new(Ulid::new(), v.tenant_id, v.id, Ulid::new(), "A", "B", at(2, 12), 0)
                .with_end_time(at(2, 20))
                .cancel("no load")
                .unwrap(),
        ];
        let r = vehicle_utilization(&v, &trips, at(1, 0), at(3, 0));
        assert_eq!(r.total_trips, 3);
        assert_eq!(r.total_distance, 200);
        assert!((r.total_hours - 12.0).abs() < 1e-9);
        assert!((r.utilization_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn empty_period_has_zero_utilization() {
        let v = van();
        let trips = vec![closed_trip(&v, at(1, 8), at(1, 9), 10)];
        let r = vehicle_utilization(&v, &trips, at(1, 8), at(1, 8));
        assert_eq!(r.total_trips, 0);
        assert_eq!(r.utilization_pct, 0.0);
    }

    #[test]
    fn cost_per_distance_needs_distance() {
        let v = van();
        let fuel = vec![FuelEntry::new(Ulid::new(), v.tenant_id, v.id, at(1, 9), 40.0, 60.0, 1_000, FuelType::Diesel)];
        let service = vec![
            MaintenanceRecord::new(Ulid::new(), v.tenant_id, v.id, ServiceType::Repair, at(2, 9), 1_000).with_cost(140.0),
        ];
        let idle = vehicle_cost(&v, &[], &fuel, &service, at(1, 0), at(4, 0));
        assert_eq!(idle.total_cost, 200.0);
        assert_eq!(idle.cost_per_distance, None);

        let trips = vec![closed_trip(&v, at(1, 8), at(1, 12), 400)];
        let driven = vehicle_cost(&v, &trips, &fuel, &service, at(1, 0), at(4, 0));
        assert_eq!(driven.cost_per_distance, Some(0.5));

        let outside = vehicle_cost(&v, &trips, &fuel, &service, at(10, 0), at(11, 0));
        assert_eq!(outside.total_cost, 0.0);
    }
}
