use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::FleetError;
use crate::limits::DEFAULT_TRIP_WINDOW_HOURS;
use crate::status::*;

pub type Timestamp = DateTime<Utc>;
pub type TenantId = Ulid;

/// Time interval `[start, end]` on a vehicle's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start <= end, "Span start must not be after end");
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Booking overlap test. Touching endpoints count: a trip ending at
    /// 12:00 and another starting at 12:00 share the handover instant.
    pub fn intersects(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_instant(&self, t: Timestamp) -> bool {
        self.start <= t && t <= self.end
    }
}

// ── Vehicle ──────────────────────────────────────────────────────

/// Snapshot of a vehicle. Every `with_*` / `transition_to` returns a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Ulid,
    pub tenant_id: TenantId,
    pub make: String,
    pub model: String,
    pub license_plate: String,
    pub status: VehicleStatus,
    pub odometer: u64,
    pub registration_expiry: Timestamp,
    pub insurance_expiry: Timestamp,
    pub updated_at: Timestamp,
}

impl Vehicle {
    pub fn new(
        id: Ulid,
        tenant_id: TenantId,
        make: impl Into<String>,
        model: impl Into<String>,
        license_plate: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            tenant_id,
            make: make.into(),
            model: model.into(),
            license_plate: license_plate.into(),
            status: VehicleStatus::Available,
            odometer: 0,
            registration_expiry: now,
            insurance_expiry: now,
            updated_at: now,
        }
    }

    pub fn with_status(self, status: VehicleStatus) -> Self {
        Self { status, ..self }
    }

    pub fn with_odometer(self, odometer: u64) -> Self {
        Self { odometer, ..self }
    }

    pub fn with_registration_expiry(self, registration_expiry: Timestamp) -> Self {
        Self {
            registration_expiry,
            ..self
        }
    }

    pub fn with_insurance_expiry(self, insurance_expiry: Timestamp) -> Self {
        Self {
            insurance_expiry,
            ..self
        }
    }

    /// New snapshot in `target` state, or `InvalidTransition`.
    pub fn transition_to(&self, target: VehicleStatus) -> Result<Vehicle, FleetError> {
        let status = self.status.transition_to(target)?;
        Ok(Vehicle {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        })
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.make, self.model)
    }
}

// ── Driver ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: Ulid,
    pub tenant_id: TenantId,
    pub first_name: String,
    pub last_name: String,
    pub license_number: String,
    pub license_expiry: Timestamp,
    pub status: DriverStatus,
}

impl Driver {
    pub fn new(
        id: Ulid,
        tenant_id: TenantId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        license_number: impl Into<String>,
        license_expiry: Timestamp,
    ) -> Self {
        Self {
            id,
            tenant_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            license_number: license_number.into(),
            license_expiry,
            status: DriverStatus::Active,
        }
    }

    pub fn with_status(self, status: DriverStatus) -> Self {
        Self { status, ..self }
    }

    pub fn with_license(self, license_number: impl Into<String>, license_expiry: Timestamp) -> Self {
        Self {
            license_number: license_number.into(),
            license_expiry,
            ..self
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn license_expired(&self, now: Timestamp) -> bool {
        self.license_expiry < now
    }

    /// A driver takes new trips only while Active with a valid license.
    pub fn ensure_assignable(&self, now: Timestamp) -> Result<(), FleetError> {
        if self.status != DriverStatus::Active {
            return Err(FleetError::ResourceUnavailable(format!(
                "driver {} is {}",
                self.id, self.status
            )));
        }
        if self.license_expired(now) {
            return Err(FleetError::ResourceUnavailable(format!(
                "driver {} license expired on {}",
                self.id,
                self.license_expiry.format("%Y-%m-%d")
            )));
        }
        Ok(())
    }
}

// ── Trip ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Ulid,
    pub tenant_id: TenantId,
    pub vehicle_id: Ulid,
    pub driver_id: Ulid,
    pub origin: String,
    pub destination: String,
    pub purpose: String,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    pub start_odometer: u64,
    pub end_odometer: Option<u64>,
    pub status: TripStatus,
    /// Soft-delete marker; deleted trips never hold their vehicle.
    pub deleted: bool,
}

impl Trip {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Ulid,
        tenant_id: TenantId,
        vehicle_id: Ulid,
        driver_id: Ulid,
        origin: impl Into<String>,
        destination: impl Into<String>,
        start_time: Timestamp,
        start_odometer: u64,
    ) -> Self {
        Self {
            id,
            tenant_id,
            vehicle_id,
            driver_id,
            origin: origin.into(),
            destination: destination.into(),
            purpose: String::new(),
            start_time,
            end_time: None,
            start_odometer,
            end_odometer: None,
            status: TripStatus::Scheduled,
            deleted: false,
        }
    }

    pub fn with_end_time(self, end_time: Timestamp) -> Self {
        Self {
            end_time: Some(end_time),
            ..self
        }
    }

    pub fn with_purpose(self, purpose: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            ..self
        }
    }

    pub fn with_status(self, status: TripStatus) -> Self {
        Self { status, ..self }
    }

    /// `[start, end ?? start + 24h]`.
    pub fn effective_window(&self) -> Span {
        Span::new(self.start_time, effective_end(self.start_time, self.end_time))
    }

    /// Whether this trip currently blocks its vehicle for conflict purposes.
    pub fn holds_vehicle(&self) -> bool {
        !self.deleted && self.status.is_active()
    }

    pub fn start(&self) -> Result<Trip, FleetError> {
        let status = self.status.transition_to(TripStatus::InProgress)?;
        Ok(Trip {
            status,
            ..self.clone()
        })
    }

    pub fn complete(&self, end_time: Timestamp, end_odometer: u64) -> Result<Trip, FleetError> {
        let status = self.status.transition_to(TripStatus::Completed)?;
        if end_odometer < self.start_odometer {
            return Err(FleetError::InvariantViolation(format!(
                "end odometer {end_odometer} is below start odometer {}",
                self.start_odometer
            )));
        }
        if end_time < self.start_time {
            return Err(FleetError::InvariantViolation(format!(
                "end time {end_time} is before start time {}",
                self.start_time
            )));
        }
        Ok(Trip {
            status,
            end_time: Some(end_time),
            end_odometer: Some(end_odometer),
            ..self.clone()
        })
    }

    /// The reason replaces the trip's purpose.
    pub fn cancel(&self, reason: impl Into<String>) -> Result<Trip, FleetError> {
        let status = self.status.transition_to(TripStatus::Cancelled)?;
        Ok(Trip {
            status,
            purpose: reason.into(),
            ..self.clone()
        })
    }

    pub fn statistics(&self) -> Option<TripStatistics> {
        let end_time = self.end_time?;
        let end_odometer = self.end_odometer?;
        let duration_hours = (end_time - self.start_time).num_seconds() as f64 / 3600.0;
        let distance = end_odometer.saturating_sub(self.start_odometer);
        let average_speed = (duration_hours > 0.0).then(|| distance as f64 / duration_hours);
        Some(TripStatistics {
            duration_hours,
            distance,
            average_speed,
        })
    }
}

pub fn effective_end(start: Timestamp, end: Option<Timestamp>) -> Timestamp {
    end.unwrap_or_else(|| start + Duration::hours(DEFAULT_TRIP_WINDOW_HOURS))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripStatistics {
    pub duration_hours: f64,
    pub distance: u64,
    pub average_speed: Option<f64>,
}

// ── Maintenance ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: Ulid,
    pub tenant_id: TenantId,
    pub vehicle_id: Ulid,
    pub service_type: ServiceType,
    pub service_date: Timestamp,
    pub odometer: u64,
    pub cost: f64,
    pub description: String,
    pub next_due_date: Option<Timestamp>,
    pub next_due_odometer: Option<u64>,
}

impl MaintenanceRecord {
    pub fn new(
        id: Ulid,
        tenant_id: TenantId,
        vehicle_id: Ulid,
        service_type: ServiceType,
        service_date: Timestamp,
        odometer: u64,
    ) -> Self {
        Self {
            id,
            tenant_id,
            vehicle_id,
            service_type,
            service_date,
            odometer,
            cost: 0.0,
            description: String::new(),
            next_due_date: None,
            next_due_odometer: None,
        }
    }

    pub fn with_cost(self, cost: f64) -> Self {
        Self { cost, ..self }
    }

    pub fn with_next_service(self, next_due_date: Option<Timestamp>, next_due_odometer: Option<u64>) -> Self {
        Self {
            next_due_date,
            next_due_odometer,
            ..self
        }
    }
}

// ── Fuel ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelEntry {
    pub id: Ulid,
    pub tenant_id: TenantId,
    pub vehicle_id: Ulid,
    pub driver_id: Option<Ulid>,
    pub date: Timestamp,
    pub quantity: f64,
    pub cost: f64,
    pub odometer: u64,
    pub fuel_type: FuelType,
}

impl FuelEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Ulid,
        tenant_id: TenantId,
        vehicle_id: Ulid,
        date: Timestamp,
        quantity: f64,
        cost: f64,
        odometer: u64,
        fuel_type: FuelType,
    ) -> Self {
        Self {
            id,
            tenant_id,
            vehicle_id,
            driver_id: None,
            date,
            quantity,
            cost,
            odometer,
            fuel_type,
        }
    }

    pub fn with_driver(self, driver_id: Ulid) -> Self {
        Self {
            driver_id: Some(driver_id),
            ..self
        }
    }

    /// Distance per unit of fuel since `previous_odometer`; zero when the
    /// odometer did not advance or no fuel was recorded.
    pub fn efficiency_since(&self, previous_odometer: u64) -> f64 {
        if previous_odometer >= self.odometer || self.quantity <= 0.0 {
            return 0.0;
        }
        (self.odometer - previous_odometer) as f64 / self.quantity
    }

    /// Chronological order: date, then odometer.
    pub fn chronological_key(&self) -> (Timestamp, u64) {
        (self.date, self.odometer)
    }
}

// ── Notifications ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    LicenseExpiry,
    RegistrationExpiry,
    InsuranceExpiry,
    MaintenanceDue,
    FuelAnomaly,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::LicenseExpiry => "license_expiry",
            NotificationKind::RegistrationExpiry => "registration_expiry",
            NotificationKind::InsuranceExpiry => "insurance_expiry",
            NotificationKind::MaintenanceDue => "maintenance_due",
            NotificationKind::FuelAnomaly => "fuel_anomaly",
        }
    }
}

/// A user-facing alert produced by the background checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Ulid,
    pub tenant_id: TenantId,
    pub kind: NotificationKind,
    /// Driver, vehicle, or maintenance record the alert is about.
    pub subject_id: Ulid,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub created_at: Timestamp,
}

/// Everything the core publishes to the notification sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    TripCreated { trip: Trip },
    TripStarted { trip: Trip },
    TripCompleted { trip: Trip },
    TripCancelled { trip: Trip, reason: String },
    TripDeleted { trip_id: Ulid, vehicle_id: Ulid },
    VehicleStatusChanged {
        vehicle_id: Ulid,
        from: VehicleStatus,
        to: VehicleStatus,
    },
    MaintenanceRecorded { record: MaintenanceRecord },
    FuelEntryRecorded { entry: FuelEntry },
    Alert(Notification),
}

impl Event {
    /// The entity whose subscribers should hear about this event.
    pub fn subject_id(&self) -> Ulid {
        match self {
            Event::TripCreated { trip }
            | Event::TripStarted { trip }
            | Event::TripCompleted { trip }
            | Event::TripCancelled { trip, .. } => trip.vehicle_id,
            Event::TripDeleted { vehicle_id, .. } => *vehicle_id,
            Event::VehicleStatusChanged { vehicle_id, .. } => *vehicle_id,
            Event::MaintenanceRecorded { record } => record.vehicle_id,
            Event::FuelEntryRecorded { entry } => entry.vehicle_id,
            Event::Alert(n) => n.subject_id,
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Event::TripCreated { .. } => "trip_created",
            Event::TripStarted { .. } => "trip_started",
            Event::TripCompleted { .. } => "trip_completed",
            Event::TripCancelled { .. } => "trip_cancelled",
            Event::TripDeleted { .. } => "trip_deleted",
            Event::VehicleStatusChanged { .. } => "vehicle_status_changed",
            Event::MaintenanceRecorded { .. } => "maintenance_recorded",
            Event::FuelEntryRecorded { .. } => "fuel_entry_recorded",
            Event::Alert(n) => n.kind.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 1, 10, h, m, 0).unwrap()
    }

    fn trip(start: Timestamp, end: Option<Timestamp>) -> Trip {
        let t = Trip::new(Ulid::new(), Ulid::new(), Ulid::new(), Ulid::new(), "Depot", "Port", start, 1000);
        match end {
            Some(e) => t.with_end_time(e),
            None => t,
        }
    }

    #[test]
    fn span_intersects_is_inclusive() {
        let a = Span::new(at(8, 0), at(12, 0));
        let b = Span::new(at(11, 0), at(14, 0));
        let touching = Span::new(at(12, 0), at(13, 0));
        let later = Span::new(at(12, 1), at(13, 0));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(a.intersects(&touching));
        assert!(!a.intersects(&later));
    }

    #[test]
    fn span_containment() {
        let s = Span::new(at(8, 0), at(9, 0));
        assert_eq!(s.duration(), Duration::hours(1));
        assert!(s.contains_instant(at(8, 0)));
        assert!(s.contains_instant(at(9, 0)));
        assert!(!s.contains_instant(at(9, 1)));
    }

    #[test]
    fn open_trip_occupies_a_day() {
        let t = trip(at(8, 0), None);
        let w = t.effective_window();
        assert_eq!(w.start, at(8, 0));
        assert_eq!(w.end, at(8, 0) + Duration::hours(24));

        let closed = trip(at(8, 0), Some(at(12, 0)));
        assert_eq!(closed.effective_window().end, at(12, 0));
    }

    #[test]
    fn complete_rejects_odometer_rollback() {
        let t = trip(at(8, 0), None);
        let err = t.complete(at(12, 0), 999).unwrap_err();
        assert!(matches!(err, FleetError::InvariantViolation(_)));
        let done = t.complete(at(12, 0), 1200).unwrap();
        assert_eq!(done.status, TripStatus::Completed);
        assert_eq!(done.end_odometer, Some(1200));
        // Original snapshot untouched.
        assert_eq!(t.status, TripStatus::Scheduled);
        assert_eq!(t.end_odometer, None);
    }

    #[test]
    fn complete_rejects_end_before_start() {
        let t = trip(at(8, 0), None);
        let err = t.complete(at(7, 0), 1200).unwrap_err();
        assert!(matches!(err, FleetError::InvariantViolation(_)));
    }

    #[test]
    fn cancel_stores_reason_as_purpose() {
        let t = trip(at(8, 0), None).with_purpose("delivery");
        let c = t.cancel("customer no-show").unwrap();
        assert_eq!(c.status, TripStatus::Cancelled);
        assert_eq!(c.purpose, "customer no-show");
        assert!(!c.holds_vehicle());
        assert!(c.cancel("again").is_err());
    }

    #[test]
    fn statistics_need_end_values() {
        let t = trip(at(8, 0), None);
        assert!(t.statistics().is_none());
        let done = t.complete(at(10, 0), 1120).unwrap();
        let stats = done.statistics().unwrap();
        assert_eq!(stats.distance, 120);
        assert!((stats.duration_hours - 2.0).abs() < 1e-9);
        assert!((stats.average_speed.unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn vehicle_transition_returns_new_snapshot() {
        let v = Vehicle::new(Ulid::new(), Ulid::new(), "Volvo", "FH16", "AB-123");
        let in_use = v.transition_to(VehicleStatus::InUse).unwrap();
        assert_eq!(v.status, VehicleStatus::Available);
        assert_eq!(in_use.status, VehicleStatus::InUse);
        let retired = v.transition_to(VehicleStatus::Retired).unwrap();
        assert!(retired.transition_to(VehicleStatus::Available).is_err());
    }

    #[test]
    fn driver_eligibility() {
        let now = at(8, 0);
        let d = Driver::new(Ulid::new(), Ulid::new(), "Ada", "Lovelace", "L-1", now + Duration::days(10));
        assert!(d.ensure_assignable(now).is_ok());
        let expired = d.clone().with_license("L-1", now - Duration::days(1));
        assert!(matches!(
            expired.ensure_assignable(now),
            Err(FleetError::ResourceUnavailable(_))
        ));
        let on_leave = d.with_status(DriverStatus::OnLeave);
        assert!(matches!(
            on_leave.ensure_assignable(now),
            Err(FleetError::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn fuel_efficiency_guards() {
        let e = FuelEntry::new(Ulid::new(), Ulid::new(), Ulid::new(), at(8, 0), 40.0, 60.0, 10_400, FuelType::Diesel);
        assert!((e.efficiency_since(10_000) - 10.0).abs() < 1e-9);
        assert_eq!(e.efficiency_since(10_400), 0.0);
        assert_eq!(e.efficiency_since(11_000), 0.0);
    }

    #[test]
    fn event_subject_is_vehicle_for_trips() {
        let t = trip(at(8, 0), None);
        let vid = t.vehicle_id;
        assert_eq!(Event::TripCreated { trip: t }.subject_id(), vid);
    }
}
