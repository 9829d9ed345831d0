use chrono::{Datelike, Duration, Months};
use ulid::Ulid;

use crate::auth::{Actor, Permission};
use crate::model::*;
use crate::status::ServiceType;

use super::conflict::now;
use super::{FleetEngine, FleetError};

/// Follow-up derived from a completed service. Both fields are `None` for
/// service types with no recurring schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextService {
    pub due_date: Option<Timestamp>,
    pub due_odometer: Option<u64>,
}

/// (months, distance) until the next service of the same type.
fn interval(service_type: ServiceType) -> (Option<u32>, Option<u64>) {
    match service_type {
        ServiceType::OilChange => (Some(6), Some(10_000)),
        ServiceType::TireRotation => (Some(6), Some(12_000)),
        ServiceType::BrakeService => (Some(12), Some(20_000)),
        ServiceType::Inspection => (Some(12), None),
        ServiceType::Repair | ServiceType::Other => (None, None),
    }
}

/// Calendar months forward, normalizing day overflow into the following
/// month: Aug 31 + 6 months is Mar 3 (Feb 31 rolled over), not Feb 28.
fn add_months_normalized(date: Timestamp, months: u32) -> Option<Timestamp> {
    let overflow_days = i64::from(date.day0());
    date.with_day(1)?
        .checked_add_months(Months::new(months))?
        .checked_add_signed(Duration::days(overflow_days))
}

pub fn predict_next_service(service_type: ServiceType, service_date: Timestamp, odometer: u64) -> NextService {
    let (months, distance) = interval(service_type);
    NextService {
        due_date: months.and_then(|m| add_months_normalized(service_date, m)),
        due_odometer: distance.map(|d| odometer.saturating_add(d)),
    }
}

impl FleetEngine {
    /// Persist a service record with its predicted follow-up. Any next-due
    /// values on the incoming record are replaced.
    pub async fn record_maintenance(
        &self,
        actor: &Actor,
        record: MaintenanceRecord,
    ) -> Result<MaintenanceRecord, FleetError> {
        self.authorize(actor, Permission::MaintenanceCreate).await?;
        self.ensure_tenant("maintenance record", record.id, record.tenant_id)?;
        if !record.cost.is_finite() || record.cost < 0.0 {
            return Err(FleetError::InvariantViolation(format!(
                "maintenance cost must be non-negative, got {}",
                record.cost
            )));
        }
        self.load_vehicle(record.vehicle_id).await?;

        let next = predict_next_service(record.service_type, record.service_date, record.odometer);
        let record = record.with_next_service(next.due_date, next.due_odometer);
        self.store
            .insert_maintenance(&record)
            .await
            .map_err(FleetError::store("record maintenance"))?;

        tracing::info!(
            tenant_id = %self.tenant_id(),
            vehicle_id = %record.vehicle_id,
            service_type = %record.service_type,
            "maintenance recorded"
        );
        self.publish(Event::MaintenanceRecorded { record: record.clone() });
        Ok(record)
    }

    pub async fn maintenance_by_vehicle(
        &self,
        actor: &Actor,
        vehicle_id: Ulid,
    ) -> Result<Vec<MaintenanceRecord>, FleetError> {
        self.authorize(actor, Permission::MaintenanceRead).await?;
        self.store
            .maintenance_by_vehicle(self.tenant_id(), vehicle_id)
            .await
            .map_err(FleetError::store("list maintenance"))
    }

    /// Records whose next-due date has passed.
    pub async fn due_maintenance(&self, actor: &Actor) -> Result<Vec<MaintenanceRecord>, FleetError> {
        self.authorize(actor, Permission::MaintenanceRead).await?;
        self.store
            .due_maintenance(self.tenant_id(), now())
            .await
            .map_err(FleetError::store("list due maintenance"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn oil_change_six_months_ten_thousand() {
        let next = predict_next_service(ServiceType::OilChange, date(2025, 1, 1), 50_000);
        assert_eq!(next.due_date, Some(date(2025, 7, 1)));
        assert_eq!(next.due_odometer, Some(60_000));
    }

    #[test]
    fn rule_table() {
        let d = date(2025, 3, 15);
        let tires = predict_next_service(ServiceType::TireRotation, d, 1_000);
        assert_eq!(tires.due_date, Some(date(2025, 9, 15)));
        assert_eq!(tires.due_odometer, Some(13_000));

        let brakes = predict_next_service(ServiceType::BrakeService, d, 1_000);
        assert_eq!(brakes.due_date, Some(date(2026, 3, 15)));
        assert_eq!(brakes.due_odometer, Some(21_000));

        let inspection = predict_next_service(ServiceType::Inspection, d, 1_000);
        assert_eq!(inspection.due_date, Some(date(2026, 3, 15)));
        assert_eq!(inspection.due_odometer, None);
    }

    #[test]
    fn repair_and_other_have_no_follow_up() {
        for st in [ServiceType::Repair, ServiceType::Other] {
            let next = predict_next_service(st, date(2025, 1, 1), 50_000);
            assert_eq!(next, NextService { due_date: None, due_odometer: None });
        }
    }

    #[test]
    fn month_end_overflow_rolls_forward() {
        let next = predict_next_service(ServiceType::OilChange, date(2025, 8, 31), 0);
        assert_eq!(next.due_date, Some(date(2026, 3, 3)));

        let leap = predict_next_service(ServiceType::Inspection, date(2024, 2, 29), 0);
        assert_eq!(leap.due_date, Some(date(2025, 3, 1)));

        let fits = predict_next_service(ServiceType::TireRotation, date(2025, 1, 31), 0);
        assert_eq!(fits.due_date, Some(date(2025, 7, 31)));
    }
}
