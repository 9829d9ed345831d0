//! Background compliance checks and their scheduler wiring.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use ulid::Ulid;

use crate::auth::{Actor, Permission};
use crate::limits::{DEFAULT_EXPIRY_WINDOW_DAYS, DEFAULT_JOB_INTERVAL_SECS};
use crate::model::*;
use crate::scheduler::{Job, Scheduler};
use crate::tenant::TenantManager;

use super::conflict::now;
use super::{FleetEngine, FleetError};

pub const LICENSE_EXPIRY_JOB: &str = "check_expiring_licenses";
pub const REGISTRATION_EXPIRY_JOB: &str = "check_expiring_registrations";
pub const INSURANCE_EXPIRY_JOB: &str = "check_expiring_insurance";
pub const MAINTENANCE_DUE_JOB: &str = "check_due_maintenance";

#[derive(Debug, Clone, Copy)]
pub struct FleetJobConfig {
    pub interval: Duration,
    pub expiry_window_days: i64,
}

impl Default for FleetJobConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_JOB_INTERVAL_SECS),
            expiry_window_days: DEFAULT_EXPIRY_WINDOW_DAYS,
        }
    }
}

fn days_until(at: Timestamp, now: Timestamp) -> i64 {
    (at - now).num_days()
}

impl FleetEngine {
    fn alert(&self, kind: NotificationKind, subject_id: Ulid, title: String, message: String, data: serde_json::Value) -> Notification {
        Notification {
            id: Ulid::new(),
            tenant_id: self.tenant_id(),
            kind,
            subject_id,
            title,
            message,
            data,
            created_at: now(),
        }
    }

    fn publish_alerts(&self, kind: NotificationKind, alerts: Vec<Notification>) -> usize {
        let n = alerts.len();
        for alert in alerts {
            self.publish(Event::Alert(alert));
        }
        if n > 0 {
            tracing::info!(tenant_id = %self.tenant_id(), kind = kind.as_str(), count = n, "alerts published");
        }
        n
    }

    /// Drivers whose license expires within `days`. Returns the number of
    /// alerts published.
    pub async fn check_expiring_licenses(&self, actor: &Actor, days: i64) -> Result<usize, FleetError> {
        self.authorize(actor, Permission::DriverRead).await?;
        let now = now();
        let drivers = self
            .store
            .expiring_licenses(self.tenant_id(), now, days)
            .await
            .map_err(FleetError::store("list expiring licenses"))?;
        let alerts = drivers
            .iter()
            .map(|d| {
                let left = days_until(d.license_expiry, now);
                self.alert(
                    NotificationKind::LicenseExpiry,
                    d.id,
                    "Driver license expiring".into(),
                    format!("License {} of {} expires in {left} days", d.license_number, d.full_name()),
                    json!({
                        "driver_id": d.id.to_string(),
                        "license_number": d.license_number,
                        "expiry_date": d.license_expiry.to_rfc3339(),
                        "days_left": left,
                    }),
                )
            })
            .collect();
        Ok(self.publish_alerts(NotificationKind::LicenseExpiry, alerts))
    }

    pub async fn check_expiring_registrations(&self, actor: &Actor, days: i64) -> Result<usize, FleetError> {
        self.authorize(actor, Permission::VehicleRead).await?;
        let now = now();
        let vehicles = self
            .store
            .expiring_registrations(self.tenant_id(), now, days)
            .await
            .map_err(FleetError::store("list expiring registrations"))?;
        let alerts = vehicles
            .iter()
            .map(|v| {
                let left = days_until(v.registration_expiry, now);
                self.alert(
                    NotificationKind::RegistrationExpiry,
                    v.id,
                    "Vehicle registration expiring".into(),
                    format!("Registration of {} ({}) expires in {left} days", v.display_name(), v.license_plate),
                    json!({
                        "vehicle_id": v.id.to_string(),
                        "license_plate": v.license_plate,
                        "expiry_date": v.registration_expiry.to_rfc3339(),
                        "days_left": left,
                    }),
                )
            })
            .collect();
        Ok(self.publish_alerts(NotificationKind::RegistrationExpiry, alerts))
    }

    pub async fn check_expiring_insurance(&self, actor: &Actor, days: i64) -> Result<usize, FleetError> {
        self.authorize(actor, Permission::VehicleRead).await?;
        let now = now();
        let vehicles = self
            .store
            .expiring_insurance(self.tenant_id(), now, days)
            .await
            .map_err(FleetError::store("list expiring insurance"))?;
        let alerts = vehicles
            .iter()
            .map(|v| {
                let left = days_until(v.insurance_expiry, now);
                self.alert(
                    NotificationKind::InsuranceExpiry,
                    v.id,
                    "Vehicle insurance expiring".into(),
                    format!("Insurance of {} ({}) expires in {left} days", v.display_name(), v.license_plate),
                    json!({
                        "vehicle_id": v.id.to_string(),
                        "license_plate": v.license_plate,
                        "expiry_date": v.insurance_expiry.to_rfc3339(),
                        "days_left": left,
                    }),
                )
            })
            .collect();
        Ok(self.publish_alerts(NotificationKind::InsuranceExpiry, alerts))
    }

    /// Services whose next-due date has passed. The alert subject is the vehicle.
    pub async fn check_due_maintenance(&self, actor: &Actor) -> Result<usize, FleetError> {
        self.authorize(actor, Permission::MaintenanceRead).await?;
        let now = now();
        let due = self
            .store
            .due_maintenance(self.tenant_id(), now)
            .await
            .map_err(FleetError::store("list due maintenance"))?;
        let alerts = due
            .iter()
            .map(|r| {
                self.alert(
                    NotificationKind::MaintenanceDue,
                    r.vehicle_id,
                    "Maintenance due".into(),
                    format!("{} is due for vehicle {}", r.service_type, r.vehicle_id),
                    json!({
                        "vehicle_id": r.vehicle_id.to_string(),
                        "maintenance_id": r.id.to_string(),
                        "service_type": r.service_type.as_str(),
                        "due_date": r.next_due_date.map(|d| d.to_rfc3339()),
                        "due_odometer": r.next_due_odometer,
                    }),
                )
            })
            .collect();
        Ok(self.publish_alerts(NotificationKind::MaintenanceDue, alerts))
    }
}

/// A compliance check run as the system actor against one tenant's engine.
/// A run that starts after the scheduler was stopped is skipped.
fn fleet_job<F, Fut>(name: &'static str, interval: Duration, tenants: Arc<TenantManager>, check: F) -> Job
where
    F: Fn(Arc<FleetEngine>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<usize, FleetError>> + Send + 'static,
{
    Job::new(name, interval, move |cancel, tenant| {
        let tenants = tenants.clone();
        let check = check.clone();
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let published = check(tenants.get_or_create(tenant)?).await?;
            tracing::debug!(job = name, tenant_id = %tenant, published, "compliance check finished");
            Ok::<(), FleetError>(())
        })
    })
}

/// Register the four daily compliance checks. Each one resolves the tenant's
/// engine through `tenants`.
pub fn register_fleet_jobs(
    scheduler: &mut Scheduler,
    tenants: Arc<TenantManager>,
    config: FleetJobConfig,
) -> Result<(), FleetError> {
    let days = config.expiry_window_days;
    let every = config.interval;

    scheduler.register(fleet_job(LICENSE_EXPIRY_JOB, every, tenants.clone(), move |engine| async move {
        engine.check_expiring_licenses(&Actor::System, days).await
    }))?;
    scheduler.register(fleet_job(REGISTRATION_EXPIRY_JOB, every, tenants.clone(), move |engine| async move {
        engine.check_expiring_registrations(&Actor::System, days).await
    }))?;
    scheduler.register(fleet_job(INSURANCE_EXPIRY_JOB, every, tenants.clone(), move |engine| async move {
        engine.check_expiring_insurance(&Actor::System, days).await
    }))?;
    scheduler.register(fleet_job(MAINTENANCE_DUE_JOB, every, tenants, |engine| async move {
        engine.check_due_maintenance(&Actor::System).await
    }))?;
    Ok(())
}
