use ulid::Ulid;

use crate::auth::{Actor, Permission};
use crate::model::*;

use super::conflict::{find_driver_conflict, now};
use super::{FleetEngine, FleetError};

impl FleetEngine {
    pub async fn get_driver(&self, actor: &Actor, driver_id: Ulid) -> Result<Driver, FleetError> {
        self.authorize(actor, Permission::DriverRead).await?;
        self.load_driver(driver_id).await
    }

    pub async fn drivers(&self, actor: &Actor) -> Result<Vec<Driver>, FleetError> {
        self.authorize(actor, Permission::DriverRead).await?;
        self.store
            .drivers(self.tenant_id())
            .await
            .map_err(FleetError::store("list drivers"))
    }

    /// Drivers who could take a trip over `[start, end]`: assignable today and
    /// not on any Scheduled or InProgress trip whose effective window touches
    /// it. Sorted by name.
    pub async fn available_drivers(
        &self,
        actor: &Actor,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Driver>, FleetError> {
        self.authorize(actor, Permission::DriverRead).await?;
        if end < start {
            return Err(FleetError::InvariantViolation(format!(
                "window end {end} is before start {start}"
            )));
        }
        let window = Span::new(start, end);
        let now = now();

        let drivers = self
            .store
            .drivers(self.tenant_id())
            .await
            .map_err(FleetError::store("list drivers"))?;
        let active = self
            .store
            .active_trips(self.tenant_id())
            .await
            .map_err(FleetError::store("list active trips"))?;

        let mut free: Vec<Driver> = drivers
            .into_iter()
            .filter(|d| d.ensure_assignable(now).is_ok())
            .filter(|d| find_driver_conflict(&active, d.id, &window).is_none())
            .collect();
        free.sort_by(|a, b| (&a.first_name, &a.last_name).cmp(&(&b.first_name, &b.last_name)));
        Ok(free)
    }
}
