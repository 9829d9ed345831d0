use ulid::Ulid;

use crate::auth::{Actor, Permission};
use crate::model::*;
use crate::status::VehicleStatus;

use super::{FleetEngine, FleetError};

impl FleetEngine {
    pub async fn get_vehicle(&self, actor: &Actor, vehicle_id: Ulid) -> Result<Vehicle, FleetError> {
        self.authorize(actor, Permission::VehicleRead).await?;
        self.load_vehicle(vehicle_id).await
    }

    pub async fn vehicles(&self, actor: &Actor) -> Result<Vec<Vehicle>, FleetError> {
        self.authorize(actor, Permission::VehicleRead).await?;
        self.store
            .vehicles(self.tenant_id())
            .await
            .map_err(FleetError::store("list vehicles"))
    }

    /// Manual status change (workshop intake, decommissioning). Goes through
    /// the transition table; a same-state request is a no-op.
    ///
    /// A vehicle cannot be retired while a Scheduled or InProgress trip still
    /// holds it: Retired is terminal, so that trip could never release it.
    pub async fn update_vehicle_status(
        &self,
        actor: &Actor,
        vehicle_id: Ulid,
        target: VehicleStatus,
    ) -> Result<Vehicle, FleetError> {
        self.authorize(actor, Permission::VehicleUpdate).await?;
        let _guard = self.lock_vehicle(vehicle_id).await;

        let vehicle = self.load_vehicle(vehicle_id).await?;
        let updated = vehicle.transition_to(target)?;
        if updated.status == vehicle.status {
            return Ok(vehicle);
        }
        if updated.status.is_terminal() {
            let trips = self
                .store
                .trips_by_vehicle(self.tenant_id(), vehicle_id)
                .await
                .map_err(FleetError::store("list trips by vehicle"))?;
            if let Some(active) = trips.iter().find(|t| t.holds_vehicle()) {
                return Err(FleetError::ResourceUnavailable(format!(
                    "vehicle {vehicle_id} is still held by {} trip {}",
                    active.status, active.id
                )));
            }
        }
        self.store
            .save_vehicle(&updated)
            .await
            .map_err(FleetError::store("update vehicle"))?;

        tracing::info!(
            tenant_id = %self.tenant_id(),
            vehicle_id = %vehicle_id,
            from = %vehicle.status,
            to = %updated.status,
            "vehicle status changed"
        );
        self.publish_vehicle_change(&vehicle, &updated);
        Ok(updated)
    }
}
