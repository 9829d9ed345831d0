use ulid::Ulid;

use crate::auth::{Actor, Permission};
use crate::limits::MAX_PURPOSE_LEN;
use crate::model::*;
use crate::observability::{SCHEDULING_CONFLICTS_TOTAL, TRIPS_CREATED_TOTAL, TRIP_TRANSITIONS_TOTAL};
use crate::repository::StoreError;
use crate::status::{TripStatus, VehicleStatus};

use super::conflict::{now, validate_trip_fields};
use super::{FleetEngine, FleetError};

fn count_transition(to: TripStatus) {
    metrics::counter!(TRIP_TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
}

fn conflict(vehicle_id: Ulid) -> FleetError {
    metrics::counter!(SCHEDULING_CONFLICTS_TOTAL).increment(1);
    FleetError::SchedulingConflict { vehicle_id }
}

impl FleetEngine {
    /// Book a vehicle and driver for a trip.
    ///
    /// The vehicle lock is held from the eligibility checks until the vehicle
    /// snapshot is written, and the store re-checks overlap on insert, so two
    /// concurrent bookings of one vehicle cannot both land.
    pub async fn create_trip(&self, actor: &Actor, trip: Trip) -> Result<Trip, FleetError> {
        self.authorize(actor, Permission::TripCreate).await?;
        self.ensure_tenant("trip", trip.id, trip.tenant_id)?;
        validate_trip_fields(&trip)?;
        if trip.status != TripStatus::Scheduled || trip.deleted {
            return Err(FleetError::InvariantViolation(format!(
                "new trip must be Scheduled, got {}",
                trip.status
            )));
        }

        let _guard = self.lock_vehicle(trip.vehicle_id).await;

        let vehicle = self.load_vehicle(trip.vehicle_id).await?;
        if !vehicle.status.accepts_trips() {
            return Err(FleetError::ResourceUnavailable(format!(
                "vehicle {} is {}",
                vehicle.id, vehicle.status
            )));
        }
        let driver = self.load_driver(trip.driver_id).await?;
        driver.ensure_assignable(now())?;

        let window = trip.effective_window();
        if self.has_conflict(trip.vehicle_id, window.start, window.end, None).await? {
            tracing::debug!(trip_id = %trip.id, vehicle_id = %trip.vehicle_id, "booking rejected: overlap");
            return Err(conflict(trip.vehicle_id));
        }

        // Computed before any write so an illegal vehicle state leaves nothing behind.
        let in_use = vehicle.transition_to(VehicleStatus::InUse)?;

        self.store.insert_trip(&trip).await.map_err(|e| match e {
            StoreError::Conflict { vehicle_id, .. } => conflict(vehicle_id),
            other => FleetError::store("create trip")(other),
        })?;
        self.store
            .save_vehicle(&in_use)
            .await
            .map_err(FleetError::store("update vehicle"))?;

        metrics::counter!(TRIPS_CREATED_TOTAL).increment(1);
        tracing::info!(
            tenant_id = %self.tenant_id(),
            trip_id = %trip.id,
            vehicle_id = %trip.vehicle_id,
            driver_id = %trip.driver_id,
            "trip created"
        );
        self.publish_vehicle_change(&vehicle, &in_use);
        self.publish(Event::TripCreated { trip: trip.clone() });
        Ok(trip)
    }

    /// Scheduled → InProgress. The vehicle is (re)asserted InUse.
    pub async fn start_trip(&self, actor: &Actor, trip_id: Ulid) -> Result<Trip, FleetError> {
        self.authorize(actor, Permission::TripUpdate).await?;
        let current = self.load_trip(trip_id).await?;
        let _guard = self.lock_vehicle(current.vehicle_id).await;
        // Re-read under the lock; the first read only told us which vehicle to lock.
        let current = self.load_trip(trip_id).await?;

        let started = current.start()?;
        let vehicle = self.load_vehicle(current.vehicle_id).await?;
        let in_use = vehicle.transition_to(VehicleStatus::InUse)?;

        self.store
            .update_trip(&started)
            .await
            .map_err(FleetError::store("start trip"))?;
        self.store
            .save_vehicle(&in_use)
            .await
            .map_err(FleetError::store("update vehicle"))?;

        count_transition(TripStatus::InProgress);
        tracing::info!(tenant_id = %self.tenant_id(), trip_id = %trip_id, "trip started");
        self.publish_vehicle_change(&vehicle, &in_use);
        self.publish(Event::TripStarted { trip: started.clone() });
        Ok(started)
    }

    /// Close a trip, free its vehicle, and carry the odometer forward.
    pub async fn complete_trip(
        &self,
        actor: &Actor,
        trip_id: Ulid,
        end_time: Timestamp,
        end_odometer: u64,
    ) -> Result<Trip, FleetError> {
        self.authorize(actor, Permission::TripUpdate).await?;
        let current = self.load_trip(trip_id).await?;
        let _guard = self.lock_vehicle(current.vehicle_id).await;
        let current = self.load_trip(trip_id).await?;

        let completed = current.complete(end_time, end_odometer)?;
        let vehicle = self.load_vehicle(current.vehicle_id).await?;
        let released = vehicle
            .transition_to(VehicleStatus::Available)?
            .with_odometer(end_odometer);

        self.store
            .update_trip(&completed)
            .await
            .map_err(FleetError::store("complete trip"))?;
        self.store
            .save_vehicle(&released)
            .await
            .map_err(FleetError::store("update vehicle"))?;

        count_transition(TripStatus::Completed);
        tracing::info!(
            tenant_id = %self.tenant_id(),
            trip_id = %trip_id,
            vehicle_id = %completed.vehicle_id,
            end_odometer,
            "trip completed"
        );
        self.publish_vehicle_change(&vehicle, &released);
        self.publish(Event::TripCompleted { trip: completed.clone() });
        Ok(completed)
    }

    /// Cancel a Scheduled or InProgress trip. Only an InProgress trip hands
    /// its vehicle back; a Scheduled one leaves the vehicle status alone.
    pub async fn cancel_trip(&self, actor: &Actor, trip_id: Ulid, reason: &str) -> Result<Trip, FleetError> {
        self.authorize(actor, Permission::TripUpdate).await?;
        if reason.len() > MAX_PURPOSE_LEN {
            return Err(FleetError::LimitExceeded("cancellation reason too long"));
        }
        let current = self.load_trip(trip_id).await?;
        let _guard = self.lock_vehicle(current.vehicle_id).await;
        let current = self.load_trip(trip_id).await?;

        let cancelled = current.cancel(reason)?;
        let vehicle_change = if current.status == TripStatus::InProgress {
            let vehicle = self.load_vehicle(current.vehicle_id).await?;
            let released = vehicle.transition_to(VehicleStatus::Available)?;
            Some((vehicle, released))
        } else {
            None
        };

        self.store
            .update_trip(&cancelled)
            .await
            .map_err(FleetError::store("cancel trip"))?;
        if let Some((_, released)) = &vehicle_change {
            self.store
                .save_vehicle(released)
                .await
                .map_err(FleetError::store("update vehicle"))?;
        }

        count_transition(TripStatus::Cancelled);
        tracing::info!(tenant_id = %self.tenant_id(), trip_id = %trip_id, reason, "trip cancelled");
        if let Some((before, after)) = &vehicle_change {
            self.publish_vehicle_change(before, after);
        }
        self.publish(Event::TripCancelled {
            trip: cancelled.clone(),
            reason: reason.to_string(),
        });
        Ok(cancelled)
    }

    /// Soft delete. The trip disappears from reads and stops holding its vehicle.
    pub async fn delete_trip(&self, actor: &Actor, trip_id: Ulid) -> Result<(), FleetError> {
        self.authorize(actor, Permission::TripDelete).await?;
        let current = self.load_trip(trip_id).await?;
        let _guard = self.lock_vehicle(current.vehicle_id).await;
        let mut deleted = self.load_trip(trip_id).await?;
        deleted.deleted = true;

        self.store
            .update_trip(&deleted)
            .await
            .map_err(FleetError::store("delete trip"))?;

        tracing::info!(tenant_id = %self.tenant_id(), trip_id = %trip_id, "trip deleted");
        self.publish(Event::TripDeleted {
            trip_id,
            vehicle_id: deleted.vehicle_id,
        });
        Ok(())
    }

    pub async fn get_trip(&self, actor: &Actor, trip_id: Ulid) -> Result<Trip, FleetError> {
        self.authorize(actor, Permission::TripRead).await?;
        self.load_trip(trip_id).await
    }

    pub async fn trips_by_vehicle(&self, actor: &Actor, vehicle_id: Ulid) -> Result<Vec<Trip>, FleetError> {
        self.authorize(actor, Permission::TripRead).await?;
        self.store
            .trips_by_vehicle(self.tenant_id(), vehicle_id)
            .await
            .map_err(FleetError::store("list trips by vehicle"))
    }

    pub async fn trips_by_driver(&self, actor: &Actor, driver_id: Ulid) -> Result<Vec<Trip>, FleetError> {
        self.authorize(actor, Permission::TripRead).await?;
        self.store
            .trips_by_driver(self.tenant_id(), driver_id)
            .await
            .map_err(FleetError::store("list trips by driver"))
    }

    /// Scheduled and InProgress trips, oldest start first.
    pub async fn active_trips(&self, actor: &Actor) -> Result<Vec<Trip>, FleetError> {
        self.authorize(actor, Permission::TripRead).await?;
        self.store
            .active_trips(self.tenant_id())
            .await
            .map_err(FleetError::store("list active trips"))
    }

    /// `None` until the trip has both an end time and an end odometer.
    pub async fn trip_statistics(&self, actor: &Actor, trip_id: Ulid) -> Result<Option<TripStatistics>, FleetError> {
        Ok(self.get_trip(actor, trip_id).await?.statistics())
    }

    pub(super) fn publish_vehicle_change(&self, before: &Vehicle, after: &Vehicle) {
        if before.status == after.status {
            return;
        }
        metrics::counter!(crate::observability::VEHICLE_TRANSITIONS_TOTAL, "to" => after.status.as_str())
            .increment(1);
        self.publish(Event::VehicleStatusChanged {
            vehicle_id: after.id,
            from: before.status,
            to: after.status,
        });
    }
}
