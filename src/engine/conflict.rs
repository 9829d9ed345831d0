use chrono::Utc;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{FleetEngine, FleetError};

pub(crate) fn now() -> Timestamp {
    Utc::now()
}

pub(crate) fn validate_trip_fields(trip: &Trip) -> Result<(), FleetError> {
    if trip.origin.len() > MAX_PLACE_LEN || trip.destination.len() > MAX_PLACE_LEN {
        return Err(FleetError::LimitExceeded("origin/destination too long"));
    }
    if trip.purpose.len() > MAX_PURPOSE_LEN {
        return Err(FleetError::LimitExceeded("purpose too long"));
    }
    if let Some(end) = trip.end_time
        && end < trip.start_time
    {
        return Err(FleetError::InvariantViolation(format!(
            "end time {end} is before start time {}",
            trip.start_time
        )));
    }
    if let Some(end_odometer) = trip.end_odometer
        && end_odometer < trip.start_odometer
    {
        return Err(FleetError::InvariantViolation(format!(
            "end odometer {end_odometer} is below start odometer {}",
            trip.start_odometer
        )));
    }
    Ok(())
}

fn occupies(trip: &Trip, window: &Span, exclude: Option<Ulid>) -> bool {
    trip.holds_vehicle() && Some(trip.id) != exclude && trip.effective_window().intersects(window)
}

/// First trip on `vehicle_id` that still holds the vehicle and whose
/// effective window intersects `window`, skipping `exclude`.
pub fn find_conflict<'a>(
    trips: impl IntoIterator<Item = &'a Trip>,
    vehicle_id: Ulid,
    window: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Trip> {
    trips
        .into_iter()
        .find(|t| t.vehicle_id == vehicle_id && occupies(t, window, exclude))
}

/// Same overlap rule as [`find_conflict`], keyed on the driver.
pub fn find_driver_conflict<'a>(
    trips: impl IntoIterator<Item = &'a Trip>,
    driver_id: Ulid,
    window: &Span,
) -> Option<&'a Trip> {
    trips
        .into_iter()
        .find(|t| t.driver_id == driver_id && occupies(t, window, None))
}

impl FleetEngine {
    /// Whether booking `vehicle_id` for `[start, end]` would double-book it.
    /// `exclude` skips an already persisted trip during re-validation.
    pub async fn has_conflict(
        &self,
        vehicle_id: Ulid,
        start: Timestamp,
        end: Timestamp,
        exclude: Option<Ulid>,
    ) -> Result<bool, FleetError> {
        if end < start {
            return Err(FleetError::InvariantViolation(format!(
                "window end {end} is before start {start}"
            )));
        }
        self.store
            .check_conflict(self.tenant_id(), vehicle_id, Span::new(start, end), exclude)
            .await
            .map_err(FleetError::store("check for conflicts"))
    }
}
