use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::FleetError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

impl ParseStatusError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ── Vehicle ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleStatus {
    Available,
    InUse,
    Maintenance,
    OutOfService,
    Retired,
}

impl VehicleStatus {
    pub const ALL: [VehicleStatus; 5] = [
        VehicleStatus::Available,
        VehicleStatus::InUse,
        VehicleStatus::Maintenance,
        VehicleStatus::OutOfService,
        VehicleStatus::Retired,
    ];

    /// Directional transition table. Identity is handled by `can_transition_to`.
    pub fn targets(self) -> &'static [VehicleStatus] {
        use VehicleStatus::*;
        match self {
            Available => &[InUse, Maintenance, OutOfService, Retired],
            InUse => &[Available, Maintenance, OutOfService],
            Maintenance => &[Available, OutOfService, Retired],
            OutOfService => &[Available, Maintenance, Retired],
            Retired => &[],
        }
    }

    pub fn can_transition_to(self, target: VehicleStatus) -> bool {
        self == target || self.targets().contains(&target)
    }

    pub fn transition_to(self, target: VehicleStatus) -> Result<VehicleStatus, FleetError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(FleetError::InvalidTransition {
                entity: "vehicle",
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        self.targets().is_empty()
    }

    /// Whether a new trip may be booked on a vehicle in this state.
    pub fn accepts_trips(self) -> bool {
        !matches!(self, VehicleStatus::Maintenance | VehicleStatus::OutOfService)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleStatus::Available => "Available",
            VehicleStatus::InUse => "InUse",
            VehicleStatus::Maintenance => "Maintenance",
            VehicleStatus::OutOfService => "OutOfService",
            VehicleStatus::Retired => "Retired",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VehicleStatus::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ParseStatusError::new("vehicle status", s))
    }
}

// ── Driver ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverStatus {
    Active,
    Inactive,
    OnLeave,
    Terminated,
}

impl DriverStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverStatus::Active => "Active",
            DriverStatus::Inactive => "Inactive",
            DriverStatus::OnLeave => "OnLeave",
            DriverStatus::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(DriverStatus::Active),
            "Inactive" => Ok(DriverStatus::Inactive),
            "OnLeave" => Ok(DriverStatus::OnLeave),
            "Terminated" => Ok(DriverStatus::Terminated),
            other => Err(ParseStatusError::new("driver status", other)),
        }
    }
}

// ── Trip ─────────────────────────────────────────────────────────

/// Scheduled → InProgress → {Completed | Cancelled}; Scheduled may also
/// complete or cancel directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TripStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn targets(self) -> &'static [TripStatus] {
        use TripStatus::*;
        match self {
            Scheduled => &[InProgress, Completed, Cancelled],
            InProgress => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: TripStatus) -> bool {
        self == target || self.targets().contains(&target)
    }

    /// Like `can_transition_to`, but a same-state request is rejected:
    /// completing a completed trip is not a no-op.
    pub fn transition_to(self, target: TripStatus) -> Result<TripStatus, FleetError> {
        if self.targets().contains(&target) {
            Ok(target)
        } else {
            Err(FleetError::InvalidTransition {
                entity: "trip",
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Scheduled and InProgress trips hold their vehicle.
    pub fn is_active(self) -> bool {
        matches!(self, TripStatus::Scheduled | TripStatus::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        self.targets().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Scheduled => "Scheduled",
            TripStatus::InProgress => "InProgress",
            TripStatus::Completed => "Completed",
            TripStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(TripStatus::Scheduled),
            "InProgress" => Ok(TripStatus::InProgress),
            "Completed" => Ok(TripStatus::Completed),
            "Cancelled" => Ok(TripStatus::Cancelled),
            other => Err(ParseStatusError::new("trip status", other)),
        }
    }
}

// ── Maintenance / fuel ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    OilChange,
    TireRotation,
    BrakeService,
    Inspection,
    Repair,
    Other,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::OilChange => "OilChange",
            ServiceType::TireRotation => "TireRotation",
            ServiceType::BrakeService => "BrakeService",
            ServiceType::Inspection => "Inspection",
            ServiceType::Repair => "Repair",
            ServiceType::Other => "Other",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OilChange" => Ok(ServiceType::OilChange),
            "TireRotation" => Ok(ServiceType::TireRotation),
            "BrakeService" => Ok(ServiceType::BrakeService),
            "Inspection" => Ok(ServiceType::Inspection),
            "Repair" => Ok(ServiceType::Repair),
            // Older records spell it out.
            "Other" | "OtherService" => Ok(ServiceType::Other),
            other => Err(ParseStatusError::new("service type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuelType {
    Gasoline,
    Diesel,
    Electric,
    Hybrid,
    Cng,
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FuelType::Gasoline => "Gasoline",
            FuelType::Diesel => "Diesel",
            FuelType::Electric => "Electric",
            FuelType::Hybrid => "Hybrid",
            FuelType::Cng => "CNG",
        };
        f.write_str(s)
    }
}
