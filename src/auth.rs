use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::FleetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    VehicleRead,
    VehicleUpdate,
    DriverRead,
    TripRead,
    TripCreate,
    TripUpdate,
    TripDelete,
    MaintenanceRead,
    MaintenanceCreate,
    FuelEntryRead,
    FuelEntryCreate,
}

impl Permission {
    pub fn name(self) -> &'static str {
        match self {
            Permission::VehicleRead => "Vehicle.Read",
            Permission::VehicleUpdate => "Vehicle.Update",
            Permission::DriverRead => "Driver.Read",
            Permission::TripRead => "Trip.Read",
            Permission::TripCreate => "Trip.Create",
            Permission::TripUpdate => "Trip.Update",
            Permission::TripDelete => "Trip.Delete",
            Permission::MaintenanceRead => "Maintenance.Read",
            Permission::MaintenanceCreate => "Maintenance.Create",
            Permission::FuelEntryRead => "FuelEntry.Read",
            Permission::FuelEntryCreate => "FuelEntry.Create",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Who is calling into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// Background jobs.
    System,
    User { id: Ulid, grants: HashSet<Permission> },
}

impl Actor {
    pub fn user(id: Ulid, grants: impl IntoIterator<Item = Permission>) -> Self {
        Actor::User {
            id,
            grants: grants.into_iter().collect(),
        }
    }
}

/// Capability check run before every engine entry point.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn allows(&self, actor: &Actor, permission: Permission) -> bool;
}

/// Admits the system actor and users holding the permission.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantAuthorizer;

#[async_trait]
impl Authorizer for GrantAuthorizer {
    async fn allows(&self, actor: &Actor, permission: Permission) -> bool {
        match actor {
            Actor::System => true,
            Actor::User { grants, .. } => grants.contains(&permission),
        }
    }
}

pub async fn authorize(
    authorizer: &dyn Authorizer,
    actor: &Actor,
    permission: Permission,
) -> Result<(), FleetError> {
    if authorizer.allows(actor, permission).await {
        Ok(())
    } else {
        tracing::debug!(?actor, %permission, "authorization denied");
        Err(FleetError::AuthorizationDenied(permission))
    }
}
