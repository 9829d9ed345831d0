use ulid::Ulid;

use crate::auth::Permission;
use crate::repository::StoreError;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    ResourceUnavailable,
    SchedulingConflict,
    InvariantViolation,
    AuthorizationDenied,
    Limit,
    Storage,
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Ulid },

    #[error("invalid {entity} status transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("vehicle {vehicle_id} is already assigned to another trip during this time")]
    SchedulingConflict { vehicle_id: Ulid },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("permission denied: {0}")]
    AuthorizationDenied(Permission),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("failed to {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("job {job} timed out for tenant {tenant_id}")]
    JobTimedOut { job: String, tenant_id: Ulid },
}

impl FleetError {
    pub fn not_found(entity: &'static str, id: Ulid) -> Self {
        FleetError::NotFound { entity, id }
    }

    /// Wraps a collaborator error with the operation that produced it.
    pub fn store(op: &'static str) -> impl FnOnce(StoreError) -> FleetError {
        move |source| FleetError::Store { op, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FleetError::NotFound { .. } => ErrorKind::NotFound,
            FleetError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            FleetError::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            FleetError::SchedulingConflict { .. } => ErrorKind::SchedulingConflict,
            FleetError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            FleetError::AuthorizationDenied(_) => ErrorKind::AuthorizationDenied,
            FleetError::LimitExceeded(_) => ErrorKind::Limit,
            FleetError::JobTimedOut { .. } => ErrorKind::Timeout,
            FleetError::Store { source, .. } => match source {
                StoreError::NotFound { .. } => ErrorKind::NotFound,
                StoreError::Conflict { .. } => ErrorKind::SchedulingConflict,
                StoreError::Backend(_) => ErrorKind::Storage,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_kind() {
        let vid = Ulid::new();
        let err = FleetError::store("create trip")(StoreError::Conflict {
            vehicle_id: vid,
            trip_id: Ulid::new(),
        });
        assert_eq!(err.kind(), ErrorKind::SchedulingConflict);
        assert!(err.to_string().starts_with("failed to create trip"));

        let err = FleetError::store("get vehicle")(StoreError::Backend("connection reset".into()));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn denial_names_the_permission() {
        let err = FleetError::AuthorizationDenied(Permission::TripCreate);
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);
        assert_eq!(err.to_string(), "permission denied: Trip.Create");
    }
}
