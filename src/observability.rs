use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Booking metrics ─────────────────────────────────────────────

/// Counter: trips accepted.
pub const TRIPS_CREATED_TOTAL: &str = "fleet_trips_created_total";

/// Counter: trip requests rejected for overlapping an active trip.
pub const SCHEDULING_CONFLICTS_TOTAL: &str = "fleet_scheduling_conflicts_total";

/// Counter: trip status changes. Labels: to.
pub const TRIP_TRANSITIONS_TOTAL: &str = "fleet_trip_transitions_total";

/// Counter: vehicle status changes. Labels: to.
pub const VEHICLE_TRANSITIONS_TOTAL: &str = "fleet_vehicle_transitions_total";

/// Counter: fuel entries flagged as anomalous.
pub const FUEL_ANOMALIES_TOTAL: &str = "fleet_fuel_anomalies_total";

/// Counter: events handed to the notification sink. Labels: kind.
pub const NOTIFICATIONS_PUBLISHED_TOTAL: &str = "fleet_notifications_published_total";

// ── Scheduler metrics ───────────────────────────────────────────

/// Counter: per-tenant job executions. Labels: job, status.
pub const JOB_RUNS_TOTAL: &str = "fleet_job_runs_total";

/// Histogram: duration of one job tick across all tenants, in seconds. Labels: job.
pub const JOB_TICK_DURATION_SECONDS: &str = "fleet_job_tick_duration_seconds";

/// Gauge: number of loaded tenants.
pub const TENANTS_ACTIVE: &str = "fleet_tenants_active";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
