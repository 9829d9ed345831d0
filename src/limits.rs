/// Maximum tenants a single process will load.
pub const MAX_TENANTS: usize = 10_000;

/// Trips without an end time occupy their vehicle for this long.
pub const DEFAULT_TRIP_WINDOW_HOURS: i64 = 24;

/// Maximum length of a trip's purpose (also holds the cancellation reason).
pub const MAX_PURPOSE_LEN: usize = 1024;

/// Maximum length of origin/destination strings.
pub const MAX_PLACE_LEN: usize = 512;

/// Fuel history needed before anomaly detection kicks in.
pub const MIN_FUEL_HISTORY: usize = 3;

/// Relative deviation from the trailing efficiency baseline that counts as an anomaly.
pub const FUEL_ANOMALY_THRESHOLD: f64 = 0.20;

/// Default look-ahead for license/registration/insurance expiry alerts.
pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 30;

/// Default cadence of the fleet alert jobs.
pub const DEFAULT_JOB_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Default upper bound on one job execution for one tenant.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 300;

/// Longest period a daily trend report may cover.
pub const MAX_REPORT_DAYS: i64 = 366;
