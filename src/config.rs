use std::time::Duration;

use ulid::Ulid;

use crate::engine::FleetJobConfig;
use crate::limits::*;
use crate::model::TenantId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FLEET_TENANTS: invalid tenant id {value:?}: {source}")]
    InvalidTenant {
        value: String,
        #[source]
        source: ulid::DecodeError,
    },
}

/// Process configuration, read from `FLEET_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub metrics_port: Option<u16>,
    pub tenants: Vec<TenantId>,
    pub job_interval: Duration,
    pub job_timeout: Duration,
    pub expiry_window_days: i64,
    /// Run every job once and exit instead of starting the timers.
    pub run_once: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics_port: None,
            tenants: Vec::new(),
            job_interval: Duration::from_secs(DEFAULT_JOB_INTERVAL_SECS),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            expiry_window_days: DEFAULT_EXPIRY_WINDOW_DAYS,
            run_once: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let parsed = |key: &str| get(key).and_then(|s| s.trim().parse::<u64>().ok());

        let tenants = match get("FLEET_TENANTS") {
            Some(list) => parse_tenants(&list)?,
            None => Vec::new(),
        };

        Ok(Config {
            metrics_port: get("FLEET_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            tenants,
            job_interval: parsed("FLEET_JOB_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_interval),
            job_timeout: parsed("FLEET_JOB_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            expiry_window_days: get("FLEET_EXPIRY_WINDOW_DAYS")
                .and_then(|s| s.trim().parse::<i64>().ok())
                .filter(|d| *d >= 0)
                .unwrap_or(defaults.expiry_window_days),
            run_once: get("FLEET_RUN_ONCE")
                .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.run_once),
        })
    }

    pub fn jobs(&self) -> FleetJobConfig {
        FleetJobConfig {
            interval: self.job_interval,
            expiry_window_days: self.expiry_window_days,
        }
    }
}

fn parse_tenants(list: &str) -> Result<Vec<TenantId>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Ulid::from_string(s).map_err(|source| ConfigError::InvalidTenant {
                value: s.to_string(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.job_interval, Duration::from_secs(86_400));
        assert_eq!(cfg.expiry_window_days, 30);
    }

    #[test]
    fn values_are_read() {
        let a = Ulid::new();
        let b = Ulid::new();
        let tenants = format!("{a}, {b},");
        let cfg = Config::from_lookup(lookup(&[
            ("FLEET_METRICS_PORT", "9100"),
            ("FLEET_TENANTS", &tenants),
            ("FLEET_JOB_INTERVAL_SECS", "60"),
            ("FLEET_JOB_TIMEOUT_SECS", "5"),
            ("FLEET_EXPIRY_WINDOW_DAYS", "14"),
            ("FLEET_RUN_ONCE", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.tenants, vec![a, b]);
        assert_eq!(cfg.job_interval, Duration::from_secs(60));
        assert_eq!(cfg.job_timeout, Duration::from_secs(5));
        assert_eq!(cfg.jobs().expiry_window_days, 14);
        assert!(cfg.run_once);
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let cfg = Config::from_lookup(lookup(&[
            ("FLEET_JOB_INTERVAL_SECS", "soon"),
            ("FLEET_JOB_TIMEOUT_SECS", "0"),
            ("FLEET_METRICS_PORT", "99999"),
        ]))
        .unwrap();
        assert_eq!(cfg.job_interval, Duration::from_secs(DEFAULT_JOB_INTERVAL_SECS));
        assert_eq!(cfg.job_timeout, Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS));
        assert_eq!(cfg.metrics_port, None);
    }

    #[test]
    fn malformed_tenant_is_an_error() {
        let err = Config::from_lookup(lookup(&[("FLEET_TENANTS", "not-a-ulid")])).unwrap_err();
        assert!(err.to_string().contains("not-a-ulid"));
    }
}
