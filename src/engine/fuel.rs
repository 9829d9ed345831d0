use serde_json::json;
use ulid::Ulid;

use crate::auth::{Actor, Permission};
use crate::limits::{FUEL_ANOMALY_THRESHOLD, MIN_FUEL_HISTORY};
use crate::model::*;
use crate::observability::FUEL_ANOMALIES_TOTAL;

use super::conflict::now;
use super::{FleetEngine, FleetError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuelAnalysis {
    /// Against the immediately preceding entry; zero without one.
    pub efficiency: f64,
    /// Mean positive pairwise efficiency over the prior history.
    pub baseline: Option<f64>,
    /// `|efficiency - baseline| / baseline`.
    pub deviation: Option<f64>,
    pub anomaly: bool,
}

/// Compare `entry` against the vehicle's prior entries.
///
/// `history` is every earlier entry for the vehicle, excluding `entry`
/// itself, in any order. Fewer than three entries is never an anomaly.
pub fn analyze_fuel_entry(history: &[FuelEntry], entry: &FuelEntry) -> FuelAnalysis {
    let mut prior: Vec<&FuelEntry> = history
        .iter()
        .filter(|e| e.id != entry.id && e.chronological_key() <= entry.chronological_key())
        .collect();
    prior.sort_by_key(|e| e.chronological_key());

    let efficiency = prior
        .last()
        .map(|prev| entry.efficiency_since(prev.odometer))
        .unwrap_or(0.0);
    let mut analysis = FuelAnalysis {
        efficiency,
        baseline: None,
        deviation: None,
        anomaly: false,
    };
    if prior.len() < MIN_FUEL_HISTORY {
        return analysis;
    }

    let pairs: Vec<f64> = prior
        .windows(2)
        .map(|w| w[1].efficiency_since(w[0].odometer))
        .filter(|e| *e > 0.0)
        .collect();
    if pairs.is_empty() {
        return analysis;
    }
    let baseline = pairs.iter().sum::<f64>() / pairs.len() as f64;
    analysis.baseline = Some(baseline);
    if baseline == 0.0 || efficiency == 0.0 {
        return analysis;
    }
    let deviation = (efficiency - baseline).abs() / baseline;
    analysis.deviation = Some(deviation);
    analysis.anomaly = deviation > FUEL_ANOMALY_THRESHOLD;
    analysis
}

impl FleetEngine {
    /// Persist a fuel entry and flag it when its efficiency strays from the
    /// vehicle's history.
    pub async fn record_fuel_entry(&self, actor: &Actor, entry: FuelEntry) -> Result<FuelAnalysis, FleetError> {
        self.authorize(actor, Permission::FuelEntryCreate).await?;
        self.ensure_tenant("fuel entry", entry.id, entry.tenant_id)?;
        if !entry.quantity.is_finite() || entry.quantity <= 0.0 {
            return Err(FleetError::InvariantViolation(format!(
                "fuel quantity must be positive, got {}",
                entry.quantity
            )));
        }
        if !entry.cost.is_finite() || entry.cost < 0.0 {
            return Err(FleetError::InvariantViolation(format!(
                "fuel cost must be non-negative, got {}",
                entry.cost
            )));
        }
        let vehicle = self.load_vehicle(entry.vehicle_id).await?;

        let history = self
            .store
            .fuel_entries_by_vehicle(self.tenant_id(), entry.vehicle_id)
            .await
            .map_err(FleetError::store("list fuel entries"))?;
        let analysis = analyze_fuel_entry(&history, &entry);

        self.store
            .insert_fuel_entry(&entry)
            .await
            .map_err(FleetError::store("record fuel entry"))?;

        tracing::info!(
            tenant_id = %self.tenant_id(),
            vehicle_id = %entry.vehicle_id,
            efficiency = analysis.efficiency,
            "fuel entry recorded"
        );
        self.publish(Event::FuelEntryRecorded { entry: entry.clone() });

        if analysis.anomaly {
            metrics::counter!(FUEL_ANOMALIES_TOTAL).increment(1);
            tracing::warn!(
                tenant_id = %self.tenant_id(),
                vehicle_id = %entry.vehicle_id,
                efficiency = analysis.efficiency,
                baseline = analysis.baseline,
                "fuel efficiency anomaly"
            );
            self.publish(Event::Alert(Notification {
                id: Ulid::new(),
                tenant_id: self.tenant_id(),
                kind: NotificationKind::FuelAnomaly,
                subject_id: entry.vehicle_id,
                title: "Fuel efficiency anomaly".into(),
                message: format!(
                    "{} ({}) recorded {:.2} per unit against a usual {:.2}",
                    vehicle.display_name(),
                    vehicle.license_plate,
                    analysis.efficiency,
                    analysis.baseline.unwrap_or_default()
                ),
                data: json!({
                    "vehicle_id": entry.vehicle_id.to_string(),
                    "fuel_entry_id": entry.id.to_string(),
                    "efficiency": analysis.efficiency,
                    "baseline": analysis.baseline,
                    "deviation": analysis.deviation,
                }),
                created_at: now(),
            }));
        }
        Ok(analysis)
    }

    /// Efficiency of `entry` against the latest stored entry for its vehicle.
    /// Zero when there is none or the odometer did not advance.
    pub async fn fuel_efficiency(&self, actor: &Actor, entry: &FuelEntry) -> Result<f64, FleetError> {
        self.authorize(actor, Permission::FuelEntryRead).await?;
        let last = self
            .store
            .last_fuel_entry(self.tenant_id(), entry.vehicle_id)
            .await
            .map_err(FleetError::store("get last fuel entry"))?;
        Ok(last
            .filter(|prev| prev.id != entry.id)
            .map(|prev| entry.efficiency_since(prev.odometer))
            .unwrap_or(0.0))
    }

    pub async fn fuel_entries_by_vehicle(&self, actor: &Actor, vehicle_id: Ulid) -> Result<Vec<FuelEntry>, FleetError> {
        self.authorize(actor, Permission::FuelEntryRead).await?;
        self.store
            .fuel_entries_by_vehicle(self.tenant_id(), vehicle_id)
            .await
            .map_err(FleetError::store("list fuel entries"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::FuelType;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(vehicle_id: Ulid, day: i64, odometer: u64, quantity: f64) -> FuelEntry {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        FuelEntry::new(
            Ulid::new(),
            Ulid::new(),
            vehicle_id,
            base + Duration::days(day),
            quantity,
            quantity * 1.5,
            odometer,
            FuelType::Gasoline,
        )
    }

    fn steady_history(vid: Ulid) -> Vec<FuelEntry> {
        (0..4).map(|i| entry(vid, i, i as u64 * 100, 10.0)).collect()
    }

    #[test]
    fn large_swing_is_flagged() {
        let vid = Ulid::new();
        let a = analyze_fuel_entry(&steady_history(vid), &entry(vid, 4, 430, 10.0));
        assert!((a.efficiency - 13.0).abs() < 1e-9);
        assert!((a.baseline.unwrap() - 10.0).abs() < 1e-9);
        assert!(a.anomaly);
    }

    #[test]
    fn small_swing_is_not_flagged() {
        let vid = Ulid::new();
        let a = analyze_fuel_entry(&steady_history(vid), &entry(vid, 4, 415, 10.0));
        assert!((a.efficiency - 11.5).abs() < 1e-9);
        assert!(!a.anomaly);
    }

    #[test]
    fn short_history_never_flags() {
        let vid = Ulid::new();
        let history: Vec<FuelEntry> = (0..2).map(|i| entry(vid, i, i as u64 * 100, 10.0)).collect();
        let a = analyze_fuel_entry(&history, &entry(vid, 3, 1000, 10.0));
        assert!(!a.anomaly);
        assert_eq!(a.baseline, None);
    }

    #[test]
    fn history_order_does_not_matter() {
        let vid = Ulid::new();
        let mut history = steady_history(vid);
        history.reverse();
        assert!(analyze_fuel_entry(&history, &entry(vid, 4, 430, 10.0)).anomaly);
    }

    #[test]
    fn stalled_odometer_short_circuits() {
        let vid = Ulid::new();
        let a = analyze_fuel_entry(&steady_history(vid), &entry(vid, 4, 300, 10.0));
        assert_eq!(a.efficiency, 0.0);
        assert!(!a.anomaly);
        assert_eq!(a.deviation, None);
    }

    #[test]
    fn entry_is_not_compared_with_itself() {
        let vid = Ulid::new();
        let new = entry(vid, 4, 430, 10.0);
        let mut history = steady_history(vid);
        history.push(new.clone());
        let a = analyze_fuel_entry(&history, &new);
        assert!((a.efficiency - 13.0).abs() < 1e-9);
        assert!(a.anomaly);
    }
}
