use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use ulid::Ulid;

use fleetcore::auth::{Actor, GrantAuthorizer};
use fleetcore::engine::{ErrorKind, FleetEngine, InMemoryStore};
use fleetcore::model::*;
use fleetcore::repository::{DriverRepository, VehicleRepository};
use fleetcore::tenant::TenantManager;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

struct Fleet {
    engine: Arc<FleetEngine>,
    vehicles: Vec<Ulid>,
    driver: Ulid,
}

async fn setup(tm: &TenantManager, store: &InMemoryStore, n_vehicles: usize) -> Fleet {
    let tenant = Ulid::new();
    let engine = tm.get_or_create(tenant).expect("tenant");
    let mut vehicles = Vec::with_capacity(n_vehicles);
    for i in 0..n_vehicles {
        let v = Vehicle::new(Ulid::new(), tenant, "Bench", "Van", format!("B-{i:04}"));
        store.save_vehicle(&v).await.expect("save vehicle");
        vehicles.push(v.id);
    }
    let d = Driver::new(
        Ulid::new(),
        tenant,
        "Bench",
        "Driver",
        "L-0",
        Utc::now() + chrono::Duration::days(365),
    );
    store.save_driver(&d).await.expect("save driver");
    Fleet {
        engine,
        vehicles,
        driver: d.id,
    }
}

fn base() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

async fn phase1_sequential(fleet: &Fleet) {
    let n = 5000;
    let vid = fleet.vehicles[0];
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let s = base() + chrono::Duration::hours(2 * i as i64);
        let trip = Trip::new(Ulid::new(), fleet.engine.tenant_id(), vid, fleet.driver, "A", "B", s, 0)
            .with_end_time(s + chrono::Duration::hours(1));
        let t = Instant::now();
        fleet
            .engine
            .create_trip(&Actor::System, trip)
            .await
            .expect("sequential booking");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("create latency", &mut latencies);
}

/// Many tasks race for the same slots. Each slot must end up with exactly
/// one accepted booking.
async fn phase2_contended(fleet: &Fleet) {
    let n_tasks = 32;
    let n_slots = 100;
    let accepted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let engine = fleet.engine.clone();
        let vehicles = fleet.vehicles.clone();
        let driver = fleet.driver;
        let accepted = accepted.clone();
        let rejected = rejected.clone();
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(n_slots * vehicles.len());
            for slot in 0..n_slots {
                for &vid in &vehicles {
                    let s = base() + chrono::Duration::days(1000) + chrono::Duration::hours(3 * slot as i64);
                    let trip = Trip::new(Ulid::new(), engine.tenant_id(), vid, driver, "A", "B", s, 0)
                        .with_end_time(s + chrono::Duration::hours(2));
                    let t = Instant::now();
                    match engine.create_trip(&Actor::System, trip).await {
                        Ok(_) => {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) if e.kind() == ErrorKind::SchedulingConflict => {
                            rejected.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                    latencies.push(t.elapsed());
                }
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.expect("task panicked"));
    }
    let elapsed = start.elapsed();
    let ok = accepted.load(Ordering::Relaxed);
    let expected = n_slots * fleet.vehicles.len();
    println!(
        "  {n_tasks} tasks, {} attempts in {:.2}s: {ok} accepted, {} rejected",
        all.len(),
        elapsed.as_secs_f64(),
        rejected.load(Ordering::Relaxed)
    );
    if ok == expected {
        println!("  no double-booking: {ok}/{expected} slots filled once");
    } else {
        println!("  MISMATCH: {ok} accepted for {expected} slots");
    }
    print_latency("create latency under contention", &mut all);
}

/// Full lifecycle on independent vehicles, in parallel.
async fn phase3_lifecycle(fleet: &Fleet) {
    let start = Instant::now();
    let mut handles = Vec::new();
    for &vid in &fleet.vehicles {
        let engine = fleet.engine.clone();
        let driver = fleet.driver;
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            let mut odometer = 0u64;
            for i in 0..200 {
                let s = base() + chrono::Duration::days(1500) + chrono::Duration::hours(i);
                let trip = Trip::new(Ulid::new(), engine.tenant_id(), vid, driver, "A", "B", s, odometer);
                let t = Instant::now();
                let trip = engine.create_trip(&Actor::System, trip).await.expect("create");
                engine.start_trip(&Actor::System, trip.id).await.expect("start");
                odometer += 25;
                engine
                    .complete_trip(&Actor::System, trip.id, s + chrono::Duration::minutes(30), odometer)
                    .await
                    .expect("complete");
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }
    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.expect("task panicked"));
    }
    println!("  {} lifecycles in {:.2}s", all.len(), start.elapsed().as_secs_f64());
    print_latency("create+start+complete latency", &mut all);
}

#[tokio::main]
async fn main() {
    let store = Arc::new(InMemoryStore::new());
    let tm = TenantManager::new(store.clone(), Arc::new(GrantAuthorizer));

    println!("=== fleetcore stress benchmark ===\n");

    println!("[setup]");
    let fleet = setup(&tm, &store, 10).await;
    println!("  created {} vehicles", fleet.vehicles.len());

    println!("\n[phase 1] sequential bookings");
    phase1_sequential(&fleet).await;

    println!("\n[phase 2] contended bookings");
    phase2_contended(&fleet).await;

    println!("\n[phase 3] trip lifecycle");
    phase3_lifecycle(&fleet).await;

    println!("\n=== benchmark complete ===");
}
