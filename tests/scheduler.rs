//! Fleet jobs driven through the scheduler against real per-tenant engines.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ulid::Ulid;

use fleetcore::auth::GrantAuthorizer;
use fleetcore::engine::*;
use fleetcore::model::*;
use fleetcore::repository::{DriverRepository, VehicleRepository};
use fleetcore::scheduler::{Job, Scheduler, TenantList, TenantSource};
use fleetcore::tenant::TenantManager;

fn setup() -> (Arc<InMemoryStore>, Arc<TenantManager>) {
    let store = Arc::new(InMemoryStore::new());
    let tm = Arc::new(TenantManager::new(store.clone(), Arc::new(GrantAuthorizer)));
    (store, tm)
}

async fn expiring_driver(store: &InMemoryStore, tenant: TenantId, days: i64) -> Driver {
    let d = Driver::new(
        Ulid::new(),
        tenant,
        "Grace",
        "Hopper",
        "L-7",
        Utc::now() + chrono::Duration::days(days),
    );
    store.save_driver(&d).await.unwrap();
    d
}

fn alerts(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(e) = rx.try_recv() {
        if let Event::Alert(n) = e {
            out.push(n);
        }
    }
    out
}

#[tokio::test]
async fn fleet_jobs_are_registered_by_name() {
    let (_, tm) = setup();
    let mut scheduler = Scheduler::new(tm.clone(), Duration::from_secs(5));
    register_fleet_jobs(&mut scheduler, tm, FleetJobConfig::default()).unwrap();
    assert_eq!(
        scheduler.job_names(),
        vec![
            LICENSE_EXPIRY_JOB,
            REGISTRATION_EXPIRY_JOB,
            INSURANCE_EXPIRY_JOB,
            MAINTENANCE_DUE_JOB
        ]
    );
}

#[tokio::test]
async fn run_once_alerts_every_tenant_separately() {
    let (store, tm) = setup();
    let (a, b) = (Ulid::new(), Ulid::new());
    tm.get_or_create(a).unwrap();
    tm.get_or_create(b).unwrap();

    let driver_a = expiring_driver(&store, a, 7).await;
    expiring_driver(&store, b, 90).await;
    let v = Vehicle::new(Ulid::new(), b, "DAF", "XF", "EF-789")
        .with_insurance_expiry(Utc::now() + chrono::Duration::days(3));
    store.save_vehicle(&v).await.unwrap();

    let mut rx_a = tm.hub(a).subscribe_all();
    let mut rx_b = tm.hub(b).subscribe_all();

    let mut scheduler = Scheduler::new(tm.clone(), Duration::from_secs(5));
    register_fleet_jobs(&mut scheduler, tm.clone(), FleetJobConfig::default()).unwrap();
    let reports = scheduler.run_once().await;
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().all(|r| r.succeeded == 2 && r.failed == 0));

    let got_a = alerts(&mut rx_a);
    assert_eq!(got_a.len(), 1);
    assert_eq!(got_a[0].kind, NotificationKind::LicenseExpiry);
    assert_eq!(got_a[0].subject_id, driver_a.id);
    assert_eq!(got_a[0].tenant_id, a);

    let got_b = alerts(&mut rx_b);
    assert_eq!(got_b.len(), 1);
    assert_eq!(got_b[0].kind, NotificationKind::InsuranceExpiry);
    assert_eq!(got_b[0].subject_id, v.id);
}

#[tokio::test]
async fn external_tenant_list_drives_fan_out() {
    let (store, tm) = setup();
    let tenant = Ulid::new();
    expiring_driver(&store, tenant, 1).await;
    let mut rx = tm.hub(tenant).subscribe_all();

    let list = Arc::new(TenantList::default());
    let mut scheduler = Scheduler::new(list.clone(), Duration::from_secs(5));
    register_fleet_jobs(&mut scheduler, tm.clone(), FleetJobConfig::default()).unwrap();

    scheduler.run_once().await;
    assert!(alerts(&mut rx).is_empty());

    list.set(vec![tenant]);
    scheduler.run_once().await;
    assert_eq!(alerts(&mut rx).len(), 1);
    // The job created the engine on demand.
    assert_eq!(tm.tenants(), vec![tenant]);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_in_flight_work() {
    let (_, tm) = setup();
    tm.get_or_create(Ulid::new()).unwrap();
    let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let mut scheduler = Scheduler::new(tm.clone(), Duration::from_secs(60));
    let flag = finished.clone();
    scheduler
        .register(Job::new("slow", Duration::from_secs(3600), move |_, _| {
            let flag = flag.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<(), FleetError>(())
            })
        }))
        .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.stop().await;
    assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
}
