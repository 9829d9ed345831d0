use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetcore::auth::GrantAuthorizer;
use fleetcore::config::Config;
use fleetcore::engine::{register_fleet_jobs, InMemoryStore};
use fleetcore::scheduler::Scheduler;
use fleetcore::tenant::TenantManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    fleetcore::observability::init(config.metrics_port)?;

    let store = Arc::new(InMemoryStore::new());
    let tenant_manager = Arc::new(TenantManager::new(store, Arc::new(GrantAuthorizer)));
    for tenant in &config.tenants {
        tenant_manager.get_or_create(*tenant)?;
    }

    let mut scheduler = Scheduler::new(tenant_manager.clone(), config.job_timeout);
    register_fleet_jobs(&mut scheduler, tenant_manager.clone(), config.jobs())?;

    info!("fleetcore starting");
    info!("  tenants: {}", tenant_manager.len());
    info!("  jobs: {}", scheduler.job_names().join(", "));
    info!("  interval: {}s, timeout: {}s", config.job_interval.as_secs(), config.job_timeout.as_secs());
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    if config.run_once {
        for report in scheduler.run_once().await {
            info!(job = %report.job, succeeded = report.succeeded, failed = report.failed, "job finished");
        }
        return Ok(());
    }

    scheduler.start().await?;

    // Graceful shutdown: stop the job loops on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received, stopping scheduler");
    scheduler.stop().await;
    info!("fleetcore stopped");
    Ok(())
}
