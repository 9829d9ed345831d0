use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::FleetError;
use crate::model::TenantId;
use crate::observability::{JOB_RUNS_TOTAL, JOB_TICK_DURATION_SECONDS};

pub type JobFuture = BoxFuture<'static, Result<(), FleetError>>;

/// One unit of work for one tenant. The token is cancelled when the
/// scheduler stops; long runs may poll it and return early.
pub type JobFn = Arc<dyn Fn(CancellationToken, TenantId) -> JobFuture + Send + Sync>;

/// Where the scheduler reads the current tenant list at every tick.
pub trait TenantSource: Send + Sync {
    fn tenants(&self) -> Vec<TenantId>;
}

/// Externally-set tenant list. `set` takes effect on the next tick.
pub struct TenantList {
    tx: watch::Sender<Vec<TenantId>>,
}

impl Default for TenantList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl TenantList {
    pub fn new(initial: Vec<TenantId>) -> Self {
        Self {
            tx: watch::Sender::new(initial),
        }
    }

    pub fn set(&self, tenants: Vec<TenantId>) {
        self.tx.send_replace(tenants);
    }
}

impl TenantSource for TenantList {
    fn tenants(&self) -> Vec<TenantId> {
        self.tx.borrow().clone()
    }
}

pub struct Job {
    name: String,
    interval: Duration,
    run: JobFn,
}

impl Job {
    pub fn new<F>(name: impl Into<String>, interval: Duration, run: F) -> Self
    where
        F: Fn(CancellationToken, TenantId) -> JobFuture + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            interval,
            run: Arc::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of one job across every tenant in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub job: String,
    pub succeeded: usize,
    pub failed: usize,
}

enum State {
    Registered,
    Running(Vec<JoinHandle<()>>),
    Stopped,
}

/// Runs each registered job on its own timer, fanning out sequentially over
/// the tenant list.
///
/// Registered → Running (`start`) → Stopped (`stop`). A stopped scheduler
/// cannot be restarted.
pub struct Scheduler {
    jobs: Vec<Arc<Job>>,
    tenants: Arc<dyn TenantSource>,
    job_timeout: Duration,
    cancel: CancellationToken,
    state: Mutex<State>,
}

impl Scheduler {
    pub fn new(tenants: Arc<dyn TenantSource>, job_timeout: Duration) -> Self {
        Self {
            jobs: Vec::new(),
            tenants,
            job_timeout,
            cancel: CancellationToken::new(),
            state: Mutex::new(State::Registered),
        }
    }

    pub fn register(&mut self, job: Job) -> Result<(), FleetError> {
        if !matches!(self.state.get_mut(), State::Registered) {
            return Err(FleetError::InvariantViolation(
                "jobs must be registered before start".into(),
            ));
        }
        if job.interval.is_zero() {
            return Err(FleetError::InvariantViolation(format!(
                "job {} has a zero interval",
                job.name
            )));
        }
        if self.jobs.iter().any(|j| j.name == job.name) {
            return Err(FleetError::InvariantViolation(format!(
                "job {} is already registered",
                job.name
            )));
        }
        self.jobs.push(Arc::new(job));
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    /// Spawn one loop per job. Each runs immediately, then on its interval.
    /// Calling `start` on a running scheduler does nothing.
    pub async fn start(&self) -> Result<(), FleetError> {
        let mut state = self.state.lock().await;
        match *state {
            State::Running(_) => return Ok(()),
            State::Stopped => {
                return Err(FleetError::InvariantViolation("scheduler already stopped".into()));
            }
            State::Registered => {}
        }
        let handles = self
            .jobs
            .iter()
            .map(|job| {
                let job = job.clone();
                let tenants = self.tenants.clone();
                let cancel = self.cancel.clone();
                let timeout = self.job_timeout;
                tokio::spawn(async move { run_job(job, tenants, timeout, cancel).await })
            })
            .collect();
        *state = State::Running(handles);
        info!(jobs = self.jobs.len(), "scheduler started");
        Ok(())
    }

    /// Run every job once for every tenant, ignoring intervals.
    pub async fn run_once(&self) -> Vec<TickReport> {
        let mut reports = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            reports.push(tick(job, self.tenants.as_ref(), self.job_timeout, &self.cancel).await);
        }
        reports
    }

    /// Signal cancellation and wait for every job loop to exit. An in-flight
    /// tenant execution finishes first.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, State::Stopped);
        self.cancel.cancel();
        if let State::Running(handles) = previous {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!("scheduler job task failed: {e}");
                }
            }
            info!("scheduler stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn run_job(job: Arc<Job>, tenants: Arc<dyn TenantSource>, timeout: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(job.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tick(&job, tenants.as_ref(), timeout, &cancel).await;
            }
        }
    }
    tracing::debug!(job = %job.name, "job loop exited");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// One pass over the tenant list. A failing, panicking or slow tenant is
/// logged and skipped; the rest still run.
async fn tick(job: &Job, tenants: &dyn TenantSource, timeout: Duration, cancel: &CancellationToken) -> TickReport {
    let started = Instant::now();
    let mut report = TickReport {
        job: job.name.clone(),
        succeeded: 0,
        failed: 0,
    };
    for tenant_id in tenants.tenants() {
        let token = cancel.child_token();
        let run = AssertUnwindSafe(async { (job.run)(token, tenant_id).await }).catch_unwind();
        let status = match tokio::time::timeout(timeout, run).await {
            Ok(Ok(Ok(()))) => "ok",
            Ok(Ok(Err(e))) => {
                tracing::error!(job = %job.name, tenant_id = %tenant_id, error = %e, "scheduled job failed");
                "error"
            }
            Ok(Err(payload)) => {
                tracing::error!(
                    job = %job.name,
                    tenant_id = %tenant_id,
                    panic = panic_message(payload.as_ref()),
                    "scheduled job panicked"
                );
                "panic"
            }
            Err(_) => {
                let e = FleetError::JobTimedOut {
                    job: job.name.clone(),
                    tenant_id,
                };
                tracing::warn!(job = %job.name, tenant_id = %tenant_id, timeout_secs = timeout.as_secs(), "{e}");
                "timeout"
            }
        };
        if status == "ok" {
            report.succeeded += 1;
        } else {
            report.failed += 1;
        }
        metrics::counter!(JOB_RUNS_TOTAL, "job" => job.name.clone(), "status" => status).increment(1);
    }
    metrics::histogram!(JOB_TICK_DURATION_SECONDS, "job" => job.name.clone())
        .record(started.elapsed().as_secs_f64());
    report
}
