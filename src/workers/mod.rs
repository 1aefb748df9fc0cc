pub mod cache_cleanup;
pub mod reminder_sweep;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::chat::OutboundClient;
use crate::config::Config;
use crate::store::Store;

/// Timeout for individual worker invocations (5 minutes).
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 所有 worker 的枚举，消除字符串匹配，编译期保证完整性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    ReminderSweep,
    CacheCleanup,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReminderSweep => "reminder_sweep",
            Self::CacheCleanup => "cache_cleanup",
        }
    }
}

/// How a job fires: a fixed cron line, or a configurable period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Cron(&'static str),
    EverySecs(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub schedule: Schedule,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    outbound: Arc<OutboundClient>,
    config: Config,
    shutdown_rx: broadcast::Receiver<()>,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        outbound: Arc<OutboundClient>,
        config: &Config,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            store,
            outbound,
            config: config.clone(),
            shutdown_rx,
        }
    }

    /// Single source of truth for all planned jobs and their schedules.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.worker.is_leader {
            return Vec::new();
        }

        vec![
            JobSpec {
                name: WorkerName::ReminderSweep,
                schedule: Schedule::EverySecs(self.config.notify.sweep_period_secs),
                enabled: true,
            },
            JobSpec {
                name: WorkerName::CacheCleanup,
                schedule: Schedule::Cron("0 17 * * * *"),
                enabled: true,
            },
        ]
    }

    /// Start the worker scheduler. Returns an error if the scheduler cannot
    /// be created or started.
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.worker.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    /// Register all jobs with the scheduler, using `planned_jobs()` as the
    /// single source of truth.
    async fn register_jobs(&self, scheduler: &JobScheduler) {
        let specs = self.planned_jobs();

        for spec in &specs {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let store = self.store.clone();
            let name_str = spec.name.as_str();

            match spec.name {
                WorkerName::ReminderSweep => {
                    let outbound = self.outbound.clone();
                    let notify = self.config.notify.clone();
                    let default_tz = self.config.default_tz.clone();
                    add_job(scheduler, spec.schedule, name_str, move || {
                        let store = store.clone();
                        let outbound = outbound.clone();
                        let notify = notify.clone();
                        let default_tz = default_tz.clone();
                        async move {
                            reminder_sweep::run(&store, &outbound, &notify, &default_tz).await;
                        }
                    })
                    .await;
                }
                WorkerName::CacheCleanup => {
                    add_job(scheduler, spec.schedule, name_str, move || {
                        let store = store.clone();
                        async move {
                            cache_cleanup::run(&store).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, schedule = ?spec.schedule, "Registered worker");
        }
    }
}

/// Add a job to the scheduler with an overlap guard and timeout wrapper.
async fn add_job<Fut, F>(scheduler: &JobScheduler, schedule: Schedule, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));

    let wrapped = move |_uuid: uuid::Uuid, _lock: JobScheduler| {
        let guard = running.clone();

        if guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(
                worker = name,
                "Skipping worker invocation: previous run still in progress"
            );
            return Box::pin(async {}) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;
        }

        let fut = run();
        Box::pin(async move {
            match tokio::time::timeout(WORKER_TIMEOUT, fut).await {
                Ok(()) => {}
                Err(_) => {
                    tracing::error!(
                        worker = name,
                        timeout_secs = WORKER_TIMEOUT.as_secs(),
                        "Worker timed out"
                    );
                }
            }
            guard.store(false, Ordering::SeqCst);
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
    };

    let job = match schedule {
        Schedule::Cron(cron) => Job::new_async(cron, wrapped),
        Schedule::EverySecs(secs) => {
            Job::new_repeated_async(Duration::from_secs(secs.max(1)), wrapped)
        }
    };

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error=%err, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error=%err, worker = name, "Failed to create worker job"),
    }
}
