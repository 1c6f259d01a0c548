//! Execution dispatcher.
//!
//! Polls the claim queue every second and runs one job lifecycle per
//! claimed execution, up to a concurrency cap. Shutdown is graceful:
//! claiming stops immediately, running jobs get their stop tokens
//! cancelled and finalize partial results before the loop exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crawjud_channel::ChannelConfig;
use crawjud_core::events::TaskDescriptor;
use crawjud_core::Pid;
use crawjud_db::models::execution::Execution;
use crawjud_db::repositories::ExecutionRepo;
use crawjud_engine::{run_job, JobConfig};
use crawjud_storage::ObjectStore;

use crate::registry::PortalRegistry;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Jobs one worker runs at the same time.
const MAX_CONCURRENT_JOBS: usize = 4;

pub struct Dispatcher {
    pool: PgPool,
    storage: Arc<dyn ObjectStore>,
    registry: Arc<PortalRegistry>,
    worker_name: String,
    work_dir: PathBuf,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        pool: PgPool,
        storage: Arc<dyn ObjectStore>,
        registry: Arc<PortalRegistry>,
        worker_name: String,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            pool,
            storage,
            registry,
            worker_name,
            work_dir,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Run the claim loop until `shutdown` fires, then wind down the
    /// jobs still in flight.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        let jobs_stop = CancellationToken::new();
        let mut jobs: JoinSet<()> = JoinSet::new();

        tracing::info!(
            worker = %self.worker_name,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "dispatcher started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // Reap finished jobs without blocking the tick.
                    while jobs.try_join_next().is_some() {}

                    if jobs.len() >= MAX_CONCURRENT_JOBS {
                        continue;
                    }
                    match ExecutionRepo::claim_next(&self.pool, &self.worker_name).await {
                        Ok(Some(execution)) => {
                            self.spawn_job(&mut jobs, execution, jobs_stop.child_token());
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "claim cycle failed");
                        }
                    }
                }
            }
        }

        // Stop running jobs at their next row boundary and let them
        // finalize partial results.
        jobs_stop.cancel();
        while jobs.join_next().await.is_some() {}
        tracing::info!("dispatcher stopped");
    }

    fn spawn_job(&self, jobs: &mut JoinSet<()>, execution: Execution, stop: CancellationToken) {
        let pool = self.pool.clone();
        let storage = Arc::clone(&self.storage);
        let registry = Arc::clone(&self.registry);
        let work_dir = self.work_dir.clone();

        jobs.spawn(async move {
            run_claimed(pool, storage, registry, work_dir, execution, stop).await;
        });
    }
}

/// Run one claimed execution end to end, writing the outcome back.
async fn run_claimed(
    pool: PgPool,
    storage: Arc<dyn ObjectStore>,
    registry: Arc<PortalRegistry>,
    work_dir: PathBuf,
    execution: Execution,
    stop: CancellationToken,
) {
    let descriptor = match descriptor_from(&execution) {
        Ok(descriptor) => descriptor,
        Err(reason) => {
            tracing::error!(execution_id = execution.id, %reason, "invalid execution parameters");
            fail(&pool, execution.id, &reason).await;
            return;
        }
    };

    let Some(factory) = registry.resolve(&descriptor.system, &descriptor.bot_type) else {
        let reason = format!(
            "no portal registered for {}/{}",
            descriptor.system, descriptor.bot_type
        );
        tracing::error!(execution_id = execution.id, %reason, "cannot run execution");
        fail(&pool, execution.id, &reason).await;
        return;
    };

    let mode = match factory.build(&descriptor) {
        Ok(mode) => mode,
        Err(e) => {
            tracing::error!(execution_id = execution.id, error = %e, "portal setup failed");
            fail(&pool, execution.id, &e.to_string()).await;
            return;
        }
    };

    let pid = Pid::new();
    if let Err(e) = ExecutionRepo::mark_started(&pool, execution.id, pid.as_str()).await {
        tracing::error!(execution_id = execution.id, error = %e, "failed to record start");
    }

    tracing::info!(
        execution_id = execution.id,
        pid = %pid,
        bot_name = %descriptor.bot_name,
        system = %descriptor.system,
        "execution claimed"
    );

    let output_dir = work_dir.join(pid.short());
    let config = JobConfig {
        pid,
        storage_folder: descriptor.storage_folder.clone(),
        output_dir: output_dir.clone(),
        channel: ChannelConfig::from_env(&output_dir),
    };

    match run_job(config, mode, storage.as_ref(), stop).await {
        Ok(summary) => {
            let result = ExecutionRepo::finalize(
                &pool,
                execution.id,
                summary.counters.total_rows as i64,
                summary.counters.success as i64,
                summary.counters.error as i64,
                summary.archive_key.as_deref(),
                summary.download_url.as_deref(),
                summary.cancelled,
            )
            .await;
            if let Err(e) = result {
                tracing::error!(execution_id = execution.id, error = %e, "failed to record outcome");
            }
        }
        Err(e) => {
            tracing::error!(execution_id = execution.id, error = %e, "execution failed");
            fail(&pool, execution.id, &e.to_string()).await;
        }
    }
}

async fn fail(pool: &PgPool, execution_id: i64, reason: &str) {
    if let Err(e) = ExecutionRepo::fail(pool, execution_id, reason).await {
        tracing::error!(execution_id, error = %e, "failed to record failure");
    }
}

/// Rebuild the task descriptor from the execution row plus its
/// gateway-written parameters.
fn descriptor_from(execution: &Execution) -> Result<TaskDescriptor, String> {
    let storage_folder = execution
        .parameters
        .get("storage_folder")
        .and_then(|v| v.as_str())
        .ok_or("parameters missing storage_folder")?
        .to_string();
    let license_token = execution
        .parameters
        .get("license_token")
        .and_then(|v| v.as_str())
        .ok_or("parameters missing license_token")?
        .to_string();

    Ok(TaskDescriptor {
        storage_folder,
        bot_name: execution.bot_name.clone(),
        system: execution.system.clone(),
        bot_type: execution.bot_type.clone(),
        user: execution.user_name.clone(),
        license_token,
        execution_id: execution.id,
    })
}
