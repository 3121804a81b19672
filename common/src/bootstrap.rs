// Bootstrap utilities: wire the engine, executor and scheduler from settings

use crate::config::Settings;
use crate::executor::{HttpJobExecutor, JobDispatcher};
use crate::registry::JobTypeRegistry;
use crate::retry;
use crate::schedule::parse_timezone;
use crate::scheduler::{EngineConfig, JobScheduler, LocalEngine};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// The in-process engine and the scheduler facade sharing it
pub struct SchedulerRuntime {
    pub engine: Arc<LocalEngine>,
    pub scheduler: Arc<JobScheduler>,
}

/// Build the scheduler runtime described by `settings`.
///
/// The engine loop is not started; callers spawn `engine.start()`.
///
/// # Errors
/// Returns error if the timezone is unknown or the HTTP client cannot be built
#[tracing::instrument(skip(settings))]
pub fn init_scheduler_runtime(settings: &Settings) -> Result<SchedulerRuntime> {
    info!("Initializing scheduler runtime");

    let timezone = parse_timezone(&settings.scheduler.timezone)
        .context("Invalid scheduler timezone")?;
    let registry = Arc::new(JobTypeRegistry::with_builtin_types());

    let http_executor = HttpJobExecutor::new(settings.executor.timeout_seconds)
        .context("Failed to initialize HTTP job executor")?
        .with_retry_strategy(retry::from_config(&settings.executor.retry));
    let dispatcher = Arc::new(JobDispatcher::new(
        Arc::clone(&registry),
        Arc::new(http_executor),
    ));

    let engine = Arc::new(LocalEngine::new(
        EngineConfig {
            poll_interval_millis: settings.scheduler.poll_interval_millis,
            worker_threads: settings.scheduler.worker_threads,
            shutdown_grace_seconds: settings.scheduler.shutdown_grace_seconds,
        },
        dispatcher,
    ));
    let scheduler = Arc::new(JobScheduler::new(engine.clone(), registry, timezone));

    info!(
        timezone = %timezone,
        worker_threads = settings.scheduler.worker_threads,
        retry_strategy = ?settings.executor.retry.strategy,
        "Scheduler runtime initialized"
    );
    Ok(SchedulerRuntime { engine, scheduler })
}
