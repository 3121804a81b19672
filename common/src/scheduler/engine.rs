// Scheduling engine contract and the in-process engine
//
// The engine owns job registrations: a job detail (key, type tag and string
// data map) plus the triggers that fire it. It knows nothing about HTTP or
// job semantics; fired registrations are handed to a `JobRunner`.

use crate::errors::{EngineError, ScheduleError};
use crate::models::JobKey;
use crate::registry::DataMap;
use crate::schedule::{next_cron_fire, parse_cron_expression};
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Cron trigger evaluated in a fixed timezone
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expression: String,
    schedule: CronSchedule,
    timezone: Tz,
    next_fire_time: Option<DateTime<Utc>>,
}

impl CronTrigger {
    /// Create a cron trigger whose first fire time is strictly after `now`.
    ///
    /// Fails when the expression does not parse or has no future occurrence.
    pub fn new(expression: &str, timezone: Tz, now: DateTime<Utc>) -> Result<Self, ScheduleError> {
        let schedule = parse_cron_expression(expression)?;
        let next_fire_time = next_cron_fire(&schedule, now, timezone);
        if next_fire_time.is_none() {
            return Err(ScheduleError::NeverFires(expression.to_string()));
        }

        Ok(Self {
            expression: expression.to_string(),
            schedule,
            timezone,
            next_fire_time,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// One-shot or fixed-repeat trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleTrigger {
    pub start_time: DateTime<Utc>,
    /// Number of repeats after the first fire
    pub repeat_count: u32,
    pub repeat_interval: ChronoDuration,
    pub times_triggered: u32,
    pub next_fire_time: Option<DateTime<Utc>>,
}

impl SimpleTrigger {
    /// Fire once at `start`, never repeat
    pub fn once_at(start: DateTime<Utc>) -> Self {
        Self {
            start_time: start,
            repeat_count: 0,
            repeat_interval: ChronoDuration::zero(),
            times_triggered: 0,
            next_fire_time: Some(start),
        }
    }
}

/// Trigger as held by the engine
#[derive(Debug, Clone)]
pub enum EngineTrigger {
    Cron(CronTrigger),
    Simple(SimpleTrigger),
}

impl EngineTrigger {
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        match self {
            EngineTrigger::Cron(cron) => cron.next_fire_time,
            EngineTrigger::Simple(simple) => simple.next_fire_time,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire_time().is_some_and(|next| next <= now)
    }

    /// Record a fire at `now` and advance to the following fire time
    pub fn fired(&mut self, now: DateTime<Utc>) {
        match self {
            EngineTrigger::Cron(cron) => {
                cron.next_fire_time = next_cron_fire(&cron.schedule, now, cron.timezone);
            }
            EngineTrigger::Simple(simple) => {
                simple.times_triggered += 1;
                simple.next_fire_time = if simple.times_triggered > simple.repeat_count {
                    None
                } else {
                    simple
                        .next_fire_time
                        .map(|previous| previous + simple.repeat_interval)
                };
            }
        }
    }
}

/// Job identity and payload as stored by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDetail {
    pub key: JobKey,
    pub job_type: String,
    pub data: DataMap,
}

/// A job detail together with its triggers
#[derive(Debug, Clone)]
pub struct Registration {
    pub detail: JobDetail,
    pub triggers: Vec<EngineTrigger>,
}

impl Registration {
    /// True while at least one trigger has a future fire time
    pub fn is_pending(&self) -> bool {
        self.triggers
            .iter()
            .any(|trigger| trigger.next_fire_time().is_some())
    }
}

/// Registration contract of a scheduling engine.
///
/// Only jobs with at least one pending trigger are visible through it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchedulingEngine: Send + Sync {
    /// Register a job with its triggers. Fails with `AlreadyExists` if a
    /// pending job with the same key is registered.
    async fn register(
        &self,
        detail: JobDetail,
        triggers: Vec<EngineTrigger>,
    ) -> Result<(), EngineError>;

    async fn list_keys(&self) -> Result<BTreeSet<JobKey>, EngineError>;

    async fn list_keys_by_group(&self, group: &str) -> Result<BTreeSet<JobKey>, EngineError>;

    async fn get_registration(&self, key: &JobKey) -> Result<Option<Registration>, EngineError>;

    /// Remove a job and its triggers. Returns whether anything was removed.
    async fn cancel(&self, key: &JobKey) -> Result<bool, EngineError>;
}

/// Receives registrations whose trigger fired
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, fired: Registration);
}

/// Configuration for the in-process engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often to look for due triggers (in milliseconds)
    pub poll_interval_millis: u64,
    /// Maximum number of runs executing at the same time
    pub worker_threads: usize,
    /// How long `stop` waits for in-flight runs (in seconds)
    pub shutdown_grace_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_millis: 250,
            worker_threads: 10,
            shutdown_grace_seconds: 10,
        }
    }
}

/// In-memory scheduling engine with a polling loop
pub struct LocalEngine {
    config: EngineConfig,
    jobs: RwLock<HashMap<JobKey, Registration>>,
    runner: Arc<dyn JobRunner>,
    workers: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
}

impl LocalEngine {
    pub fn new(config: EngineConfig, runner: Arc<dyn JobRunner>) -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        let workers = Arc::new(Semaphore::new(config.worker_threads.max(1)));

        Self {
            config,
            jobs: RwLock::new(HashMap::new()),
            runner,
            workers,
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver; its value turns `true` once `stop` is called
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Number of registered jobs with a pending trigger
    pub async fn pending_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|registration| registration.is_pending())
            .count()
    }

    /// Run the polling loop until `stop` is called
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!(
            poll_interval_millis = self.config.poll_interval_millis,
            worker_threads = self.config.worker_threads,
            "Starting scheduling engine"
        );

        let mut poll_interval = interval(Duration::from_millis(
            self.config.poll_interval_millis.max(1),
        ));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_receiver();
        if *shutdown_rx.borrow_and_update() {
            info!("Scheduling engine already stopped");
            return;
        }

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    let count = self.fire_due_triggers(Utc::now()).await;
                    if count > 0 {
                        debug!(fired = count, "Dispatched fired jobs");
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping scheduling engine");
                    break;
                }
            }
        }

        info!("Scheduling engine stopped");
    }

    /// Stop the polling loop and wait for in-flight runs
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!("Stopping scheduling engine");

        // Stored even when the loop has not subscribed yet
        self.shutdown_tx.send_replace(true);

        let permits = self.config.worker_threads.max(1) as u32;
        let grace = Duration::from_secs(self.config.shutdown_grace_seconds);
        match tokio::time::timeout(grace, self.workers.acquire_many(permits)).await {
            Ok(Ok(_all)) => info!("Scheduling engine stopped gracefully"),
            Ok(Err(e)) => error!(error = %e, "Worker pool closed during shutdown"),
            Err(_) => warn!(
                grace_seconds = self.config.shutdown_grace_seconds,
                "In-flight runs still executing after shutdown grace period"
            ),
        }
    }

    /// Fire every trigger due at `now`, drop registrations with nothing left
    /// to fire and dispatch one run per fired trigger.
    ///
    /// Returns the number of runs dispatched.
    pub async fn fire_due_triggers(&self, now: DateTime<Utc>) -> usize {
        let mut fired = Vec::new();

        {
            let mut jobs = self.jobs.write().await;

            for registration in jobs.values_mut() {
                let mut due = 0;
                for trigger in registration.triggers.iter_mut() {
                    if trigger.is_due(now) {
                        trigger.fired(now);
                        due += 1;
                    }
                }
                for _ in 0..due {
                    fired.push(registration.clone());
                }
            }

            jobs.retain(|key, registration| {
                let pending = registration.is_pending();
                if !pending {
                    debug!(job = %key, "Job has no remaining fire times, removing");
                }
                pending
            });

            telemetry::update_pending_jobs(jobs.len());
        }

        let count = fired.len();
        for registration in fired {
            self.dispatch(registration);
        }
        count
    }

    fn dispatch(&self, registration: Registration) {
        telemetry::record_job_fired(&registration.detail.job_type);

        let runner = Arc::clone(&self.runner);
        let workers = Arc::clone(&self.workers);
        tokio::spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(job = %registration.detail.key, error = %e, "Worker pool closed, dropping run");
                    return;
                }
            };
            runner.run(registration).await;
        });
    }
}

#[async_trait]
impl SchedulingEngine for LocalEngine {
    #[instrument(skip(self, detail, triggers), fields(job = %detail.key))]
    async fn register(
        &self,
        detail: JobDetail,
        triggers: Vec<EngineTrigger>,
    ) -> Result<(), EngineError> {
        let mut jobs = self.jobs.write().await;

        if jobs
            .get(&detail.key)
            .is_some_and(Registration::is_pending)
        {
            return Err(EngineError::AlreadyExists {
                group: detail.key.group.clone(),
                name: detail.key.name.clone(),
            });
        }

        debug!(triggers = triggers.len(), "Registering job");
        jobs.insert(detail.key.clone(), Registration { detail, triggers });
        telemetry::update_pending_jobs(jobs.len());
        Ok(())
    }

    async fn list_keys(&self) -> Result<BTreeSet<JobKey>, EngineError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .filter(|(_, registration)| registration.is_pending())
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn list_keys_by_group(&self, group: &str) -> Result<BTreeSet<JobKey>, EngineError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .iter()
            .filter(|(key, registration)| key.group == group && registration.is_pending())
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn get_registration(&self, key: &JobKey) -> Result<Option<Registration>, EngineError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(key).filter(|r| r.is_pending()).cloned())
    }

    #[instrument(skip(self), fields(job = %key))]
    async fn cancel(&self, key: &JobKey) -> Result<bool, EngineError> {
        let mut jobs = self.jobs.write().await;
        let removed = jobs.remove(key).is_some();
        if removed {
            debug!("Job cancelled");
        }
        telemetry::update_pending_jobs(jobs.len());
        Ok(removed)
    }
}
