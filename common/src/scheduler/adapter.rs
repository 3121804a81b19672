// Job scheduler facade over a scheduling engine
//
// Translates job records into engine registrations (and back) so callers
// never touch engine types.

use crate::errors::{EngineError, SchedulerError, ValidationError};
use crate::models::{JobKey, JobRecord};
use crate::registry::JobTypeRegistry;
use crate::scheduler::engine::{JobDetail, SchedulingEngine};
use crate::trigger::{from_engine_trigger, to_engine_trigger};
use chrono::Utc;
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Schedules, lists, fetches and deletes jobs
pub struct JobScheduler {
    engine: Arc<dyn SchedulingEngine>,
    registry: Arc<JobTypeRegistry>,
    timezone: Tz,
}

impl JobScheduler {
    /// `timezone` is the zone cron triggers are evaluated in
    pub fn new(
        engine: Arc<dyn SchedulingEngine>,
        registry: Arc<JobTypeRegistry>,
        timezone: Tz,
    ) -> Self {
        Self {
            engine,
            registry,
            timezone,
        }
    }

    /// Register `job` and all its triggers with the engine
    #[instrument(skip(self, job), fields(job_id = %job.id, job = %job.key))]
    pub async fn schedule_job(&self, job: &JobRecord) -> Result<(), SchedulerError> {
        if job.triggers.is_empty() {
            return Err(ValidationError::EmptyTriggers.into());
        }

        let now = Utc::now();
        let triggers = job
            .triggers
            .iter()
            .map(|trigger| to_engine_trigger(trigger, now, self.timezone))
            .collect::<Result<Vec<_>, _>>()?;

        let detail = JobDetail {
            key: job.key.clone(),
            job_type: job.type_tag().to_string(),
            data: job.encode(&self.registry)?,
        };

        self.engine
            .register(detail, triggers)
            .await
            .map_err(|e| match e {
                EngineError::AlreadyExists { group, name } => {
                    SchedulerError::DuplicateJobKey { group, name }
                }
                other => SchedulerError::Engine(other),
            })?;

        info!(
            job_type = job.type_tag(),
            triggers = job.triggers.len(),
            "Job scheduled"
        );
        Ok(())
    }

    /// Keys of every job with a pending trigger
    pub async fn get_job_keys(&self) -> Result<BTreeSet<JobKey>, SchedulerError> {
        Ok(self.engine.list_keys().await?)
    }

    pub async fn get_job_keys_by_group(
        &self,
        group: &str,
    ) -> Result<BTreeSet<JobKey>, SchedulerError> {
        Ok(self.engine.list_keys_by_group(group).await?)
    }

    /// Fetch a job, or `None` if nothing is registered under `key`
    #[instrument(skip(self), fields(job = %key))]
    pub async fn get_job(&self, key: &JobKey) -> Result<Option<JobRecord>, SchedulerError> {
        let Some(registration) = self.engine.get_registration(key).await? else {
            debug!("Job not found");
            return Ok(None);
        };

        let triggers = registration.triggers.iter().map(from_engine_trigger);
        let record = JobRecord::decode(
            registration.detail.key.clone(),
            &registration.detail.job_type,
            &registration.detail.data,
            triggers,
            &self.registry,
        )?;
        Ok(Some(record))
    }

    /// Remove a job and its triggers. Returns whether a job was removed;
    /// deleting an unknown key is not an error.
    #[instrument(skip(self), fields(job = %key))]
    pub async fn delete_job(&self, key: &JobKey) -> Result<bool, SchedulerError> {
        let removed = self.engine.cancel(key).await?;
        if removed {
            info!("Job deleted");
        } else {
            debug!("No job to delete");
        }
        Ok(removed)
    }
}
