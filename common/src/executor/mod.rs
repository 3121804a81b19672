// Executor module: runs fired jobs according to their type

pub mod http;

pub use http::HttpJobExecutor;

use crate::models::{JobPayload, JobRecord};
use crate::registry::JobTypeRegistry;
use crate::scheduler::engine::{JobRunner, Registration};
use crate::trigger::from_engine_trigger;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, instrument};

/// Decodes fired registrations and hands them to the executor of their type
pub struct JobDispatcher {
    registry: Arc<JobTypeRegistry>,
    http: Arc<HttpJobExecutor>,
}

impl JobDispatcher {
    pub fn new(registry: Arc<JobTypeRegistry>, http: Arc<HttpJobExecutor>) -> Self {
        Self { registry, http }
    }

    async fn execute(&self, fired: Registration) {
        let triggers = fired.triggers.iter().map(from_engine_trigger);
        let record = match JobRecord::decode(
            fired.detail.key.clone(),
            &fired.detail.job_type,
            &fired.detail.data,
            triggers,
            &self.registry,
        ) {
            Ok(record) => record,
            Err(e) => {
                error!(job_type = %fired.detail.job_type, error = %e, "Cannot decode fired job");
                return;
            }
        };

        match &record.payload {
            JobPayload::Http(payload) => {
                self.http.run(&record, payload).await;
            }
        }
    }
}

#[async_trait]
impl JobRunner for JobDispatcher {
    #[instrument(skip_all, fields(job = %fired.detail.key))]
    async fn run(&self, fired: Registration) {
        if AssertUnwindSafe(self.execute(fired))
            .catch_unwind()
            .await
            .is_err()
        {
            error!("Job run panicked");
        }
    }
}
