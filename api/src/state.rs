use std::sync::Arc;

use common::bootstrap::SchedulerRuntime;
use common::scheduler::{JobScheduler, LocalEngine};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<JobScheduler>,
    pub engine: Arc<LocalEngine>,
}

impl AppState {
    pub fn new(runtime: &SchedulerRuntime) -> Self {
        Self {
            scheduler: Arc::clone(&runtime.scheduler),
            engine: Arc::clone(&runtime.engine),
        }
    }
}
