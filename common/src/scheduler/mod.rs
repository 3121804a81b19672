// Scheduling: engine contract, in-process engine and the job scheduler facade

pub mod adapter;
pub mod engine;

pub use adapter::JobScheduler;
pub use engine::{
    CronTrigger, EngineConfig, EngineTrigger, JobDetail, JobRunner, LocalEngine, Registration,
    SchedulingEngine, SimpleTrigger,
};
