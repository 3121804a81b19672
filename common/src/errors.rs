// Error handling framework

use thiserror::Error;

/// Schedule-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Trigger with cron expression '{0}' will never fire")]
    NeverFires(String),
}

/// Validation errors raised while accepting a job submission
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("A job requires at least one trigger")]
    EmptyTriggers,

    #[error(
        "group provided in the job body should be unspecified or match the path group. \
         Current group in path is '{path_group}' and in body is '{body_group}'."
    )]
    GroupMismatch {
        path_group: String,
        body_group: String,
    },
}

/// Errors raised while encoding or decoding a job to/from the engine data map
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Missing data map key: {0}")]
    MissingKey(String),

    #[error("Invalid data map value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Data map key '{0}' is reserved")]
    ReservedKey(String),
}

/// Errors reported by a scheduling engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Job '{group}.{name}' is already registered")]
    AlreadyExists { group: String, name: String },

    #[error("Scheduling engine unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the scheduler adapter to its callers
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("already exists a job in group '{group}' with name '{name}'.")]
    DuplicateJobKey { group: String, name: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Scheduling engine failure: {0}")]
    Engine(#[from] EngineError),
}

impl SchedulerError {
    /// Whether the error is caused by the caller's input rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::DuplicateJobKey { .. }
                | SchedulerError::Validation(_)
                | SchedulerError::Schedule(_)
        )
    }
}

/// Job execution errors. These never leave the executor; they are logged
/// and reflected in the audit record.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("HTTP client initialization failed: {0}")]
    ClientInitFailed(String),

    #[error("HTTP request failed: {0}")]
    HttpRequestFailed(String),

    #[error("Audit delivery failed: {0}")]
    AuditDeliveryFailed(String),
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        ExecutionError::HttpRequestFailed(err.to_string())
    }
}
