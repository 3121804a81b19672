// Common library: job model, scheduling and execution shared by the API and tests

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod executor;
pub mod models;
pub mod registry;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod telemetry;
pub mod trigger;
