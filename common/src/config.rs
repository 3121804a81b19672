// Configuration management with layered configuration (defaults, files, env)

use crate::schedule::parse_timezone;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub poll_interval_millis: u64,
    pub worker_threads: usize,
    /// IANA name of the zone cron expressions are evaluated in
    pub timezone: String,
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub timeout_seconds: u64,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub strategy: RetryStrategyKind,
    pub base_delay_millis: u64,
    pub max_delay_millis: u64,
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategyKind {
    None,
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// Prometheus listener port; no exporter is installed when unset
    pub metrics_port: Option<u16>,
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Built-in defaults so every file layer may be partial
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("ONYX")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.scheduler.poll_interval_millis == 0 {
            return Err("Scheduler poll_interval_millis must be greater than 0".to_string());
        }
        if self.scheduler.worker_threads == 0 {
            return Err("Scheduler worker_threads must be greater than 0".to_string());
        }
        parse_timezone(&self.scheduler.timezone).map_err(|e| e.to_string())?;

        if self.executor.timeout_seconds == 0 {
            return Err("Executor timeout_seconds must be greater than 0".to_string());
        }
        let retry = &self.executor.retry;
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err("Retry jitter_factor must be between 0.0 and 1.0".to_string());
        }
        if retry.strategy == RetryStrategyKind::Exponential
            && retry.max_delay_millis < retry.base_delay_millis
        {
            return Err("Retry max_delay_millis must not be below base_delay_millis".to_string());
        }

        if self.observability.metrics_port == Some(0) {
            return Err("Metrics port must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            scheduler: SchedulerConfig {
                poll_interval_millis: 250,
                worker_threads: 10,
                timezone: "UTC".to_string(),
                shutdown_grace_seconds: 10,
            },
            executor: ExecutorConfig {
                timeout_seconds: 30,
                retry: RetryConfig {
                    strategy: RetryStrategyKind::None,
                    base_delay_millis: 500,
                    max_delay_millis: 30_000,
                    jitter_factor: 0.1,
                },
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: None,
                tracing_endpoint: None,
            },
        }
    }
}
