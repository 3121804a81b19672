// Telemetry module for structured logging, metrics, and tracing

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "onyx-scheduler";

/// Initialize structured logging with JSON formatting.
///
/// `RUST_LOG` takes precedence over `log_level`. When `tracing_endpoint` is
/// set, spans are also exported over OTLP.
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_names(true)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized"
    );

    Ok(())
}

/// Initialize OpenTelemetry tracer with OTLP exporter
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing::info!(endpoint = endpoint, "OpenTelemetry tracer initialized");

    Ok(tracer)
}

/// Flush remaining spans on shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Install the Prometheus exporter and describe the scheduler metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("onyx_jobs_fired_total", "Total number of trigger firings");
    describe_counter!(
        "onyx_http_attempts_total",
        "Total number of HTTP attempts made by job runs"
    );
    describe_counter!("onyx_job_success_total", "Total number of successful job runs");
    describe_counter!("onyx_job_failed_total", "Total number of failed job runs");
    describe_histogram!(
        "onyx_job_duration_seconds",
        "Duration of job runs including retries, in seconds"
    );
    describe_counter!(
        "onyx_audit_delivery_failures_total",
        "Total number of audit records that could not be delivered"
    );
    describe_gauge!("onyx_pending_jobs", "Jobs registered with a pending trigger");

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_job_fired(job_type: &str) {
    counter!("onyx_jobs_fired_total", "job_type" => job_type.to_string()).increment(1);
}

/// `outcome` is `success`, `failure` or `error` (no response)
#[inline]
pub fn record_http_attempt(outcome: &'static str) {
    counter!("onyx_http_attempts_total", "outcome" => outcome).increment(1);
}

#[inline]
pub fn record_job_success(group: &str) {
    counter!("onyx_job_success_total", "group" => group.to_string()).increment(1);
}

#[inline]
pub fn record_job_failure(group: &str) {
    counter!("onyx_job_failed_total", "group" => group.to_string()).increment(1);
}

#[inline]
pub fn record_job_duration(group: &str, duration_seconds: f64) {
    histogram!("onyx_job_duration_seconds", "group" => group.to_string()).record(duration_seconds);
}

#[inline]
pub fn record_audit_delivery_failure() {
    counter!("onyx_audit_delivery_failures_total").increment(1);
}

#[inline]
pub fn update_pending_jobs(count: usize) {
    gauge!("onyx_pending_jobs").set(count as f64);
}
