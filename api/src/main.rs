use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;

use common::bootstrap::init_scheduler_runtime;
use common::config::Settings;
use common::scheduler::LocalEngine;
use common::telemetry;
use onyx_api::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Settings::load()?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &config.observability.log_level,
        config.observability.tracing_endpoint.as_deref(),
    )?;
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Configuration loaded"
    );

    if let Some(metrics_port) = config.observability.metrics_port {
        telemetry::init_metrics(metrics_port)?;
    }

    let runtime = init_scheduler_runtime(&config)?;
    let engine_task = {
        let engine = Arc::clone(&runtime.engine);
        tokio::spawn(async move { engine.start().await })
    };

    let state = AppState::new(&runtime);
    let app = create_router(state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&runtime.engine)))
        .await?;

    if let Err(e) = engine_task.await {
        tracing::error!(error = %e, "Scheduling engine task failed");
    }

    telemetry::shutdown_tracer();
    tracing::info!("Onyx server stopped");
    Ok(())
}

/// Graceful shutdown signal handler; stops the engine once a signal arrives
async fn shutdown_signal(engine: Arc<LocalEngine>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Initiating graceful shutdown");
    engine.stop().await;
}
