//! Media conversion worker binary.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remux_queue::JobQueue;
use remux_worker::{health, JobExecutor, ProcessingContext, WorkerConfig, WorkerError};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("remux=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting remux-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Err(e) = remux_media::check_ffmpeg() {
        warn!("{}; the transform stage will fail until it is installed", e);
    }

    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to install metrics recorder: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = match ProcessingContext::from_env() {
        Ok(ctx) => ctx,
        Err(WorkerError::ConfigError(msg)) => {
            error!("Configuration error: {}", msg);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to build processing context: {}", e);
            std::process::exit(1);
        }
    };

    let health_port = config.health_port;
    let executor = Arc::new(JobExecutor::new(config, queue, ctx));

    // Health/metrics surface
    let in_flight = executor.in_flight_handle();
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_port, in_flight, prometheus).await {
            error!("Health server error: {}", e);
        }
    });

    // Graceful shutdown on SIGINT
    let shutdown_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_executor.shutdown();
    });

    let abandoned = match executor.run().await {
        Ok(count) => count,
        Err(e) => {
            error!("Executor error: {}", e);
            std::process::exit(1);
        }
    };

    if abandoned > 0 {
        warn!("Worker shutdown with {} jobs handed back for redelivery", abandoned);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
