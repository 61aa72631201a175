//! Pipeline worker binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vforge_worker::{JobExecutor, WorkerConfig, WorkerContext};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vforge=info".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("aws_sdk_s3=warn".parse().unwrap());

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

    info!("Starting vforge-worker");

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        error!("Failed to install metrics exporter: {}", e);
        std::process::exit(1);
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let ctx = match WorkerContext::from_env(config).await {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!("Failed to build worker context: {}", e);
            std::process::exit(1);
        }
    };

    let executor = JobExecutor::new(ctx);

    // Flip the shutdown flag on ctrl-c; the executor drains and returns
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx.send(true).ok();
    });

    if let Err(e) = executor.run(shutdown_rx).await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
