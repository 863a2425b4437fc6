//! Sound extraction worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sndx_media::{FfmpegRunner, FfmpegToolkit};
use sndx_queue::{QueueConfig, RedisStatusPublisher, TaskQueue};
use sndx_storage::S3Client;
use sndx_worker::{LocalFileDeleter, PipelineOrchestrator, TaskExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["sndx=info", "aws_config=warn", "aws_smithy_runtime=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

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

    info!("Starting sndx-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match sndx_worker::metrics::init_metrics(addr) {
            Ok(()) => info!("Serving metrics on {}", addr),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    let storage = match S3Client::from_env().await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create storage client: {}", e);
            std::process::exit(1);
        }
    };

    let queue_config = QueueConfig::from_env();
    let status = match RedisStatusPublisher::new(
        &queue_config.redis_url,
        queue_config.status_stream_name.clone(),
    ) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to create status publisher: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match TaskQueue::new(queue_config) {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create task queue: {}", e);
            std::process::exit(1);
        }
    };

    let mut runner = FfmpegRunner::new();
    if let Some(timeout) = config.ffmpeg_timeout {
        runner = runner.with_timeout(timeout.as_secs());
    }
    let media = FfmpegToolkit::new(runner, config.segment_ms);

    let orchestrator = PipelineOrchestrator::new(
        Arc::new(storage),
        Arc::new(media),
        Arc::new(status),
        Arc::new(LocalFileDeleter),
        config.scratch_dir.clone(),
    )
    .with_message_type(config.message_type.clone());

    let executor = TaskExecutor::new(config, queue, orchestrator);

    // Stop consuming on Ctrl-C; in-flight tasks are allowed to finish
    let shutdown = executor.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown.send(true);
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
