//! Binary entry point: configuration, database migration, worker pool, and
//! the HTTP listener, with coordinated shutdown across all of them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leakscan_core::detect::DetectionEngine;
use leakscan_core::orchestrate::JobOrchestrator;
use leakscan_core::persistence::postgres::{
    PostgresFindingStore, PostgresJobRepository, PostgresObjectLedger,
};
use leakscan_core::queue::postgres::PostgresWorkQueue;
use leakscan_core::store::fs::FsObjectStore;
use leakscan_core::worker::{ScanWorker, WorkerConfig};

use leakscan_server::infra::app_state::AppState;
use leakscan_server::infra::config::Config;
use leakscan_server::routes;

#[derive(Parser, Debug)]
#[command(name = "leakscan-server")]
#[command(about = "Sensitive-data scanning service over an object store")]
struct Cli {
    /// Path to an env file loaded before configuration resolution.
    #[arg(long, env = "LEAKSCAN_ENV_FILE")]
    env_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {path}"))?;
        }
        None => {
            // Best effort; a missing .env is fine.
            let _ = dotenvy::dotenv();
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| "leakscan_server=info,leakscan_core=info,tower_http=info".into(),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);
    info!(
        host = %config.server_host,
        port = config.server_port,
        workers = config.worker_count,
        "starting leakscan server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(16)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let jobs = Arc::new(PostgresJobRepository::new(pool.clone()));
    let ledger = Arc::new(PostgresObjectLedger::new(pool.clone()));
    let findings = Arc::new(PostgresFindingStore::new(pool.clone()));
    let queue = Arc::new(PostgresWorkQueue::new(
        pool.clone(),
        config.queue_visibility_secs,
        config.queue_max_receives,
    ));
    let object_store = Arc::new(FsObjectStore::new(&config.object_store_root));

    let orchestrator = Arc::new(JobOrchestrator::new(
        jobs.clone(),
        ledger.clone(),
        object_store.clone(),
        queue.clone(),
        config.enumeration_page_size,
    ));

    let engine = Arc::new(DetectionEngine::with_builtin_detectors());
    let worker_config = WorkerConfig {
        batch_size: config.worker_batch_size,
        poll_interval: Duration::from_millis(config.worker_poll_ms),
    };

    let cancel = CancellationToken::new();
    let mut worker_handles = Vec::with_capacity(config.worker_count);
    for i in 0..config.worker_count {
        let worker = ScanWorker::new(
            format!("worker-{i}"),
            ledger.clone(),
            findings.clone(),
            object_store.clone(),
            queue.clone(),
            engine.clone(),
            worker_config,
        );
        worker_handles.push(tokio::spawn(worker.run(cancel.clone())));
    }

    let state = AppState {
        config: config.clone(),
        jobs,
        ledger,
        findings,
        orchestrator,
    };
    let app = routes::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("http listener stopped, draining workers");
    cancel.cancel();
    for handle in worker_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "worker task panicked");
        }
    }
    pool.close().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }
}
