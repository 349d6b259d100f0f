//! The single inference worker process.

use anyhow::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use actors::{InferenceBackend, WorkerArgs, WorkerConfig, start_worker};
use db::DbConfig;
use db::repositories::ReadinessRepository;
use queue_core::ReadinessState;
use storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    let backend = match &config.backend {
        InferenceBackend::Process(_) => "process",
        InferenceBackend::Synthetic { .. } => "synthetic",
    };
    tracing::info!(worker_id = %config.worker_id, backend, params = ?config.params, "Loaded worker configuration");

    // --- Stores ---
    let db_config = DbConfig::from_env();
    if db_config.is_process_local() {
        tracing::warn!(
            endpoint = %db_config.endpoint,
            "Job store is in-memory; producer replicas cannot see this worker's jobs or readiness"
        );
    }
    db::init(db_config).await.context("job store initialization failed")?;
    let storage = Storage::from_env().await.context("artifact store initialization failed")?;

    // --- Worker ---
    let pipeline = config.build_pipeline();
    let (worker, mut handle) = start_worker(WorkerArgs {
        config,
        pipeline,
        storage,
    })
    .await
    .map_err(anyhow::Error::from_boxed)?;

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Stopping after the current job");
            worker.stop(None);
            handle.await?;
        }
        finished = &mut handle => {
            finished?;
            match ReadinessRepository::get_state().await.context("worker stopped; gate unreadable")? {
                ReadinessState::Ready => tracing::warn!("Worker stopped on its own"),
                ReadinessState::Fault(reason) => anyhow::bail!("worker initialization failed: {reason}"),
                ReadinessState::Building => anyhow::bail!("worker stopped before the model became ready"),
            }
        }
    }

    tracing::info!("Inference worker stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "inference_worker=info,actors=info,db=info,storage=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
