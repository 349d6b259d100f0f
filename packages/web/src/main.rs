//! Front-end replica: serves the producer HTTP surface.

use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use api::{Producer, ServerConfig};
use db::DbConfig;
use storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        replica = %config.replica_id,
        "Loaded server configuration"
    );

    // --- Job store ---
    let db_config = DbConfig::from_env();
    if db_config.is_process_local() {
        tracing::warn!(
            endpoint = %db_config.endpoint,
            "Job store is in-memory; this replica shares no jobs with the worker or other replicas"
        );
    }
    db::init(db_config).await.context("job store initialization failed")?;
    db::health_check().await.context("job store health check failed")?;

    // --- Artifact store ---
    let storage = Storage::from_env().await.context("artifact store initialization failed")?;

    // --- Router ---
    let host: IpAddr = config.host.parse().with_context(|| format!("invalid HOST {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    let producer = Producer::new(config.replica_id.clone(), storage);
    let app = api::build_app(producer, config);

    // --- Start server ---
    tracing::info!(%addr, "Starting producer");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "producer=info,api=info,db=info,storage=info,tower_http=info".into());
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
