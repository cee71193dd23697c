mod channels;
mod config;
mod signal;

use migration::MigratorTrait;
use pac_cluster::Cluster;
use pac_config::constants;
use pac_provider::HttpProviderFactory;
use pac_reconciler::{Informer, Reconciler};
use pac_store::Store;
use pac_sync::QueueManager;
use sea_orm::Database;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let db = Database::connect(&database_url).await?;

    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations complete");

    let cluster: Arc<dyn Cluster> = Arc::new(Store::new(db));
    let settings = pac_config::load_settings(&config::settings_path()).await?;

    // Queues must mirror cluster state before the first reconcile.
    let queues = Arc::new(QueueManager::new());
    if let Err(e) = queues.init_queues(cluster.as_ref()).await {
        tracing::error!("Queue initialization failed: {}", e);
        return Err(e.into());
    }

    let channels = channels::create_channels();
    let providers = Arc::new(HttpProviderFactory::new()?);
    let reconciler = Arc::new(Reconciler::new(
        cluster.clone(),
        queues.clone(),
        providers,
        channels.work.clone(),
        config::create_reconciler_config(settings),
    ));

    let controller_handle = tokio::spawn(pac_reconciler::run_controller(
        channels.work_rx,
        reconciler,
        config::max_concurrent_reconciles(),
        channels.shutdown_rx.clone(),
    ));

    let informer = Informer::new(cluster.clone(), channels.work.clone());
    let informer_handle = tokio::spawn(
        informer.run(config::informer_interval(), channels.shutdown_rx.clone()),
    );

    let audit_handle = tokio::spawn(pac_reconciler::run_queue_audit_job(
        cluster.clone(),
        queues.clone(),
        channels.work.clone(),
        constants::QUEUE_AUDIT_INTERVAL,
        config::queue_repair_enabled(),
        channels.shutdown_rx.clone(),
    ));

    let api_host = std::env::var("API_HOST").unwrap_or_else(|_| constants::DEFAULT_API_HOST.into());
    let api_port = std::env::var("API_PORT").unwrap_or_else(|_| constants::DEFAULT_API_PORT.into());
    let api_addr = format!("{api_host}:{api_port}");

    let api_router = pac_api::router(pac_api::AppState {
        cluster,
        queues,
        work: channels.work,
    });

    tracing::info!("Starting API server on {api_addr}");
    let listener = TcpListener::bind(&api_addr).await?;
    let shutdown_tx = channels.shutdown_tx;
    if let Err(e) = axum::serve(listener, api_router)
        .with_graceful_shutdown(async move {
            signal::shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
    {
        tracing::error!("API server failed: {}", e);
    }

    tokio::select! {
        _ = tokio::time::sleep(constants::SHUTDOWN_TIMEOUT) => {
            tracing::warn!("Shutdown timeout reached, forcing exit");
        }
        _ = async {
            let _ = tokio::join!(controller_handle, informer_handle, audit_handle);
        } => {
            tracing::info!("All components shut down gracefully");
        }
    }

    tracing::info!("Pipelines-as-Code controller shutdown complete");

    Ok(())
}
