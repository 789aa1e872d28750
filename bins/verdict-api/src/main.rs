mod handlers;
mod routes;
mod supervisor;

use anyhow::{Context, Result};
use axum::Router;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use verdict_common::config::Config;
use verdict_dispatch::store::RedisSubmissionStore;
use verdict_dispatch::{BrokerConnection, Dispatcher, RecoverySweep, WorkerStatusTracker};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub tracker: Arc<WorkerStatusTracker>,
    pub recovery: Arc<RecoverySweep>,
    pub batch_limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Verdict API booting...");

    let config = Config::from_env().context("Invalid configuration")?;

    // Connect to Redis
    let client = redis::Client::open(config.redis_url.as_str())
        .context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis: {}", config.redis_url);

    let connection = Arc::new(BrokerConnection::from_config(&config));
    let store = Arc::new(RedisSubmissionStore::new(redis_conn));
    let dispatcher = Arc::new(Dispatcher::new(store, connection));
    let tracker = Arc::new(WorkerStatusTracker::new());
    let recovery = Arc::new(RecoverySweep::new(dispatcher.clone()));

    let state = Arc::new(AppState {
        dispatcher: dispatcher.clone(),
        tracker: tracker.clone(),
        recovery: recovery.clone(),
        batch_limit: config.recovery_batch_limit,
    });

    // Broker connection runs in the background; HTTP comes up regardless
    let supervisor = supervisor::Supervisor::new(config.clone(), dispatcher, tracker, recovery.clone());
    tokio::spawn(supervisor.run());
    tokio::spawn(supervisor::run_periodic_recovery(
        recovery,
        config.recovery_interval,
        config.recovery_batch_limit,
    ));

    // Build router
    let app = Router::new()
        .merge(routes::routes())
        .with_state(state);

    // Start server
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
