// CLI commands: one dispatcher operation per invocation
use anyhow::{bail, Context, Result};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use verdict_common::config::Config;
use verdict_common::envelope;
use verdict_dispatch::amqp::AmqpTransport;
use verdict_dispatch::store::RedisSubmissionStore;
use verdict_dispatch::transport::{QueueOptions, Transport};
use verdict_dispatch::{BrokerConnection, DispatchOutcome, Dispatcher, RecoverySweep};

fn load_config() -> Result<Config> {
    Config::from_env().context("Invalid configuration")
}

async fn connect_redis(config: &Config) -> Result<ConnectionManager> {
    let client = redis::Client::open(config.redis_url.as_str())
        .context("Failed to create Redis client")?;
    ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))
}

async fn connect_transport(config: &Config) -> Result<Arc<AmqpTransport>> {
    let transport = AmqpTransport::connect(&config.amqp_url)
        .await
        .with_context(|| format!("Failed to connect to broker at {}", config.amqp_url))?;
    Ok(Arc::new(transport))
}

/// Connect to the broker and install the handle. The returned transport must
/// be closed once the command is done.
async fn connect_broker(config: &Config) -> Result<(Arc<BrokerConnection>, Arc<AmqpTransport>)> {
    let transport = connect_transport(config).await?;
    let connection = Arc::new(BrokerConnection::from_config(config));
    let handle: Arc<dyn Transport> = transport.clone();
    connection
        .install(Some(handle))
        .await
        .context("Failed to declare the task queue")?;
    Ok((connection, transport))
}

async fn build_dispatcher(config: &Config) -> Result<(Arc<Dispatcher>, Arc<AmqpTransport>)> {
    let redis_conn = connect_redis(config).await?;
    let (connection, transport) = connect_broker(config).await?;
    let store = Arc::new(RedisSubmissionStore::new(redis_conn));
    Ok((Arc::new(Dispatcher::new(store, connection)), transport))
}

async fn close(transport: &AmqpTransport) {
    if let Err(e) = transport.close().await {
        eprintln!("⚠️  Broker connection did not close cleanly: {}", e);
    }
}

/// Declare the task queue and publish exactly one handshake on `transport`.
/// Installing a handle would fire a handshake of its own, so this goes to the
/// transport directly.
async fn send_handshake(transport: &dyn Transport, config: &Config) -> Result<String> {
    transport
        .declare_queue(&config.task_queue, QueueOptions::task_queue())
        .await
        .context("Failed to declare the task queue")?;

    let message = envelope::encode_handshake()?;
    tokio::time::timeout(
        config.publish_timeout,
        transport.publish(&config.task_queue, &config.reply_queue, &message),
    )
    .await
    .context("Handshake timed out")??;
    Ok(message.message_id)
}

pub async fn handshake() -> Result<()> {
    let config = load_config()?;
    let transport = connect_transport(&config).await?;

    let sent = send_handshake(transport.as_ref(), &config).await;
    close(&transport).await;
    let message_id = sent.context("Handshake failed")?;

    println!("✅ Handshake {} published to '{}'", message_id, config.task_queue);
    Ok(())
}

pub async fn probe() -> Result<()> {
    let config = load_config()?;
    let redis_conn = connect_redis(&config).await?;
    let (connection, transport) = connect_broker(&config).await?;
    let dispatcher = Dispatcher::new(Arc::new(RedisSubmissionStore::new(redis_conn)), connection);

    let probed = dispatcher.probe_status().await;
    close(&transport).await;
    probed.context("Status probe failed")?;

    println!("📡 Status probe sent; the report arrives on '{}'", config.reply_queue);
    Ok(())
}

pub async fn dispatch(submission_id: u64, result_id: u64) -> Result<()> {
    let config = load_config()?;
    let (dispatcher, transport) = build_dispatcher(&config).await?;

    let outcome = dispatcher.dispatch(submission_id, result_id).await;
    close(&transport).await;

    match outcome.context("Dispatch failed")? {
        DispatchOutcome::Sent => {
            println!("🚀 Submission {} dispatched (result {})", submission_id, result_id);
        }
        DispatchOutcome::Deferred => {
            println!("⏳ Broker unavailable; submission {} stays received", submission_id);
        }
        DispatchOutcome::AlreadyDispatched => {
            println!("ℹ️  Submission {} was already dispatched", submission_id);
        }
    }
    Ok(())
}

pub async fn retry_pending(limit: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let limit = limit.unwrap_or(config.recovery_batch_limit);
    if limit == 0 {
        bail!("--limit must be greater than zero");
    }

    let (dispatcher, transport) = build_dispatcher(&config).await?;
    let swept = RecoverySweep::new(dispatcher).retry_pending(limit).await;
    close(&transport).await;

    let dispatched = swept.context("Recovery sweep failed")?;
    println!("🔁 Re-dispatched {} pending submission(s)", dispatched);
    Ok(())
}

pub async fn resolve(message_id: &str) -> Result<()> {
    let config = load_config()?;
    let redis_conn = connect_redis(&config).await?;
    // Resolution only reads the correlation record; no broker needed
    let connection = Arc::new(BrokerConnection::from_config(&config));
    let dispatcher = Dispatcher::new(Arc::new(RedisSubmissionStore::new(redis_conn)), connection);

    match dispatcher.resolve_submission(message_id).await? {
        Some(submission_id) => println!("{}", submission_id),
        None => bail!("No submission found for message '{}'", message_id),
    }
    Ok(())
}
