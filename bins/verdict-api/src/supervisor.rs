/// Broker Supervisor - keeps the dispatcher connected to RabbitMQ
///
/// **Loop:**
/// 1. Connect and install the handle (declares the task queue, sends a handshake)
/// 2. Start consuming the reply queue
/// 3. Run one recovery sweep for whatever piled up while disconnected
/// 4. Watch the connection; on loss clear the handle, wait, and start over
///
/// The HTTP surface stays up the whole time. While no handle is installed,
/// dispatches are deferred and recovery requests answer 503.

use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::Consumer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use verdict_common::config::Config;
use verdict_dispatch::amqp::AmqpTransport;
use verdict_dispatch::replies::handle_reply;
use verdict_dispatch::transport::Transport;
use verdict_dispatch::{DispatchError, Dispatcher, RecoverySweep, WorkerStatusTracker};

const LIVENESS_POLL: Duration = Duration::from_secs(1);

pub struct Supervisor {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    tracker: Arc<WorkerStatusTracker>,
    recovery: Arc<RecoverySweep>,
}

impl Supervisor {
    pub fn new(
        config: Config,
        dispatcher: Arc<Dispatcher>,
        tracker: Arc<WorkerStatusTracker>,
        recovery: Arc<RecoverySweep>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            tracker,
            recovery,
        }
    }

    pub async fn run(self) {
        let consumer_tag = format!("verdict-api-{}", uuid::Uuid::new_v4());

        loop {
            match AmqpTransport::connect(&self.config.amqp_url).await {
                Ok(transport) => self.serve(Arc::new(transport), &consumer_tag).await,
                Err(e) => warn!(error = %e, "Broker connection failed"),
            }

            info!(
                delay_secs = self.config.reconnect_delay.as_secs(),
                "Reconnecting to broker"
            );
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    /// Drive one connection until it drops
    async fn serve(&self, transport: Arc<AmqpTransport>, consumer_tag: &str) {
        let connection = self.dispatcher.connection();
        let handle: Arc<dyn Transport> = transport.clone();

        if let Err(e) = connection.install(Some(handle)).await {
            warn!(error = %e, "Broker handle rejected");
            return;
        }

        let consumer_task = match transport.consume(connection.reply_queue(), consumer_tag).await {
            Ok(consumer) => Some(self.spawn_reply_consumer(consumer)),
            Err(e) => {
                // Dispatch still works without replies; status just goes stale
                error!(queue = connection.reply_queue(), error = %e, "Failed to consume replies");
                None
            }
        };

        let recovery = self.recovery.clone();
        let batch_limit = self.config.recovery_batch_limit;
        tokio::spawn(async move {
            if let Err(e) = recovery.retry_pending(batch_limit).await {
                warn!(error = %e, "Post-connect recovery sweep failed");
            }
        });

        while transport.is_connected() {
            tokio::time::sleep(LIVENESS_POLL).await;
        }

        warn!("Broker connection lost");
        if let Err(e) = connection.install(None).await {
            warn!(error = %e, "Failed to clear broker handle");
        }
        if let Some(task) = consumer_task {
            task.abort();
        }
    }

    fn spawn_reply_consumer(&self, consumer: Consumer) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let tracker = self.tracker.clone();
        tokio::spawn(consume_replies(consumer, dispatcher, tracker))
    }
}

async fn consume_replies(
    mut consumer: Consumer,
    dispatcher: Arc<Dispatcher>,
    tracker: Arc<WorkerStatusTracker>,
) {
    info!("Reply consumer started");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                warn!(error = %e, "Reply consumer error");
                break;
            }
        };

        let acked = match handle_reply(&delivery.data, &dispatcher, &tracker).await {
            Ok(reply) => {
                debug!(reply = ?reply, "Reply handled");
                delivery.acker.ack(BasicAckOptions::default()).await
            }
            Err(DispatchError::Codec(e)) => {
                // Redelivering cannot fix a malformed body
                warn!(error = %e, "Dropping malformed reply");
                delivery
                    .acker
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
            }
            Err(e) => {
                warn!(error = %e, "Reply handling failed, requeueing");
                delivery
                    .acker
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
            }
        };

        if let Err(e) = acked {
            warn!(error = %e, "Failed to settle reply");
        }
    }

    info!("Reply consumer stopped");
}

/// Re-dispatch pending submissions on a fixed interval.
/// Runs for the life of the process; ticks while disconnected are skipped.
pub async fn run_periodic_recovery(
    recovery: Arc<RecoverySweep>,
    interval: Duration,
    batch_limit: usize,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; the supervisor already sweeps on connect
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match recovery.retry_pending(batch_limit).await {
            Ok(_) => {}
            Err(e) if e.is_disconnected() => debug!("Broker disconnected, recovery tick skipped"),
            Err(e) => warn!(error = %e, "Periodic recovery sweep failed"),
        }
    }
}
