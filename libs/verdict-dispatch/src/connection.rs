/// Broker connection lifecycle
///
/// **Responsibility:**
/// Own the transport handle every publish goes through, and swap it when the
/// broker supervisor reconnects.
///
/// **Guarantees:**
/// - A reader sees either the old handle or the new one, never a partial swap
/// - The lock is held only to clone or replace the `Arc`, never across I/O
/// - The lock is fair, so a reconnect is not starved by a stream of publishes
/// - A new handle becomes visible only after the task queue has been declared on it

use crate::error::TransportError;
use crate::metrics;
use crate::transport::{QueueOptions, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use verdict_common::config::Config;
use verdict_common::envelope::{self, OutboundMessage};

pub struct BrokerConnection {
    handle: RwLock<Option<Arc<dyn Transport>>>,
    task_queue: String,
    reply_queue: String,
    publish_timeout: Duration,
}

impl BrokerConnection {
    pub fn new(
        task_queue: impl Into<String>,
        reply_queue: impl Into<String>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            handle: RwLock::new(None),
            task_queue: task_queue.into(),
            reply_queue: reply_queue.into(),
            publish_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.task_queue.clone(),
            config.reply_queue.clone(),
            config.publish_timeout,
        )
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Replace the active handle.
    ///
    /// `Some` declares the task queue on the new handle, installs it and fires a
    /// best-effort handshake. If the declaration fails nothing usable is left
    /// installed and the error is returned. `None` clears the handle so sends
    /// fail immediately instead of waiting on a dead connection.
    pub async fn install(&self, handle: Option<Arc<dyn Transport>>) -> Result<(), TransportError> {
        let Some(handle) = handle else {
            self.swap(None).await;
            info!("Broker handle cleared");
            return Ok(());
        };

        let declared = tokio::time::timeout(
            self.publish_timeout,
            handle.declare_queue(&self.task_queue, QueueOptions::task_queue()),
        )
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::Timeout {
                queue: self.task_queue.clone(),
                timeout: self.publish_timeout,
            })
        });

        if let Err(e) = declared {
            warn!(queue = %self.task_queue, error = %e, "Failed to declare task queue");
            self.swap(None).await;
            return Err(e);
        }

        self.swap(Some(handle)).await;
        info!(queue = %self.task_queue, "Broker handle installed");

        self.handshake().await;
        Ok(())
    }

    async fn swap(&self, handle: Option<Arc<dyn Transport>>) {
        let connected = handle.is_some();
        *self.handle.write().await = handle;
        metrics::BROKER_CONNECTED.set(connected as i64);
    }

    /// Current handle, if any. The lock is released before returning.
    pub async fn current(&self) -> Option<Arc<dyn Transport>> {
        self.handle.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.handle
            .read()
            .await
            .as_ref()
            .map(|handle| handle.is_connected())
            .unwrap_or(false)
    }

    /// Publish to the task queue, bounded by the publish timeout
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let handle = self
            .current()
            .await
            .filter(|handle| handle.is_connected())
            .ok_or(TransportError::Disconnected)?;

        match tokio::time::timeout(
            self.publish_timeout,
            handle.publish(&self.task_queue, &self.reply_queue, message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                queue: self.task_queue.clone(),
                timeout: self.publish_timeout,
            }),
        }
    }

    /// Reachability probe. Failures are logged and never returned.
    pub async fn handshake(&self) {
        let message = match envelope::encode_handshake() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to encode handshake");
                return;
            }
        };

        match self.send(&message).await {
            Ok(()) => debug!(message_id = %message.message_id, "Handshake sent"),
            Err(e) => warn!(error = %e, "Handshake failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use verdict_common::envelope::MessageType;

    fn connection() -> BrokerConnection {
        BrokerConnection::new("tasks", "replies", Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let conn = connection();
        assert!(!conn.is_connected().await);
        assert!(conn.current().await.is_none());

        let probe = envelope::encode_status_probe().unwrap();
        assert!(matches!(conn.send(&probe).await, Err(TransportError::Disconnected)));
    }

    #[tokio::test]
    async fn test_install_declares_queue_and_sends_handshake() {
        let conn = connection();
        let transport = MockTransport::connected();

        conn.install(Some(transport.clone())).await.unwrap();

        assert!(conn.is_connected().await);
        assert_eq!(transport.declared(), vec![("tasks".to_string(), QueueOptions::task_queue())]);

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].queue, "tasks");
        assert_eq!(published[0].reply_to, "replies");
        assert_eq!(published[0].kind, MessageType::Handshake);
    }

    #[tokio::test]
    async fn test_failed_handshake_does_not_fail_install() {
        let conn = connection();
        let transport = MockTransport::connected();
        transport.fail_publishes(true);

        conn.install(Some(transport.clone())).await.unwrap();

        assert!(conn.is_connected().await);
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_failed_declaration_leaves_nothing_installed() {
        let conn = connection();
        conn.install(Some(MockTransport::connected())).await.unwrap();

        let broken = MockTransport::connected();
        broken.fail_declarations(true);

        assert!(conn.install(Some(broken)).await.is_err());
        assert!(!conn.is_connected().await);
    }

    #[tokio::test]
    async fn test_install_none_clears_handle() {
        let conn = connection();
        conn.install(Some(MockTransport::connected())).await.unwrap();
        conn.install(None).await.unwrap();

        assert!(!conn.is_connected().await);
        let probe = envelope::encode_status_probe().unwrap();
        assert!(matches!(conn.send(&probe).await, Err(TransportError::Disconnected)));
    }

    #[tokio::test]
    async fn test_dead_handle_counts_as_disconnected() {
        let conn = connection();
        let transport = MockTransport::connected();
        conn.install(Some(transport.clone())).await.unwrap();

        transport.set_connected(false);

        assert!(!conn.is_connected().await);
        let probe = envelope::encode_status_probe().unwrap();
        assert!(matches!(conn.send(&probe).await, Err(TransportError::Disconnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out() {
        let conn = connection();
        let transport = MockTransport::connected();
        conn.install(Some(transport.clone())).await.unwrap();
        transport.hang_publishes(true);

        let probe = envelope::encode_status_probe().unwrap();
        let err = conn.send(&probe).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_reconnect_swaps_handle() {
        let conn = connection();
        let first = MockTransport::connected();
        let second = MockTransport::connected();

        conn.install(Some(first.clone())).await.unwrap();
        conn.install(Some(second.clone())).await.unwrap();

        let probe = envelope::encode_status_probe().unwrap();
        conn.send(&probe).await.unwrap();

        assert_eq!(first.published().len(), 1); // handshake only
        assert_eq!(second.published().len(), 2); // handshake + probe
    }
}
