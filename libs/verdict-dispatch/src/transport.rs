use crate::error::TransportError;
use async_trait::async_trait;
use verdict_common::envelope::OutboundMessage;

/// Highest message priority accepted by the task queue (levels 0..=3)
pub const MAX_PRIORITY: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
    pub max_priority: Option<u8>,
}

impl QueueOptions {
    /// Outbound grading queue: survives broker restarts, priority-aware
    pub fn task_queue() -> Self {
        Self {
            durable: true,
            auto_delete: false,
            exclusive: false,
            max_priority: Some(MAX_PRIORITY),
        }
    }

    pub fn reply_queue() -> Self {
        Self {
            durable: true,
            auto_delete: false,
            exclusive: false,
            max_priority: None,
        }
    }
}

/// What the dispatcher needs from a message broker client
#[async_trait]
pub trait Transport: Send + Sync {
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<(), TransportError>;

    async fn publish(
        &self,
        queue: &str,
        reply_to: &str,
        message: &OutboundMessage,
    ) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}
