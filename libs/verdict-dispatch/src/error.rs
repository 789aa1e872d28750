use std::time::Duration;
use thiserror::Error;
use verdict_common::envelope::CodecError;
use verdict_common::types::{SubmissionId, SubmissionResultId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("submission {0} not found")]
    SubmissionNotFound(SubmissionId),

    #[error("submission result {0} not found")]
    ResultNotFound(SubmissionResultId),

    #[error("submission {0} is not in the received state")]
    NotReceived(SubmissionId),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to the broker")]
    Disconnected,

    #[error("publish to {queue} timed out after {timeout:?}")]
    Timeout { queue: String, timeout: Duration },

    #[error("broker did not confirm message {0}")]
    Nacked(String),

    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DispatchError {
    pub fn is_disconnected(&self) -> bool {
        matches!(self, DispatchError::Transport(TransportError::Disconnected))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DispatchError::Store(StoreError::SubmissionNotFound(_))
                | DispatchError::Store(StoreError::ResultNotFound(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
