// Routing of envelopes arriving on the reply queue

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::status::WorkerStatusTracker;
use tracing::{debug, info};
use verdict_common::envelope::{self, MessageType};
use verdict_common::types::SubmissionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Worker pool answered a handshake
    Handshake,
    /// Status report ingested into the tracker
    Status { total_workers: u32 },
    /// Acknowledgement of a task; `None` when no submission matches
    Task {
        message_id: String,
        submission_id: Option<SubmissionId>,
    },
}

/// Decode one reply body and apply it
pub async fn handle_reply(
    body: &[u8],
    dispatcher: &Dispatcher,
    tracker: &WorkerStatusTracker,
) -> Result<Reply> {
    let envelope = envelope::decode_envelope(body)?;

    match envelope.kind {
        MessageType::Handshake => {
            info!(message_id = %envelope.message_id, "Worker pool answered handshake");
            Ok(Reply::Handshake)
        }
        MessageType::Status => {
            let report = envelope::decode_status_report(&envelope)?;
            tracker.ingest(report);
            let total_workers = tracker.snapshot().total_workers;
            debug!(total_workers = total_workers, "Worker status updated");
            Ok(Reply::Status { total_workers })
        }
        MessageType::Task => {
            let submission_id = dispatcher.resolve_submission(&envelope.message_id).await?;
            match submission_id {
                Some(id) => info!(message_id = %envelope.message_id, submission_id = id, "Worker acknowledged submission"),
                None => debug!(message_id = %envelope.message_id, "Stale or duplicate acknowledgement"),
            }
            Ok(Reply::Task {
                message_id: envelope.message_id,
                submission_id,
            })
        }
    }
}
