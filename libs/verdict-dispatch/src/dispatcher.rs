/// Submission Dispatcher - hands grading work to the worker pool
///
/// **Core Responsibility:**
/// fetch -> encode -> send -> transition, for one submission at a time.
///
/// **Failure policy:**
/// - Store reads and encoding errors are returned as-is
/// - A disconnected broker, a failed publish or a publish timeout is NOT an
///   error: the submission stays `received` and the recovery sweep retries it
/// - A store failure after a successful publish IS an error, since the worker
///   pool already has the job and local state would otherwise diverge

use crate::connection::BrokerConnection;
use crate::error::Result;
use crate::metrics;
use crate::store::SubmissionStore;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use verdict_common::envelope;
use verdict_common::types::{SubmissionId, SubmissionResultId, SubmissionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Published and moved to `processing`
    Sent,
    /// Broker unavailable, submission left in `received`
    Deferred,
    /// Submission was no longer in `received`; nothing was published
    AlreadyDispatched,
}

pub struct Dispatcher {
    store: Arc<dyn SubmissionStore>,
    connection: Arc<BrokerConnection>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn SubmissionStore>, connection: Arc<BrokerConnection>) -> Self {
        Self { store, connection }
    }

    pub fn store(&self) -> &Arc<dyn SubmissionStore> {
        &self.store
    }

    pub fn connection(&self) -> &Arc<BrokerConnection> {
        &self.connection
    }

    pub async fn dispatch(
        &self,
        submission_id: SubmissionId,
        result_id: SubmissionResultId,
    ) -> Result<DispatchOutcome> {
        let submission = self.store.get_submission(submission_id).await?;
        let result = self.store.get_submission_result(result_id).await?;

        if submission.status != SubmissionStatus::Received {
            debug!(
                submission_id = submission_id,
                status = %submission.status,
                "Submission already dispatched"
            );
            metrics::record_dispatch("skipped");
            return Ok(DispatchOutcome::AlreadyDispatched);
        }

        let message = envelope::encode_task(&submission, &result)?;

        if let Err(e) = self.connection.send(&message).await {
            warn!(
                submission_id = submission_id,
                result_id = result_id,
                error = %e,
                "Dispatch deferred, submission stays received"
            );
            metrics::record_dispatch("deferred");
            return Ok(DispatchOutcome::Deferred);
        }

        if let Err(e) = self
            .store
            .mark_processing(submission_id, &message.message_id)
            .await
        {
            error!(
                submission_id = submission_id,
                message_id = %message.message_id,
                error = %e,
                "Job was published but the processing transition was not recorded"
            );
            metrics::record_dispatch("failed");
            return Err(e.into());
        }

        info!(
            submission_id = submission_id,
            result_id = result_id,
            language = %submission.language,
            test_cases = result.test_results.len(),
            "Submission dispatched"
        );
        metrics::record_dispatch("sent");
        Ok(DispatchOutcome::Sent)
    }

    /// Map a worker acknowledgement back to its submission.
    /// Unknown ids are expected (late or duplicate replies) and yield `None`.
    pub async fn resolve_submission(&self, message_id: &str) -> Result<Option<SubmissionId>> {
        let resolved = self.store.get_correlation(message_id).await?;
        if resolved.is_none() {
            debug!(message_id = message_id, "No submission for message");
        }
        Ok(resolved)
    }

    /// Best-effort reachability probe
    pub async fn handshake(&self) {
        self.connection.handshake().await;
    }

    /// Ask the worker pool for a status report
    pub async fn probe_status(&self) -> Result<()> {
        let message = envelope::encode_status_probe()?;
        self.connection.send(&message).await?;
        debug!(message_id = %message.message_id, "Status probe sent");
        Ok(())
    }
}
