// Recovery sweep: re-dispatch submissions left in `received` by earlier broker outages

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::{Result, TransportError};
use crate::metrics;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_LIMIT: usize = 100;

pub struct RecoverySweep {
    dispatcher: Arc<Dispatcher>,
    // Held for the whole sweep; overlapping sweeps would publish the same rows
    running: Mutex<()>,
}

impl RecoverySweep {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            running: Mutex::new(()),
        }
    }

    /// Re-dispatch up to `batch_limit` pending submissions.
    ///
    /// Fails only when the broker is disconnected (before touching the store)
    /// or when the pending list cannot be read. Individual dispatch failures
    /// are logged and skipped. Returns how many moved to `processing`; a call
    /// made while another sweep is running returns 0 without doing anything.
    pub async fn retry_pending(&self, batch_limit: usize) -> Result<usize> {
        if !self.dispatcher.connection().is_connected().await {
            return Err(TransportError::Disconnected.into());
        }

        let Ok(_running) = self.running.try_lock() else {
            debug!("Recovery sweep already running, skipping");
            return Ok(0);
        };

        let pending = self.dispatcher.store().list_pending(batch_limit).await?;
        let candidates = pending.len();
        let mut dispatched = 0;

        for submission in pending.into_iter().take(batch_limit) {
            let Some(result_id) = submission.result_id else {
                debug!(submission_id = submission.id, "No result yet, skipping");
                continue;
            };

            match self.dispatcher.dispatch(submission.id, result_id).await {
                Ok(DispatchOutcome::Sent) => dispatched += 1,
                Ok(outcome) => {
                    debug!(submission_id = submission.id, outcome = ?outcome, "Not re-dispatched");
                }
                Err(e) => {
                    warn!(submission_id = submission.id, error = %e, "Re-dispatch failed");
                }
            }
        }

        metrics::RECOVERED_TOTAL.inc_by(dispatched as u64);
        if dispatched > 0 {
            info!(dispatched = dispatched, candidates = candidates, "Recovery sweep finished");
        } else {
            debug!(candidates = candidates, "Recovery sweep found nothing to dispatch");
        }
        Ok(dispatched)
    }
}
