// Worker status tracker: the latest worker-pool report, readable at any time
// and awaitable by long-poll consumers

use crate::metrics;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use verdict_common::types::{StatusReport, WorkerState, WorkersStatus};

#[derive(Default)]
pub struct WorkerStatusTracker {
    snapshot: Mutex<WorkersStatus>,
    changed: Notify,
}

impl WorkerStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WorkersStatus> {
        self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the snapshot with one built from `report` and wake every waiter.
    /// Workers are ordered by id; counts are derived from the list itself.
    pub fn ingest(&self, report: StatusReport) {
        let mut workers = report.worker_status;
        workers.sort_by_key(|worker| worker.id);

        let busy = workers
            .iter()
            .filter(|worker| worker.status == WorkerState::Busy)
            .count() as u32;
        let total = workers.len() as u32;

        let next = WorkersStatus {
            busy_workers: busy,
            total_workers: total,
            worker_status: workers,
            captured_at: Utc::now(),
        };

        {
            let mut snapshot = self.lock();
            *snapshot = next;
            // Still under the lock: anyone registered before this point is woken
            self.changed.notify_waiters();
        }

        metrics::STATUS_REPORTS_TOTAL.inc();
        metrics::WORKERS_BUSY.set(busy as i64);
        metrics::WORKERS_TOTAL.set(total as i64);
    }

    pub fn snapshot(&self) -> WorkersStatus {
        self.lock().clone()
    }

    /// Wait for the next `ingest` and return the snapshot it produced.
    ///
    /// Interest is registered while holding the snapshot lock, so an ingest
    /// that lands between the call and the first poll is not missed. Blocks
    /// indefinitely; wrap in `tokio::time::timeout` for a deadline.
    pub async fn await_change(&self) -> WorkersStatus {
        let notified = {
            let _snapshot = self.lock();
            self.changed.notified()
        };
        notified.await;
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use verdict_common::types::WorkerStatus;

    fn worker(id: u64, status: WorkerState) -> WorkerStatus {
        WorkerStatus {
            id,
            status,
            processing_message_id: match status {
                WorkerState::Busy => Some(format!("{}", id * 10)),
                _ => None,
            },
        }
    }

    fn report(workers: Vec<WorkerStatus>) -> StatusReport {
        StatusReport {
            total_workers: 0,
            busy_workers: 0,
            worker_status: workers,
        }
    }

    #[test]
    fn test_ingest_sorts_and_counts() {
        let tracker = WorkerStatusTracker::new();
        tracker.ingest(report(vec![
            worker(3, WorkerState::Busy),
            worker(1, WorkerState::Idle),
            worker(2, WorkerState::Busy),
        ]));

        let snapshot = tracker.snapshot();
        let ids: Vec<_> = snapshot.worker_status.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(snapshot.busy_workers, 2);
        assert_eq!(snapshot.total_workers, 3);
    }

    #[test]
    fn test_ingest_replaces_whole_snapshot() {
        let tracker = WorkerStatusTracker::new();
        tracker.ingest(report(vec![worker(1, WorkerState::Busy), worker(2, WorkerState::Busy)]));
        let first = tracker.snapshot();

        tracker.ingest(report(vec![worker(7, WorkerState::Offline)]));
        let second = tracker.snapshot();

        assert_eq!(second.total_workers, 1);
        assert_eq!(second.busy_workers, 0);
        assert_eq!(second.worker_status[0].id, 7);
        assert!(second.captured_at >= first.captured_at);
    }

    #[test]
    fn test_reported_counts_are_not_trusted() {
        let tracker = WorkerStatusTracker::new();
        tracker.ingest(StatusReport {
            total_workers: 10,
            busy_workers: 10,
            worker_status: vec![worker(1, WorkerState::Idle)],
        });

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_workers, 1);
        assert_eq!(snapshot.busy_workers, 0);
    }

    #[test]
    fn test_initial_snapshot_is_empty() {
        let snapshot = WorkerStatusTracker::new().snapshot();
        assert_eq!(snapshot.total_workers, 0);
        assert!(snapshot.worker_status.is_empty());
    }

    #[tokio::test]
    async fn test_two_waiters_wake_on_one_ingest() {
        let tracker = Arc::new(WorkerStatusTracker::new());

        let first = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.await_change().await }
        });
        let second = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.await_change().await }
        });

        // Let both waiters register
        tokio::time::sleep(Duration::from_millis(50)).await;
        tracker.ingest(report(vec![worker(2, WorkerState::Busy), worker(1, WorkerState::Idle)]));

        let first = tokio::time::timeout(Duration::from_secs(2), first)
            .await
            .expect("first waiter should wake")
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), second)
            .await
            .expect("second waiter should wake")
            .unwrap();

        assert_eq!(first.total_workers, 2);
        assert_eq!(second.busy_workers, 1);
    }

    #[tokio::test]
    async fn test_wait_registered_before_first_poll_is_not_lost() {
        let tracker = WorkerStatusTracker::new();

        // The `Notified` inside `await_change` sees `notify_waiters` from the
        // moment it is created; park the wait once, then ingest before re-polling.
        let wait = tracker.await_change();
        tokio::pin!(wait);
        assert!(futures_util::poll!(wait.as_mut()).is_pending());

        tracker.ingest(report(vec![worker(1, WorkerState::Busy)]));

        let snapshot = tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .expect("waiter must observe the ingest");
        assert_eq!(snapshot.busy_workers, 1);
    }

    #[tokio::test]
    async fn test_waiter_blocks_without_ingest() {
        let tracker = WorkerStatusTracker::new();
        let waited = tokio::time::timeout(Duration::from_millis(50), tracker.await_change()).await;
        assert!(waited.is_err());
    }
}
