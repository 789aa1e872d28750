// Persistence contracts consumed by the dispatcher, with a Redis-backed
// implementation and an in-process one

use crate::error::StoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use verdict_common::redis as keys;
use verdict_common::types::{
    Submission, SubmissionId, SubmissionResult, SubmissionResultId, SubmissionStatus,
};

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn get_submission(&self, id: SubmissionId) -> Result<Submission, StoreError>;

    /// Result with its test cases and file locations resolved
    async fn get_submission_result(
        &self,
        id: SubmissionResultId,
    ) -> Result<SubmissionResult, StoreError>;

    /// `received -> processing`, recording `message_id` as the correlation key
    /// in the same operation
    async fn mark_processing(&self, id: SubmissionId, message_id: &str) -> Result<(), StoreError>;

    /// Up to `limit` submissions still in `received` with a result attached,
    /// oldest first
    async fn list_pending(&self, limit: usize) -> Result<Vec<Submission>, StoreError>;

    async fn get_correlation(&self, message_id: &str) -> Result<Option<SubmissionId>, StoreError>;
}

#[derive(Clone)]
pub struct RedisSubmissionStore {
    conn: ConnectionManager,
}

impl RedisSubmissionStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SubmissionStore for RedisSubmissionStore {
    async fn get_submission(&self, id: SubmissionId) -> Result<Submission, StoreError> {
        let mut conn = self.conn.clone();
        keys::get_submission(&mut conn, id)
            .await?
            .ok_or(StoreError::SubmissionNotFound(id))
    }

    async fn get_submission_result(
        &self,
        id: SubmissionResultId,
    ) -> Result<SubmissionResult, StoreError> {
        let mut conn = self.conn.clone();
        keys::get_submission_result(&mut conn, id)
            .await?
            .ok_or(StoreError::ResultNotFound(id))
    }

    async fn mark_processing(&self, id: SubmissionId, message_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        if keys::mark_processing(&mut conn, id, message_id).await? {
            Ok(())
        } else {
            Err(StoreError::NotReceived(id))
        }
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Submission>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::list_pending(&mut conn, limit).await?)
    }

    async fn get_correlation(&self, message_id: &str) -> Result<Option<SubmissionId>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::get_correlation(&mut conn, message_id).await?)
    }
}

#[derive(Default)]
struct MemoryState {
    submissions: BTreeMap<SubmissionId, Submission>,
    results: HashMap<SubmissionResultId, SubmissionResult>,
    correlations: HashMap<String, SubmissionId>,
}

/// Store kept entirely in process memory
#[derive(Default)]
pub struct MemorySubmissionStore {
    state: Mutex<MemoryState>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_submission(&self, submission: Submission) {
        self.state().submissions.insert(submission.id, submission);
    }

    pub fn insert_result(&self, result: SubmissionResult) {
        self.state().results.insert(result.id, result);
    }

    pub fn status_of(&self, id: SubmissionId) -> Option<SubmissionStatus> {
        self.state().submissions.get(&id).map(|s| s.status)
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn get_submission(&self, id: SubmissionId) -> Result<Submission, StoreError> {
        self.state()
            .submissions
            .get(&id)
            .cloned()
            .ok_or(StoreError::SubmissionNotFound(id))
    }

    async fn get_submission_result(
        &self,
        id: SubmissionResultId,
    ) -> Result<SubmissionResult, StoreError> {
        self.state()
            .results
            .get(&id)
            .cloned()
            .ok_or(StoreError::ResultNotFound(id))
    }

    async fn mark_processing(&self, id: SubmissionId, message_id: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        match state.submissions.get_mut(&id) {
            Some(submission) if submission.status == SubmissionStatus::Received => {
                submission.status = SubmissionStatus::Processing;
            }
            Some(_) => return Err(StoreError::NotReceived(id)),
            None => return Err(StoreError::SubmissionNotFound(id)),
        }
        state.correlations.insert(message_id.to_string(), id);
        Ok(())
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Submission>, StoreError> {
        Ok(self
            .state()
            .submissions
            .values()
            .filter(|s| s.status == SubmissionStatus::Received && s.result_id.is_some())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_correlation(&self, message_id: &str) -> Result<Option<SubmissionId>, StoreError> {
        Ok(self.state().correlations.get(message_id).copied())
    }
}
