use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SubmissionId = u64;
pub type SubmissionResultId = u64;
pub type TaskId = u64;
pub type WorkerId = u64;

/// Location of a file in object storage.
/// Never interpreted here, only carried from the store to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    pub backend: String,
    pub bucket: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub name: String,
    pub version: String,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Submission lifecycle.
///
/// `Received -> Processing` is the only transition performed by the dispatcher;
/// the terminal states are written by result ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Received,
    Processing,
    Done,
    Failed,
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionStatus::Received => "received",
            SubmissionStatus::Processing => "processing",
            SubmissionStatus::Done => "done",
            SubmissionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub task_id: TaskId,
    pub language: Language,
    pub code_file: FileLocation,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub result_id: Option<SubmissionResultId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub order: u32,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
    pub input_file: FileLocation,
    pub expected_output_file: FileLocation,
}

/// One test case of a result, with the files the worker is expected to fill in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_case: TestCase,
    pub stdout_file: FileLocation,
    pub stderr_file: FileLocation,
    pub diff_file: FileLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub id: SubmissionResultId,
    pub submission_id: SubmissionId,
    pub test_results: Vec<TestResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Busy,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: WorkerId,
    pub status: WorkerState,
    pub processing_message_id: Option<String>,
}

/// Status report as sent by the worker pool.
/// The aggregate fields are informational; counts are recomputed on ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub total_workers: u32,
    #[serde(default)]
    pub busy_workers: u32,
    pub worker_status: Vec<WorkerStatus>,
}

/// Point-in-time picture of the worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersStatus {
    pub busy_workers: u32,
    pub total_workers: u32,
    pub worker_status: Vec<WorkerStatus>,
    pub captured_at: DateTime<Utc>,
}

impl Default for WorkersStatus {
    fn default() -> Self {
        Self {
            busy_workers: 0,
            total_workers: 0,
            worker_status: Vec::new(),
            captured_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_status_wire_names() {
        assert_eq!(serde_json::to_string(&SubmissionStatus::Received).unwrap(), "\"received\"");
        assert_eq!(serde_json::to_string(&SubmissionStatus::Processing).unwrap(), "\"processing\"");
        assert_eq!(SubmissionStatus::Done.to_string(), "done");
    }

    #[test]
    fn test_status_report_parses_worker_payload() {
        let raw = r#"{
            "total_workers": 2,
            "busy_workers": 1,
            "worker_status": [
                {"id": 2, "status": "busy", "processing_message_id": "17"},
                {"id": 1, "status": "idle", "processing_message_id": null}
            ]
        }"#;

        let report: StatusReport = serde_json::from_str(raw).unwrap();
        assert_eq!(report.worker_status.len(), 2);
        assert_eq!(report.worker_status[0].status, WorkerState::Busy);
        assert_eq!(report.worker_status[0].processing_message_id.as_deref(), Some("17"));
        assert_eq!(report.worker_status[1].processing_message_id, None);
    }

    #[test]
    fn test_submission_without_result_id_deserializes() {
        let raw = r#"{
            "id": 5,
            "task_id": 1,
            "language": {"name": "python", "version": "3.12"},
            "code_file": {"backend": "s3", "bucket": "code", "path": "5/main.py"},
            "status": "received"
        }"#;

        let submission: Submission = serde_json::from_str(raw).unwrap();
        assert_eq!(submission.result_id, None);
        assert_eq!(submission.language.to_string(), "python:3.12");
    }
}
