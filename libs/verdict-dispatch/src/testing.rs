// Test doubles shared by the unit tests of this crate

use crate::error::TransportError;
use crate::transport::{QueueOptions, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use verdict_common::envelope::{MessageType, OutboundMessage};
use verdict_common::types::{
    FileLocation, Language, Submission, SubmissionId, SubmissionResult, SubmissionStatus,
    TestCase, TestResult,
};

#[derive(Debug, Clone)]
pub struct Published {
    pub queue: String,
    pub reply_to: String,
    pub message_id: String,
    pub kind: MessageType,
    pub priority: u8,
    pub body: Vec<u8>,
}

/// In-memory broker that records what it is asked to do
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    fail_publish: AtomicBool,
    fail_declare: AtomicBool,
    hang_publish: AtomicBool,
    slow_publish: AtomicBool,
    published: Mutex<Vec<Published>>,
    declared: Mutex<Vec<(String, QueueOptions)>>,
}

impl MockTransport {
    pub fn connected() -> Arc<Self> {
        let transport = Self::default();
        transport.connected.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn fail_declarations(&self, fail: bool) {
        self.fail_declare.store(fail, Ordering::SeqCst);
    }

    pub fn hang_publishes(&self, hang: bool) {
        self.hang_publish.store(hang, Ordering::SeqCst);
    }

    /// Yield for a few milliseconds inside every publish
    pub fn slow_publishes(&self, slow: bool) {
        self.slow_publish.store(slow, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_of(&self, kind: MessageType) -> Vec<Published> {
        self.published()
            .into_iter()
            .filter(|p| p.kind == kind)
            .collect()
    }

    pub fn declared(&self) -> Vec<(String, QueueOptions)> {
        self.declared.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<(), TransportError> {
        if self.fail_declare.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.declared.lock().unwrap().push((queue.to_string(), options));
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        reply_to: &str,
        message: &OutboundMessage,
    ) -> Result<(), TransportError> {
        if self.hang_publish.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.slow_publish.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Nacked(message.message_id.clone()));
        }
        self.published.lock().unwrap().push(Published {
            queue: queue.to_string(),
            reply_to: reply_to.to_string(),
            message_id: message.message_id.clone(),
            kind: message.kind,
            priority: message.priority(),
            body: message.body.clone(),
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub fn location(path: &str) -> FileLocation {
    FileLocation {
        backend: "minio".to_string(),
        bucket: "grading".to_string(),
        path: path.to_string(),
    }
}

pub fn make_submission(id: SubmissionId, result_id: Option<u64>) -> Submission {
    Submission {
        id,
        task_id: 1,
        language: Language {
            name: "python".to_string(),
            version: "3.12".to_string(),
        },
        code_file: location(&format!("submissions/{}/main.py", id)),
        status: SubmissionStatus::Received,
        result_id,
    }
}

pub fn make_result(id: u64, submission_id: SubmissionId, cases: u32) -> SubmissionResult {
    SubmissionResult {
        id,
        submission_id,
        test_results: (1..=cases)
            .map(|order| TestResult {
                test_case: TestCase {
                    order,
                    time_limit_ms: 2000,
                    memory_limit_kb: 262144,
                    input_file: location(&format!("tasks/1/{}.in", order)),
                    expected_output_file: location(&format!("tasks/1/{}.out", order)),
                },
                stdout_file: location(&format!("results/{}/{}.stdout", id, order)),
                stderr_file: location(&format!("results/{}/{}.stderr", id, order)),
                diff_file: location(&format!("results/{}/{}.diff", id, order)),
            })
            .collect(),
    }
}
