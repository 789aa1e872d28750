/// Wire envelope shared by the dispatcher and the worker pool.
///
/// Every message on the broker is a JSON envelope:
/// `{ "message_id": "...", "type": "task" | "handshake" | "status", "payload": "<base64>" }`
///
/// The payload is an opaque byte string (base64 on the wire). Task envelopes carry
/// a JSON `TaskPayload`; inbound status envelopes carry a JSON `StatusReport`;
/// outbound handshake and status probes carry nothing.
///
/// Task message ids are the submission id in decimal so a reply can be
/// correlated back without extra bookkeeping on the worker side.

use crate::types::{FileLocation, StatusReport, Submission, SubmissionId, SubmissionResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Priority used for grading jobs
pub const TASK_PRIORITY: u8 = 1;
/// Priority used for handshake and status probes
pub const CONTROL_PRIORITY: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Task,
    Handshake,
    Status,
}

impl MessageType {
    pub fn priority(&self) -> u8 {
        match self {
            MessageType::Task => TASK_PRIORITY,
            MessageType::Handshake | MessageType::Status => CONTROL_PRIORITY,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Task => "task",
            MessageType::Handshake => "handshake",
            MessageType::Status => "status",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize {kind} message: {source}")]
    Serialize {
        kind: MessageType,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed message: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("{0} message carries no payload")]
    MissingPayload(MessageType),

    #[error("expected a {expected} message, got {found}")]
    UnexpectedType {
        expected: MessageType,
        found: MessageType,
    },

    #[error("result {result_id} belongs to submission {owner}, not {submission_id}")]
    ResultMismatch {
        submission_id: SubmissionId,
        result_id: u64,
        owner: SubmissionId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_payload"
    )]
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub order: SubmissionId,
    pub language_type: String,
    pub language_version: String,
    pub submission_file: FileLocation,
    pub test_cases: Vec<TestCasePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCasePayload {
    pub order: u32,
    pub input_file: FileLocation,
    pub expected_output: FileLocation,
    pub stdout_target: FileLocation,
    pub stderr_target: FileLocation,
    pub diff_target: FileLocation,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

/// An encoded envelope ready for the transport
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub message_id: String,
    pub kind: MessageType,
    pub body: Vec<u8>,
}

impl OutboundMessage {
    pub fn priority(&self) -> u8 {
        self.kind.priority()
    }
}

/// Message id used for a submission's task envelope
pub fn task_message_id(submission_id: SubmissionId) -> String {
    submission_id.to_string()
}

/// Build the task envelope for a submission and its scaffolded result
pub fn encode_task(
    submission: &Submission,
    result: &SubmissionResult,
) -> Result<OutboundMessage, CodecError> {
    if result.submission_id != submission.id {
        return Err(CodecError::ResultMismatch {
            submission_id: submission.id,
            result_id: result.id,
            owner: result.submission_id,
        });
    }

    let payload = TaskPayload {
        order: submission.id,
        language_type: submission.language.name.clone(),
        language_version: submission.language.version.clone(),
        submission_file: submission.code_file.clone(),
        test_cases: result
            .test_results
            .iter()
            .map(|tr| TestCasePayload {
                order: tr.test_case.order,
                input_file: tr.test_case.input_file.clone(),
                expected_output: tr.test_case.expected_output_file.clone(),
                stdout_target: tr.stdout_file.clone(),
                stderr_target: tr.stderr_file.clone(),
                diff_target: tr.diff_file.clone(),
                time_limit_ms: tr.test_case.time_limit_ms,
                memory_limit_kb: tr.test_case.memory_limit_kb,
            })
            .collect(),
    };

    let payload = serde_json::to_vec(&payload).map_err(|source| CodecError::Serialize {
        kind: MessageType::Task,
        source,
    })?;

    encode(task_message_id(submission.id), MessageType::Task, Some(payload))
}

pub fn encode_handshake() -> Result<OutboundMessage, CodecError> {
    encode(Uuid::new_v4().to_string(), MessageType::Handshake, None)
}

pub fn encode_status_probe() -> Result<OutboundMessage, CodecError> {
    encode(Uuid::new_v4().to_string(), MessageType::Status, None)
}

fn encode(
    message_id: String,
    kind: MessageType,
    payload: Option<Vec<u8>>,
) -> Result<OutboundMessage, CodecError> {
    let envelope = Envelope {
        message_id,
        kind,
        payload,
    };
    let body = serde_json::to_vec(&envelope)
        .map_err(|source| CodecError::Serialize { kind, source })?;

    Ok(OutboundMessage {
        message_id: envelope.message_id,
        kind,
        body,
    })
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, CodecError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Worker-side view of a task envelope
pub fn decode_task(envelope: &Envelope) -> Result<TaskPayload, CodecError> {
    let payload = typed_payload(envelope, MessageType::Task)?;
    Ok(serde_json::from_slice(payload)?)
}

pub fn decode_status_report(envelope: &Envelope) -> Result<StatusReport, CodecError> {
    let payload = typed_payload(envelope, MessageType::Status)?;
    Ok(serde_json::from_slice(payload)?)
}

fn typed_payload(envelope: &Envelope, expected: MessageType) -> Result<&[u8], CodecError> {
    if envelope.kind != expected {
        return Err(CodecError::UnexpectedType {
            expected,
            found: envelope.kind,
        });
    }
    envelope
        .payload
        .as_deref()
        .ok_or(CodecError::MissingPayload(expected))
}

mod base64_payload {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(payload: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match payload {
            Some(bytes) => serializer.serialize_str(&general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| general_purpose::STANDARD.decode(s).map_err(de::Error::custom))
            .transpose()
    }
}
