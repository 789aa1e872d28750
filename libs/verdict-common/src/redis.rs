use crate::types::{Submission, SubmissionId, SubmissionResult, SubmissionResultId, SubmissionStatus};
use redis::{AsyncCommands, RedisResult};

/// Redis key layout for submissions - defines only the layout, not policy
/// Ensures the submission flow, the dispatcher and the CLI agree on keys

pub const SUBMISSION_PREFIX: &str = "verdict:submission";
pub const SUBMISSION_STATUS_PREFIX: &str = "verdict:submission_status";
pub const RESULT_PREFIX: &str = "verdict:result";
pub const CORRELATION_PREFIX: &str = "verdict:correlation";
/// Sorted set of `received` submission ids that have a result attached, scored by id
pub const PENDING_INDEX: &str = "verdict:pending";

/// Check-and-set for `received -> processing`.
/// KEYS: status key, correlation key, pending index. ARGV: submission id.
/// Returns 1 when the transition happened, 0 otherwise.
const MARK_PROCESSING_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) ~= 'received' then
    return 0
end
redis.call('SET', KEYS[1], 'processing')
redis.call('SET', KEYS[2], ARGV[1])
redis.call('ZREM', KEYS[3], ARGV[1])
return 1
"#;

pub fn submission_key(id: SubmissionId) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, id)
}

/// Status is stored next to the body so transitions never rewrite the body
pub fn submission_status_key(id: SubmissionId) -> String {
    format!("{}:{}", SUBMISSION_STATUS_PREFIX, id)
}

pub fn result_key(id: SubmissionResultId) -> String {
    format!("{}:{}", RESULT_PREFIX, id)
}

pub fn correlation_key(message_id: &str) -> String {
    format!("{}:{}", CORRELATION_PREFIX, message_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

fn deserialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string()))
}

fn parse_status(raw: &str) -> RedisResult<SubmissionStatus> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(deserialization_error)
}

/// Store a submission and index it as pending when it is still `received`
/// and already has a result to grade against
pub async fn put_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
) -> RedisResult<()> {
    let payload = serde_json::to_string(submission).map_err(serialization_error)?;

    let mut pipe = redis::pipe();
    pipe.atomic()
        .set(submission_key(submission.id), payload)
        .ignore()
        .set(submission_status_key(submission.id), submission.status.to_string())
        .ignore();
    if is_dispatchable(submission) {
        pipe.zadd(PENDING_INDEX, submission.id, submission.id as f64).ignore();
    } else {
        pipe.zrem(PENDING_INDEX, submission.id).ignore();
    }
    pipe.query_async::<_, ()>(conn).await
}

fn is_dispatchable(submission: &Submission) -> bool {
    submission.status == SubmissionStatus::Received && submission.result_id.is_some()
}

/// Inclusive ZRANGE end for the first `limit` members
fn range_end(limit: usize) -> isize {
    isize::try_from(limit).map(|l| l - 1).unwrap_or(-1)
}

pub async fn put_result(
    conn: &mut redis::aio::ConnectionManager,
    result: &SubmissionResult,
) -> RedisResult<()> {
    let payload = serde_json::to_string(result).map_err(serialization_error)?;
    conn.set(result_key(result.id), payload).await
}

/// Load a submission with its current status
pub async fn get_submission(
    conn: &mut redis::aio::ConnectionManager,
    id: SubmissionId,
) -> RedisResult<Option<Submission>> {
    let (payload, status): (Option<String>, Option<String>) = redis::pipe()
        .get(submission_key(id))
        .get(submission_status_key(id))
        .query_async(conn)
        .await?;

    let Some(payload) = payload else {
        return Ok(None);
    };

    let mut submission: Submission =
        serde_json::from_str(&payload).map_err(deserialization_error)?;
    if let Some(status) = status {
        submission.status = parse_status(&status)?;
    }
    Ok(Some(submission))
}

pub async fn get_submission_result(
    conn: &mut redis::aio::ConnectionManager,
    id: SubmissionResultId,
) -> RedisResult<Option<SubmissionResult>> {
    let payload: Option<String> = conn.get(result_key(id)).await?;

    match payload {
        Some(data) => {
            let result = serde_json::from_str(&data).map_err(deserialization_error)?;
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

/// Move a submission to `processing` and record its correlation key in one step.
/// Returns false when the submission is missing or not in `received`.
pub async fn mark_processing(
    conn: &mut redis::aio::ConnectionManager,
    id: SubmissionId,
    message_id: &str,
) -> RedisResult<bool> {
    let transitioned: i32 = redis::Script::new(MARK_PROCESSING_SCRIPT)
        .key(submission_status_key(id))
        .key(correlation_key(message_id))
        .key(PENDING_INDEX)
        .arg(id)
        .invoke_async(conn)
        .await?;

    Ok(transitioned == 1)
}

/// Oldest dispatchable submissions first
pub async fn list_pending(
    conn: &mut redis::aio::ConnectionManager,
    limit: usize,
) -> RedisResult<Vec<Submission>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let ids: Vec<SubmissionId> = conn.zrange(PENDING_INDEX, 0, range_end(limit)).await?;

    let mut pending = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(submission) = get_submission(conn, id).await? {
            if is_dispatchable(&submission) {
                pending.push(submission);
            }
        }
    }
    Ok(pending)
}

pub async fn get_correlation(
    conn: &mut redis::aio::ConnectionManager,
    message_id: &str,
) -> RedisResult<Option<SubmissionId>> {
    conn.get(correlation_key(message_id)).await
}
