// HTTP route handlers for the Verdict API

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use verdict_common::types::{SubmissionId, SubmissionResultId};
use verdict_dispatch::{metrics, DispatchError, DispatchOutcome};

use crate::AppState;

const DEFAULT_WAIT_MS: u64 = 30_000;

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub result_id: SubmissionResultId,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub submission_id: SubmissionId,
    pub dispatched: bool,
    pub outcome: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct WaitParams {
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RecoveryParams {
    pub limit: Option<usize>,
}

fn error_body(status: StatusCode, message: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": message.to_string()
        })),
    )
        .into_response()
}

/// A caller may shrink a sweep but never grow it past the configured batch
fn sweep_limit(requested: Option<usize>, batch_limit: usize) -> usize {
    requested.map_or(batch_limit, |limit| limit.min(batch_limit))
}

fn outcome_label(outcome: DispatchOutcome) -> &'static str {
    match outcome {
        DispatchOutcome::Sent => "sent",
        DispatchOutcome::Deferred => "deferred",
        DispatchOutcome::AlreadyDispatched => "already_dispatched",
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn export_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// GET /workers/status - Latest worker pool snapshot
pub async fn workers_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.tracker.snapshot())
}

/// GET /workers/status/wait - Long-poll for the next status report
pub async fn wait_workers_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WaitParams>,
) -> Response {
    let timeout = Duration::from_millis(params.timeout_ms.unwrap_or(DEFAULT_WAIT_MS));

    match tokio::time::timeout(timeout, state.tracker.await_change()).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

/// POST /workers/status/probe - Ask the worker pool to report
pub async fn probe_workers(State(state): State<Arc<AppState>>) -> Response {
    match state.dispatcher.probe_status().await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            warn!(error = %e, "Status probe failed");
            error_body(StatusCode::SERVICE_UNAVAILABLE, e)
        }
    }
}

/// POST /submissions/{id}/dispatch - Send a submission to the worker pool
pub async fn dispatch_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<SubmissionId>,
    Json(payload): Json<DispatchRequest>,
) -> Response {
    match state
        .dispatcher
        .dispatch(submission_id, payload.result_id)
        .await
    {
        Ok(outcome) => {
            info!(
                submission_id = submission_id,
                result_id = payload.result_id,
                outcome = ?outcome,
                "Dispatch requested"
            );
            (
                StatusCode::ACCEPTED,
                Json(DispatchResponse {
                    submission_id,
                    dispatched: outcome == DispatchOutcome::Sent,
                    outcome: outcome_label(outcome),
                }),
            )
                .into_response()
        }
        Err(e) if e.is_not_found() => error_body(StatusCode::NOT_FOUND, e),
        Err(DispatchError::Codec(e)) => error_body(StatusCode::UNPROCESSABLE_ENTITY, e),
        Err(e) => {
            error!(submission_id = submission_id, error = %e, "Dispatch failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// GET /messages/{message_id}/submission - Resolve a worker acknowledgement
pub async fn resolve_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
) -> Response {
    match state.dispatcher.resolve_submission(&message_id).await {
        Ok(Some(submission_id)) => (
            StatusCode::OK,
            Json(serde_json::json!({ "submission_id": submission_id })),
        )
            .into_response(),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "no submission for this message"),
        Err(e) => {
            error!(message_id = %message_id, error = %e, "Failed to resolve message");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// POST /recovery/run - Re-dispatch pending submissions now
pub async fn run_recovery(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecoveryParams>,
) -> Response {
    let limit = sweep_limit(params.limit, state.batch_limit);

    match state.recovery.retry_pending(limit).await {
        Ok(dispatched) => (
            StatusCode::OK,
            Json(serde_json::json!({ "dispatched": dispatched })),
        )
            .into_response(),
        Err(e) if e.is_disconnected() => error_body(StatusCode::SERVICE_UNAVAILABLE, e),
        Err(e) => {
            error!(error = %e, "Recovery sweep failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}
