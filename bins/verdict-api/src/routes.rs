use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::export_metrics))
        .route("/workers/status", get(handlers::workers_status))
        .route("/workers/status/wait", get(handlers::wait_workers_status))
        .route("/workers/status/probe", post(handlers::probe_workers))
        .route("/submissions/:id/dispatch", post(handlers::dispatch_submission))
        .route("/messages/:message_id/submission", get(handlers::resolve_message))
        .route("/recovery/run", post(handlers::run_recovery))
}
