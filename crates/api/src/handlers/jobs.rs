//! Handlers for the worker protocol: job pulls, result submissions and
//! run statistics.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use v2t_core::job::{JobPoll, ResultSubmission, SubmitStatus};
use v2t_core::queue::QueueStats;
use v2t_pipeline::{ProgressSnapshot, SubmitOutcome};

use crate::error::AppResult;
use crate::state::AppState;

/// `GET /stats` payload.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub queue: QueueStats,
    pub progress: ProgressSnapshot,
}

/// GET /get_job
///
/// Hands out the oldest pending job and marks it inflight.
pub async fn get_job(State(state): State<AppState>) -> Json<JobPoll> {
    match state.dispatcher.dequeue().await {
        Some(job) => {
            tracing::debug!(task_id = %job.task_id, frames = job.images.len(), "Job dispatched");
            Json(JobPoll::Ok(job))
        }
        None => Json(JobPoll::Empty),
    }
}

/// POST /submit_result
///
/// An empty or malformed `vlm_json` requeues the job; a usable answer is
/// appended to the sample's result log.
pub async fn submit_result(
    State(state): State<AppState>,
    payload: Result<Json<ResultSubmission>, JsonRejection>,
) -> AppResult<Json<SubmitStatus>> {
    let Json(submission) = payload?;

    let status = match state.intake.submit(submission).await? {
        SubmitOutcome::Received { .. } => SubmitStatus::Received,
        SubmitOutcome::RetryTriggered => SubmitStatus::RetryTriggered,
    };
    Ok(Json(status))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        queue: state.dispatcher.stats().await,
        progress: state.progress.snapshot(),
    })
}
