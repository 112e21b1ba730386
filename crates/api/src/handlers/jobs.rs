//! Handlers for job submission, status and result retrieval.
//!
//! Handlers are stateless: everything lives in the job store, so any number
//! of requests may run concurrently with the worker and the cleaner.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rtrain_core::error::CoreError;
use rtrain_core::submission::{JobStatusResponse, SubmitJob, RESULT_TYPE_HEADER};
use rtrain_core::types::JobId;
use rtrain_db::models::job::{ResultLookup, ResultType};
use rtrain_db::repositories::JobRepo;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

fn job_not_found(id: JobId) -> AppError {
    AppError::Core(CoreError::NotFound { entity: "Job", id })
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /train
///
/// The body is read as raw bytes so that every malformed submission, JSON
/// syntax errors included, maps to the same 415 response. Returns the new
/// job id as plain text.
pub async fn submit_job(State(state): State<AppState>, body: Bytes) -> AppResult<String> {
    let submission = SubmitJob::from_body(&body)?;
    let payload = submission.decode_payload()?;
    state.registry.validate(&submission.job_type, &payload)?;

    let id = JobRepo::create(
        &state.pool,
        &submission.job_type,
        &payload,
        &submission.checksum,
    )
    .await?;

    tracing::info!(
        job_id = %id,
        job_type = %submission.job_type,
        payload_bytes = payload.len(),
        "Job submitted",
    );

    Ok(id)
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /status/{id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<Json<JobStatusResponse>> {
    let status = JobRepo::status(&state.pool, &id)
        .await?
        .ok_or_else(|| job_not_found(id))?;

    Ok(Json(JobStatusResponse {
        progress: status.progress,
        finished: status.finished,
        error: None,
    }))
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// GET /result/{id}
///
/// Returns the stored bytes unchanged. The result type travels in the
/// `x-rtrain-result-type` header; unknown and unfinished jobs are both 404.
pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<Response> {
    let result = match JobRepo::result(&state.pool, &id).await? {
        ResultLookup::Ready(result) => result,
        ResultLookup::NotReady => return Err(AppError::Core(CoreError::NotReady(id))),
        ResultLookup::NotFound => return Err(job_not_found(id)),
    };

    let content_type = match result.result_type {
        ResultType::Success => "application/json",
        ResultType::Error => "text/plain; charset=utf-8",
    };

    Ok((
        [
            (CONTENT_TYPE.as_str(), content_type),
            (RESULT_TYPE_HEADER, result.result_type.as_str()),
        ],
        result.result,
    )
        .into_response())
}
