use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use job_datastore::{DataStore, JobSummary, VideoMetadata};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::{
    job::{Job, JobId},
    processor::Pipeline,
    server::{error::ApiError, AppState},
    yt::url::validate_url,
};

const RECENT_JOBS_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct SubmitForm {
    pub url: String,
}

/// `POST /api/jobs`
///
/// Waits for the metadata step before answering, so the redirect already
/// points at the right page: `/processing/{id}` for a confirmed job, or
/// `/result/{id}` when the video could not be resolved. The job itself runs
/// in its own task and finishes even if the request is dropped.
#[tracing::instrument(skip(state))]
pub async fn create_job<P, D>(
    State(state): State<AppState<P, D>>,
    Form(form): Form<SubmitForm>,
) -> Result<Response, ApiError>
where
    P: Pipeline,
    D: DataStore + Send + Sync + 'static,
{
    let url = form.url.trim();
    if !validate_url(url) {
        return Err(ApiError::InvalidUrl);
    }

    let handle = state.registry.create(url);
    let id = handle.id().clone();
    tracing::info!(job_id = %id, url, "Job submitted");

    let (confirmed_tx, confirmed_rx) = oneshot::channel();
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.prepare(&handle).await {
            handle
                .fail(format!("Failed to fetch metadata: {e}"))
                .inspect_err(|e| tracing::error!(error = %e, "Failed to mark job as failed"))
                .ok();
            let _ = confirmed_tx.send(false);
            return;
        }

        let _ = confirmed_tx.send(true);
        pipeline.run(handle).await
    });

    let page = match confirmed_rx.await {
        Ok(true) => "processing",
        _ => "result",
    };
    Ok(Redirect::to(&format!("/{page}/{id}")).into_response())
}

/// `POST /api/metadata`: resolves a video without creating a job.
#[tracing::instrument(skip(state))]
pub async fn preview_metadata<P, D>(
    State(state): State<AppState<P, D>>,
    Form(form): Form<SubmitForm>,
) -> Result<Json<VideoMetadata>, ApiError>
where
    P: Pipeline,
    D: DataStore + Send + Sync + 'static,
{
    let url = form.url.trim();
    if !validate_url(url) {
        return Err(ApiError::InvalidUrl);
    }

    let metadata = state.pipeline.preview(url).await?;
    Ok(Json(metadata))
}

/// `GET /api/jobs/{job_id}`: the live job, or its archived copy once it has
/// been evicted from memory.
#[tracing::instrument(skip(state))]
pub async fn get_job<P, D>(
    State(state): State<AppState<P, D>>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError>
where
    P: Pipeline,
    D: DataStore + Send + Sync + 'static,
{
    let id = JobId::from(job_id);
    if let Some(job) = state.registry.get(&id) {
        return Ok(Json(job));
    }

    state
        .store
        .load_job(id.as_str())
        .await?
        .map(|archived| Json(Job::from(archived)))
        .ok_or(ApiError::JobNotFound(id))
}

/// Body of `GET /api/jobs`.
#[derive(Debug, Serialize)]
pub struct JobsOverview {
    /// Jobs still in flight, oldest first
    pub active: Vec<Job>,
    /// Most recently archived jobs, newest first
    pub recent: Vec<JobSummary>,
}

/// `GET /api/jobs`: running jobs plus the archive history.
pub async fn list_jobs<P, D>(
    State(state): State<AppState<P, D>>,
) -> Result<Json<JobsOverview>, ApiError>
where
    P: Pipeline,
    D: DataStore + Send + Sync + 'static,
{
    let recent = state.store.list_recent_jobs(RECENT_JOBS_LIMIT).await?;
    Ok(Json(JobsOverview {
        active: state.registry.active_jobs(),
        recent,
    }))
}

/// `GET /api/status`
pub async fn backend_status<P, D>(State(state): State<AppState<P, D>>) -> Response
where
    P: Pipeline,
    D: DataStore + Send + Sync + 'static,
{
    let report = state.backend_status.check().await;
    if report.ok {
        Json(report).into_response()
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, Json(report)).into_response()
    }
}
