use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::collections::BTreeSet;

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use common::errors::SchedulerError;
use common::models::{JobDocument, JobKey};

fn not_found(group: &str, name: &str) -> ErrorResponse {
    ErrorResponse::new(
        "not_found",
        format!(
            "could not find job in group '{}' with name '{}'.",
            group, name
        ),
    )
}

/// Create a job in `group`
///
/// Responds 201 with the created document (including its generated id) and
/// a Location header pointing at it.
#[tracing::instrument(skip(state, payload))]
pub async fn create_job(
    State(state): State<AppState>,
    Path(group): Path<String>,
    payload: Result<Json<JobDocument>, JsonRejection>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let Json(document) = payload
        .map_err(|rejection| ErrorResponse::new("validation_error", rejection.body_text()))?;

    let record = document
        .into_record(&group)
        .map_err(SchedulerError::from)?;
    state.scheduler.schedule_job(&record).await?;

    let location = format!("/onyx/groups/{}/jobs/{}", record.key.group, record.key.name);
    tracing::info!(job_id = %record.id, location = %location, "Job created");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(JobDocument::from(&record)),
    ))
}

/// List the keys of every pending job
#[tracing::instrument(skip(state))]
pub async fn list_jobs(
    State(state): State<AppState>,
) -> Result<Json<BTreeSet<JobKey>>, ErrorResponse> {
    Ok(Json(state.scheduler.get_job_keys().await?))
}

/// List the keys of pending jobs in `group`
#[tracing::instrument(skip(state))]
pub async fn list_group_jobs(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<BTreeSet<JobKey>>, ErrorResponse> {
    Ok(Json(state.scheduler.get_job_keys_by_group(&group).await?))
}

#[tracing::instrument(skip(state))]
pub async fn get_job(
    State(state): State<AppState>,
    Path((group, name)): Path<(String, String)>,
) -> Result<Json<JobDocument>, ErrorResponse> {
    // A key that does not validate cannot have been scheduled
    let key = JobKey::new(group.as_str(), name.as_str()).map_err(|_| not_found(&group, &name))?;

    match state.scheduler.get_job(&key).await? {
        Some(record) => Ok(Json(JobDocument::from(&record))),
        None => Err(not_found(&group, &name)),
    }
}

/// Delete a job: 204 when it existed, 404 otherwise
#[tracing::instrument(skip(state))]
pub async fn delete_job(
    State(state): State<AppState>,
    Path((group, name)): Path<(String, String)>,
) -> Result<StatusCode, ErrorResponse> {
    let key = JobKey::new(group.as_str(), name.as_str()).map_err(|_| not_found(&group, &name))?;

    if state.scheduler.delete_job(&key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&group, &name))
    }
}
