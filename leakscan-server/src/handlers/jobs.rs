use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use uuid::Uuid;

use leakscan_core::types::{JobId, ScanJob};

use crate::errors::{AppError, AppResult};
use crate::infra::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job: ScanJob,
    /// Ledger rows per status. The sum equals the number of enumerated
    /// object-versions seeded so far.
    pub counts: BTreeMap<String, i64>,
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<JobStatusResponse>> {
    let job_id = JobId(job_id);
    let job = state
        .jobs
        .get_job(job_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("job {job_id} not found")))?;

    let counts = state
        .ledger
        .status_counts(job_id)
        .await?
        .into_iter()
        .map(|(status, n)| (status.as_str().to_string(), n))
        .collect();

    Ok(Json(JobStatusResponse { job, counts }))
}
