use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use leakscan_core::types::JobId;

use crate::errors::{AppError, AppResult};
use crate::infra::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Serialize)]
pub struct ScanAccepted {
    pub job_id: JobId,
}

/// Accept a scan request. The job row is persisted before responding;
/// enumeration runs in the background so the id comes back immediately.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> AppResult<(StatusCode, Json<ScanAccepted>)> {
    if request.bucket.trim().is_empty() {
        return Err(AppError::bad_request("bucket must not be empty"));
    }

    let job = state
        .orchestrator
        .create_job(request.bucket, request.prefix)
        .await?;
    let job_id = job.job_id;
    info!(job_id = %job_id, bucket = %job.bucket, "accepted scan request");

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.seed_job(&job).await {
            error!(job_id = %job.job_id, error = %e, "job seeding failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(ScanAccepted { job_id })))
}
