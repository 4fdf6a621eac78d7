//! Axum route handlers for AI-written reports.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::diagnosis::lifecycle::get_result;
use crate::errors::AppError;
use crate::models::report::ReportRow;
use crate::report::jobs::queue_report;
use crate::state::AppState;

/// POST /api/v1/diagnosis/result/:id/report
///
/// Queues a fresh report for the result and returns it as `pending` (202).
pub async fn handle_request_report(
    State(state): State<AppState>,
    Path(result_id): Path<Uuid>,
) -> Result<(StatusCode, Json<ReportRow>), AppError> {
    let result = get_result(state.store.as_ref(), result_id).await?;
    let (report, _handle) = queue_report(&state, &result).await?;
    Ok((StatusCode::ACCEPTED, Json(report)))
}

/// GET /api/v1/diagnosis/result/:id/report
///
/// Latest report for the result, whatever its status.
pub async fn handle_get_report(
    State(state): State<AppState>,
    Path(result_id): Path<Uuid>,
) -> Result<Json<ReportRow>, AppError> {
    let report = state
        .reports
        .latest_report(result_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No report for result {result_id}")))?;
    Ok(Json(report))
}
