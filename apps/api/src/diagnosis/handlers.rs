//! Axum route handlers for diagnoses, sessions and results.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::diagnosis::lifecycle::{
    complete_session, get_result, start_session, submit_answer, AnswerRequest, SavedAnswer,
    StartedSession,
};
use crate::errors::AppError;
use crate::models::diagnosis::{DiagnosisBundle, DiagnosisRow};
use crate::models::report::ReportRow;
use crate::models::session::{AnswerRow, ResultRow, SessionRow};
use crate::report::jobs::queue_report;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    pub session: SessionRow,
    pub answers: Vec<AnswerRow>,
    pub answered_count: usize,
    pub question_count: usize,
    pub result_id: Option<Uuid>,
}

/// A result plus per-category percentages (`null` where no maximum is known).
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    #[serde(flatten)]
    pub result: ResultRow,
    pub category_percentages: BTreeMap<String, Option<f64>>,
}

impl From<ResultRow> for ResultResponse {
    fn from(result: ResultRow) -> Self {
        let category_percentages = result
            .category_scores
            .0
            .iter()
            .map(|(category, score)| (category.clone(), score.percentage()))
            .collect();
        Self {
            result,
            category_percentages,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub result: ResultResponse,
    /// Pending report, when completion queued one.
    pub report: Option<ReportRow>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/diagnoses
pub async fn handle_list_diagnoses(
    State(state): State<AppState>,
) -> Result<Json<Vec<DiagnosisRow>>, AppError> {
    Ok(Json(state.store.list_diagnoses().await?))
}

/// GET /api/v1/diagnosis/:id
pub async fn handle_get_diagnosis(
    State(state): State<AppState>,
    Path(diagnosis_id): Path<Uuid>,
) -> Result<Json<DiagnosisBundle>, AppError> {
    let bundle = state
        .store
        .load_diagnosis(diagnosis_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Diagnosis {diagnosis_id} not found")))?;
    Ok(Json(bundle))
}

/// POST /api/v1/diagnosis/:id/start
///
/// 201 with a new session, or 200 with the user's existing open session.
pub async fn handle_start(
    State(state): State<AppState>,
    Path(diagnosis_id): Path<Uuid>,
    Json(request): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartedSession>), AppError> {
    let started = start_session(state.store.as_ref(), request.user_id, diagnosis_id).await?;
    let status = if started.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(started)))
}

/// GET /api/v1/diagnosis/session/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionDetailResponse>, AppError> {
    let session = state
        .store
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;

    let question_count = state
        .store
        .load_diagnosis(session.diagnosis_id)
        .await?
        .map(|d| d.questions.len())
        .unwrap_or_default();
    let answers = state.store.list_answers(session_id).await?;
    let result_id = state
        .store
        .get_result_by_session(session_id)
        .await?
        .map(|r| r.id);

    Ok(Json(SessionDetailResponse {
        answered_count: answers.len(),
        session,
        answers,
        question_count,
        result_id,
    }))
}

/// POST /api/v1/diagnosis/session/:id/answer
pub async fn handle_answer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<SavedAnswer>, AppError> {
    if request.selected_option_ids.is_empty()
        && request.scale_value.is_none()
        && request.text_value.is_none()
    {
        return Err(AppError::Validation(
            "An answer needs selected_option_ids, scale_value or text_value".to_string(),
        ));
    }

    Ok(Json(
        submit_answer(state.store.as_ref(), session_id, request).await?,
    ))
}

/// POST /api/v1/diagnosis/session/:id/complete
///
/// Scores the session. When `AUTO_GENERATE_REPORT` is on, also queues a
/// report; a failure to queue is logged and does not fail the completion.
pub async fn handle_complete(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<CompleteResponse>, AppError> {
    let result = complete_session(state.store.as_ref(), session_id).await?;

    let report = if state.config.auto_generate_report {
        match queue_report(&state, &result).await {
            Ok((report, _handle)) => Some(report),
            Err(e) => {
                warn!("Could not queue report for result {}: {e}", result.id);
                None
            }
        }
    } else {
        None
    };

    Ok(Json(CompleteResponse {
        result: result.into(),
        report,
    }))
}

/// GET /api/v1/diagnosis/result/:id
pub async fn handle_get_result(
    State(state): State<AppState>,
    Path(result_id): Path<Uuid>,
) -> Result<Json<ResultResponse>, AppError> {
    let result = get_result(state.store.as_ref(), result_id).await?;
    Ok(Json(result.into()))
}
