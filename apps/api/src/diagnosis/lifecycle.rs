//! Session lifecycle: start, answer, complete.
//!
//! ```text
//! start ──► in_progress ──answer*──► in_progress ──complete──► completed
//!                 └────────────(not reachable yet)────────────► abandoned
//! ```
//!
//! Completion is strict: a second (or racing) completion fails with
//! `Conflict` instead of producing a second result.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::diagnosis::scoring::score_answers;
use crate::diagnosis::store::{NewAnswer, SessionStore};
use crate::errors::AppError;
use crate::models::session::{AnswerRow, ResultRow, SessionRow};

/// Largest accepted `|scale_value|`.
pub const MAX_SCALE_MAGNITUDE: f64 = 1_000_000.0;

#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session: SessionRow,
    /// False when an existing open session was returned.
    pub created: bool,
    pub question_count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerRequest {
    pub question_id: Uuid,
    #[serde(default)]
    pub selected_option_ids: Vec<Uuid>,
    pub scale_value: Option<f64>,
    pub text_value: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedAnswer {
    pub answer: AnswerRow,
    pub current_question_index: i32,
    pub question_count: usize,
}

/// Starts a session, or returns the user's open session for this diagnosis.
pub async fn start_session(
    store: &dyn SessionStore,
    user_id: Uuid,
    diagnosis_id: Uuid,
) -> Result<StartedSession, AppError> {
    let diagnosis = store
        .load_diagnosis(diagnosis_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Diagnosis {diagnosis_id} not found")))?;

    let (session, created) = store.start_session(user_id, diagnosis_id).await?;
    if created {
        info!("Started session {} on diagnosis {diagnosis_id} for user {user_id}", session.id);
    } else {
        info!("Resumed open session {} for user {user_id}", session.id);
    }

    Ok(StartedSession {
        session,
        created,
        question_count: diagnosis.questions.len(),
    })
}

/// Records (or replaces) the answer to one question.
///
/// The cursor becomes the answered question's index + 1, so answering an
/// earlier question moves it backward.
pub async fn submit_answer(
    store: &dyn SessionStore,
    session_id: Uuid,
    request: AnswerRequest,
) -> Result<SavedAnswer, AppError> {
    if let Some(scale) = request.scale_value {
        if !scale.is_finite() || scale.abs() > MAX_SCALE_MAGNITUDE {
            return Err(AppError::Validation(format!(
                "scale_value must be a finite number within ±{MAX_SCALE_MAGNITUDE}"
            )));
        }
    }

    let session = store
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;

    if !session.is_in_progress() {
        return Err(AppError::Validation(format!(
            "Session {session_id} is {} and no longer accepts answers",
            session.status
        )));
    }

    let diagnosis = store
        .load_diagnosis(session.diagnosis_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Diagnosis {} not found", session.diagnosis_id)))?;

    let index = diagnosis.question_index(request.question_id).ok_or_else(|| {
        AppError::NotFound(format!(
            "Question {} not found in diagnosis {}",
            request.question_id, session.diagnosis_id
        ))
    })?;
    let question = &diagnosis.questions[index];

    let mut selected_option_ids = Vec::with_capacity(request.selected_option_ids.len());
    for option_id in request.selected_option_ids {
        if question.option(option_id).is_none() {
            return Err(AppError::NotFound(format!(
                "Option {option_id} not found on question {}",
                request.question_id
            )));
        }
        if !selected_option_ids.contains(&option_id) {
            selected_option_ids.push(option_id);
        }
    }

    let cursor = index as i32 + 1;
    let answer = store
        .save_answer(
            NewAnswer {
                session_id,
                question_id: request.question_id,
                selected_option_ids,
                scale_value: request.scale_value,
                text_value: request.text_value,
            },
            cursor,
        )
        .await?;

    info!(
        "Saved answer for question {} in session {session_id} (cursor → {cursor})",
        request.question_id
    );

    Ok(SavedAnswer {
        answer,
        current_question_index: cursor,
        question_count: diagnosis.questions.len(),
    })
}

/// Scores the session and persists its result together with the
/// `completed` transition.
pub async fn complete_session(
    store: &dyn SessionStore,
    session_id: Uuid,
) -> Result<ResultRow, AppError> {
    let input = store
        .load_completion_input(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;

    if !input.session.is_in_progress() {
        return Err(AppError::Conflict(format!(
            "Session {session_id} is {} and cannot be completed again",
            input.session.status
        )));
    }

    let outcome = score_answers(&input.diagnosis, &input.answers)?;
    let result = store.commit_completion(&input.session, &outcome).await?;

    info!(
        "Completed session {session_id}: total={} type={} ({} answers, {} categories)",
        result.total_score,
        result.result_type,
        input.answers.len(),
        outcome.category_scores.len()
    );

    Ok(result)
}

pub async fn get_result(store: &dyn SessionStore, result_id: Uuid) -> Result<ResultRow, AppError> {
    store
        .get_result(result_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Result {result_id} not found")))
}
