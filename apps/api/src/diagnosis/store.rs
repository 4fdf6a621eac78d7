//! Persistence contract for diagnoses, sessions, answers and results.
//!
//! `AppState` carries an `Arc<dyn SessionStore>`; production uses `PgStore`,
//! tests use an in-memory store.

use async_trait::async_trait;
use uuid::Uuid;

use crate::diagnosis::scoring::ScoreOutcome;
use crate::errors::AppError;
use crate::models::diagnosis::{DiagnosisBundle, DiagnosisRow};
use crate::models::session::{AnswerRow, ResultRow, SessionRow};

/// An answer to upsert for (session, question).
#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub session_id: Uuid,
    pub question_id: Uuid,
    pub selected_option_ids: Vec<Uuid>,
    pub scale_value: Option<f64>,
    pub text_value: Option<String>,
}

/// Everything completion reads before scoring.
#[derive(Debug, Clone)]
pub struct CompletionInput {
    pub session: SessionRow,
    pub diagnosis: DiagnosisBundle,
    pub answers: Vec<AnswerRow>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;

    /// Published diagnoses, newest first.
    async fn list_diagnoses(&self) -> Result<Vec<DiagnosisRow>, AppError>;

    /// A diagnosis with questions (and their options) and result types, all in
    /// authored order.
    async fn load_diagnosis(&self, diagnosis_id: Uuid)
        -> Result<Option<DiagnosisBundle>, AppError>;

    /// Returns the open session for (user, diagnosis), creating it if needed.
    /// The flag is true when a new session was created.
    async fn start_session(
        &self,
        user_id: Uuid,
        diagnosis_id: Uuid,
    ) -> Result<(SessionRow, bool), AppError>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRow>, AppError>;

    async fn list_answers(&self, session_id: Uuid) -> Result<Vec<AnswerRow>, AppError>;

    /// Upserts the answer for (session, question) and sets the session cursor.
    /// Fails with `Validation` if the session is no longer in progress.
    async fn save_answer(&self, answer: NewAnswer, cursor: i32) -> Result<AnswerRow, AppError>;

    async fn load_completion_input(
        &self,
        session_id: Uuid,
    ) -> Result<Option<CompletionInput>, AppError>;

    /// Moves the session from `in_progress` to `completed` and inserts its
    /// result in one transaction. Fails with `Conflict` if the session already
    /// left `in_progress`; nothing is written in that case.
    async fn commit_completion(
        &self,
        session: &SessionRow,
        outcome: &ScoreOutcome,
    ) -> Result<ResultRow, AppError>;

    async fn get_result(&self, result_id: Uuid) -> Result<Option<ResultRow>, AppError>;

    async fn get_result_by_session(&self, session_id: Uuid)
        -> Result<Option<ResultRow>, AppError>;
}
