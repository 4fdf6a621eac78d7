//! `SessionStore` on PostgreSQL.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::types::Json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::PgStore;
use crate::diagnosis::scoring::ScoreOutcome;
use crate::diagnosis::store::{CompletionInput, NewAnswer, SessionStore};
use crate::errors::{is_unique_violation, AppError};
use crate::models::diagnosis::{
    DiagnosisBundle, DiagnosisRow, OptionRow, QuestionRow, QuestionWithOptions, ResultTypeRow,
};
use crate::models::session::{AnswerRow, ResultRow, SessionRow, SessionStatus};

#[async_trait]
impl SessionStore for PgStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_diagnoses(&self) -> Result<Vec<DiagnosisRow>, AppError> {
        Ok(sqlx::query_as::<_, DiagnosisRow>(
            "SELECT * FROM diagnoses WHERE is_published ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn load_diagnosis(
        &self,
        diagnosis_id: Uuid,
    ) -> Result<Option<DiagnosisBundle>, AppError> {
        let diagnosis = sqlx::query_as::<_, DiagnosisRow>("SELECT * FROM diagnoses WHERE id = $1")
            .bind(diagnosis_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(diagnosis) = diagnosis else {
            return Ok(None);
        };

        let questions = sqlx::query_as::<_, QuestionRow>(
            "SELECT * FROM questions WHERE diagnosis_id = $1 ORDER BY display_order, id",
        )
        .bind(diagnosis_id)
        .fetch_all(&self.pool)
        .await?;

        let options = sqlx::query_as::<_, OptionRow>(
            r#"
            SELECT o.*
            FROM question_options o
            JOIN questions q ON q.id = o.question_id
            WHERE q.diagnosis_id = $1
            ORDER BY o.display_order, o.id
            "#,
        )
        .bind(diagnosis_id)
        .fetch_all(&self.pool)
        .await?;

        let result_types = sqlx::query_as::<_, ResultTypeRow>(
            "SELECT * FROM result_types WHERE diagnosis_id = $1 ORDER BY display_order, id",
        )
        .bind(diagnosis_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(DiagnosisBundle {
            diagnosis,
            questions: attach_options(questions, options),
            result_types,
        }))
    }

    async fn start_session(
        &self,
        user_id: Uuid,
        diagnosis_id: Uuid,
    ) -> Result<(SessionRow, bool), AppError> {
        // The partial unique index on open sessions turns a racing second
        // insert into a no-op; the loser then reads the winner's row.
        let inserted = sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO diagnosis_sessions (id, user_id, diagnosis_id, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, diagnosis_id) WHERE status = 'in_progress' DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(diagnosis_id)
        .bind(SessionStatus::InProgress.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(session) = inserted {
            return Ok((session, true));
        }

        let existing = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT * FROM diagnosis_sessions
            WHERE user_id = $1 AND diagnosis_id = $2 AND status = 'in_progress'
            "#,
        )
        .bind(user_id)
        .bind(diagnosis_id)
        .fetch_optional(&self.pool)
        .await?;

        existing.map(|s| (s, false)).ok_or_else(|| {
            AppError::Conflict(format!(
                "Open session for diagnosis {diagnosis_id} changed state during start"
            ))
        })
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRow>, AppError> {
        Ok(
            sqlx::query_as::<_, SessionRow>("SELECT * FROM diagnosis_sessions WHERE id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_answers(&self, session_id: Uuid) -> Result<Vec<AnswerRow>, AppError> {
        Ok(sqlx::query_as::<_, AnswerRow>(
            "SELECT * FROM answers WHERE session_id = $1 ORDER BY answered_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn save_answer(&self, answer: NewAnswer, cursor: i32) -> Result<AnswerRow, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises answers against a concurrent completion.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM diagnosis_sessions WHERE id = $1 FOR UPDATE")
                .bind(answer.session_id)
                .fetch_optional(&mut *tx)
                .await?;

        match status.as_deref().and_then(SessionStatus::parse) {
            None => {
                return Err(AppError::NotFound(format!(
                    "Session {} not found",
                    answer.session_id
                )))
            }
            Some(SessionStatus::InProgress) => {}
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "Session {} is {} and no longer accepts answers",
                    answer.session_id,
                    other.as_str()
                )))
            }
        }

        let row = sqlx::query_as::<_, AnswerRow>(
            r#"
            INSERT INTO answers
                (id, session_id, question_id, selected_option_ids, scale_value, text_value)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id, question_id) DO UPDATE SET
                selected_option_ids = EXCLUDED.selected_option_ids,
                scale_value = EXCLUDED.scale_value,
                text_value = EXCLUDED.text_value,
                answered_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(answer.session_id)
        .bind(answer.question_id)
        .bind(&answer.selected_option_ids)
        .bind(answer.scale_value)
        .bind(&answer.text_value)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE diagnosis_sessions SET current_question_index = $1 WHERE id = $2")
            .bind(cursor)
            .bind(answer.session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn load_completion_input(
        &self,
        session_id: Uuid,
    ) -> Result<Option<CompletionInput>, AppError> {
        let Some(session) = self.get_session(session_id).await? else {
            return Ok(None);
        };

        let diagnosis = self
            .load_diagnosis(session.diagnosis_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Diagnosis {} not found", session.diagnosis_id))
            })?;

        let answers = self.list_answers(session_id).await?;

        Ok(Some(CompletionInput {
            session,
            diagnosis,
            answers,
        }))
    }

    async fn commit_completion(
        &self,
        session: &SessionRow,
        outcome: &ScoreOutcome,
    ) -> Result<ResultRow, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE diagnosis_sessions
            SET status = 'completed', completed_at = now()
            WHERE id = $1 AND status = 'in_progress'
            "#,
        )
        .bind(session.id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            warn!("Completion of session {} lost: no longer in progress", session.id);
            return Err(AppError::Conflict(format!(
                "Session {} is already completed",
                session.id
            )));
        }

        let result = sqlx::query_as::<_, ResultRow>(
            r#"
            INSERT INTO diagnosis_results
                (id, session_id, user_id, diagnosis_id, total_score, category_scores,
                 result_type, result_title, result_description, recommendations)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.diagnosis_id)
        .bind(outcome.total_score)
        .bind(Json(&outcome.category_scores))
        .bind(&outcome.result_type.type_name)
        .bind(&outcome.result_type.title)
        .bind(&outcome.result_type.description)
        .bind(&outcome.result_type.recommendations)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Session {} already has a result", session.id))
            } else {
                AppError::Database(e)
            }
        })?;

        tx.commit().await?;
        debug!("Committed result {} for session {}", result.id, session.id);
        Ok(result)
    }

    async fn get_result(&self, result_id: Uuid) -> Result<Option<ResultRow>, AppError> {
        Ok(
            sqlx::query_as::<_, ResultRow>("SELECT * FROM diagnosis_results WHERE id = $1")
                .bind(result_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_result_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<ResultRow>, AppError> {
        Ok(
            sqlx::query_as::<_, ResultRow>("SELECT * FROM diagnosis_results WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}

/// Groups options under their questions, keeping both in the order given.
pub(crate) fn attach_options(
    questions: Vec<QuestionRow>,
    options: Vec<OptionRow>,
) -> Vec<QuestionWithOptions> {
    let mut by_question: HashMap<Uuid, Vec<OptionRow>> = HashMap::new();
    for option in options {
        by_question.entry(option.question_id).or_default().push(option);
    }

    questions
        .into_iter()
        .map(|question| {
            let options = by_question.remove(&question.id).unwrap_or_default();
            QuestionWithOptions { question, options }
        })
        .collect()
}
