//! In-memory stores and fixtures for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::types::Json;
use uuid::Uuid;

use crate::config::Config;
use crate::diagnosis::scoring::ScoreOutcome;
use crate::diagnosis::store::{CompletionInput, NewAnswer, SessionStore};
use crate::errors::AppError;
use crate::models::diagnosis::{
    DiagnosisBundle, DiagnosisRow, OptionRow, QuestionRow, QuestionWithOptions, ResultTypeRow,
};
use crate::models::report::{ReportRow, REPORT_COMPLETED, REPORT_FAILED, REPORT_PENDING};
use crate::models::session::{AnswerRow, ResultRow, SessionRow, SessionStatus};
use crate::report::generator::{
    DiagnosisReport, PrioritizedRecommendation, ReportGenerator, ReportInput, SectionAnalysis,
};
use crate::report::store::ReportStore;
use crate::state::AppState;

#[derive(Default)]
struct Inner {
    diagnoses: HashMap<Uuid, DiagnosisBundle>,
    sessions: HashMap<Uuid, SessionRow>,
    answers: Vec<AnswerRow>,
    results: HashMap<Uuid, ResultRow>,
    reports: Vec<ReportRow>,
}

/// Mutex-guarded store mirroring `PgStore` semantics, including the
/// conditional `in_progress → completed` transition.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn with_diagnosis(bundle: DiagnosisBundle) -> Self {
        let store = Self::default();
        store.insert_diagnosis(bundle);
        store
    }

    pub fn insert_diagnosis(&self, bundle: DiagnosisBundle) {
        self.lock().diagnoses.insert(bundle.diagnosis.id, bundle);
    }

    pub fn results_for_session(&self, session_id: Uuid) -> usize {
        self.lock()
            .results
            .values()
            .filter(|r| r.session_id == session_id)
            .count()
    }

    pub fn set_session_status(&self, session_id: Uuid, status: SessionStatus) {
        if let Some(session) = self.lock().sessions.get_mut(&session_id) {
            session.status = status.as_str().to_string();
        }
    }

    /// Moves a report's `updated_at` into the past.
    pub fn backdate_report(&self, report_id: Uuid, by: Duration) {
        if let Some(report) = self.lock().reports.iter_mut().find(|r| r.id == report_id) {
            report.updated_at = report.updated_at - by;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store poisoned")
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn list_diagnoses(&self) -> Result<Vec<DiagnosisRow>, AppError> {
        let mut rows: Vec<_> = self
            .lock()
            .diagnoses
            .values()
            .filter(|b| b.diagnosis.is_published)
            .map(|b| b.diagnosis.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn load_diagnosis(
        &self,
        diagnosis_id: Uuid,
    ) -> Result<Option<DiagnosisBundle>, AppError> {
        Ok(self.lock().diagnoses.get(&diagnosis_id).cloned())
    }

    async fn start_session(
        &self,
        user_id: Uuid,
        diagnosis_id: Uuid,
    ) -> Result<(SessionRow, bool), AppError> {
        let mut inner = self.lock();
        if let Some(open) = inner.sessions.values().find(|s| {
            s.user_id == user_id && s.diagnosis_id == diagnosis_id && s.is_in_progress()
        }) {
            return Ok((open.clone(), false));
        }

        let session = SessionRow {
            id: Uuid::new_v4(),
            user_id,
            diagnosis_id,
            status: SessionStatus::InProgress.as_str().to_string(),
            current_question_index: 0,
            started_at: Utc::now(),
            completed_at: None,
        };
        inner.sessions.insert(session.id, session.clone());
        Ok((session, true))
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<SessionRow>, AppError> {
        Ok(self.lock().sessions.get(&session_id).cloned())
    }

    async fn list_answers(&self, session_id: Uuid) -> Result<Vec<AnswerRow>, AppError> {
        Ok(self
            .lock()
            .answers
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn save_answer(&self, answer: NewAnswer, cursor: i32) -> Result<AnswerRow, AppError> {
        let mut inner = self.lock();
        let session = inner
            .sessions
            .get_mut(&answer.session_id)
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", answer.session_id)))?;
        if !session.is_in_progress() {
            return Err(AppError::Validation(format!(
                "Session {} is {} and no longer accepts answers",
                session.id, session.status
            )));
        }
        session.current_question_index = cursor;

        let row = AnswerRow {
            id: Uuid::new_v4(),
            session_id: answer.session_id,
            question_id: answer.question_id,
            selected_option_ids: answer.selected_option_ids,
            scale_value: answer.scale_value,
            text_value: answer.text_value,
            answered_at: Utc::now(),
        };
        match inner
            .answers
            .iter_mut()
            .find(|a| a.session_id == row.session_id && a.question_id == row.question_id)
        {
            Some(existing) => {
                let id = existing.id;
                *existing = AnswerRow { id, ..row.clone() };
                Ok(existing.clone())
            }
            None => {
                inner.answers.push(row.clone());
                Ok(row)
            }
        }
    }

    async fn load_completion_input(
        &self,
        session_id: Uuid,
    ) -> Result<Option<CompletionInput>, AppError> {
        let inner = self.lock();
        let Some(session) = inner.sessions.get(&session_id).cloned() else {
            return Ok(None);
        };
        let diagnosis = inner
            .diagnoses
            .get(&session.diagnosis_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Diagnosis {} not found", session.diagnosis_id)))?;
        let answers = inner
            .answers
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
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
        let mut inner = self.lock();
        let stored = inner
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session.id)))?;
        if !stored.is_in_progress() {
            return Err(AppError::Conflict(format!(
                "Session {} is already completed",
                session.id
            )));
        }
        stored.status = SessionStatus::Completed.as_str().to_string();
        stored.completed_at = Some(Utc::now());

        let result = ResultRow {
            id: Uuid::new_v4(),
            session_id: session.id,
            user_id: session.user_id,
            diagnosis_id: session.diagnosis_id,
            total_score: outcome.total_score,
            category_scores: Json(outcome.category_scores.clone()),
            result_type: outcome.result_type.type_name.clone(),
            result_title: outcome.result_type.title.clone(),
            result_description: outcome.result_type.description.clone(),
            recommendations: outcome.result_type.recommendations.clone(),
            created_at: Utc::now(),
        };
        inner.results.insert(result.id, result.clone());
        Ok(result)
    }

    async fn get_result(&self, result_id: Uuid) -> Result<Option<ResultRow>, AppError> {
        Ok(self.lock().results.get(&result_id).cloned())
    }

    async fn get_result_by_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<ResultRow>, AppError> {
        Ok(self
            .lock()
            .results
            .values()
            .find(|r| r.session_id == session_id)
            .cloned())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn create_report(&self, result_id: Uuid) -> Result<ReportRow, AppError> {
        let now = Utc::now();
        let row = ReportRow {
            id: Uuid::new_v4(),
            result_id,
            status: REPORT_PENDING.to_string(),
            content: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().reports.push(row.clone());
        Ok(row)
    }

    async fn finish_report(&self, report_id: Uuid, content: &Value) -> Result<(), AppError> {
        if let Some(report) = self.lock().reports.iter_mut().find(|r| r.id == report_id) {
            report.status = REPORT_COMPLETED.to_string();
            report.content = Some(content.clone());
            report.error_message = None;
            report.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn fail_report(&self, report_id: Uuid, message: &str) -> Result<(), AppError> {
        if let Some(report) = self.lock().reports.iter_mut().find(|r| r.id == report_id) {
            report.status = REPORT_FAILED.to_string();
            report.error_message = Some(message.to_string());
            report.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn latest_report(&self, result_id: Uuid) -> Result<Option<ReportRow>, AppError> {
        Ok(self
            .lock()
            .reports
            .iter()
            .rev()
            .find(|r| r.result_id == result_id)
            .cloned())
    }
    async fn fail_stale_reports(
        &self,
        updated_before: DateTime<Utc>,
        message: &str,
    ) -> Result<u64, AppError> {
        let mut failed = 0;
        for report in self.lock().reports.iter_mut() {
            if report.status == REPORT_PENDING && report.updated_at < updated_before {
                report.status = REPORT_FAILED.to_string();
                report.error_message = Some(message.to_string());
                report.updated_at = Utc::now();
                failed += 1;
            }
        }
        Ok(failed)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fixtures
// ────────────────────────────────────────────────────────────────────────────

/// Two-question stress check:
/// - Q1 "stress", weight 1, single choice with options scoring 2 and 5
/// - Q2 "mood", weight 2, option-less scale
///
/// Result types: calm [0, 5], strained [6, 12], overloaded [13, 100].
pub fn stress_check() -> DiagnosisBundle {
    let diagnosis_id = Uuid::new_v4();
    let q1 = Uuid::new_v4();
    let q2 = Uuid::new_v4();

    let question = |id: Uuid, text: &str, kind: &str, tag: &str, weight: f64, order: i32| {
        QuestionRow {
            id,
            diagnosis_id,
            question_text: text.to_string(),
            question_type: kind.to_string(),
            category_tag: Some(tag.to_string()),
            weight,
            display_order: order,
        }
    };
    let option = |label: &str, score: f64, order: i32| OptionRow {
        id: Uuid::new_v4(),
        question_id: q1,
        label: label.to_string(),
        score,
        display_order: order,
    };
    let result_type = |name: &str, min: i32, max: i32, order: i32| ResultTypeRow {
        id: Uuid::new_v4(),
        diagnosis_id,
        type_name: name.to_string(),
        title: format!("You are {name}"),
        description: format!("Scores between {min} and {max}"),
        recommendations: vec![format!("Advice for {name}")],
        min_score: min,
        max_score: max,
        display_order: order,
    };

    DiagnosisBundle {
        diagnosis: DiagnosisRow {
            id: diagnosis_id,
            title: "Stress check".to_string(),
            description: "A short stress questionnaire".to_string(),
            category: "mental_health".to_string(),
            is_published: true,
            created_at: Utc::now(),
        },
        questions: vec![
            QuestionWithOptions {
                question: question(q1, "How stressed were you this week?", "single_choice", "stress", 1.0, 0),
                options: vec![option("A little", 2.0, 0), option("A lot", 5.0, 1)],
            },
            QuestionWithOptions {
                question: question(q2, "Rate your mood", "scale", "mood", 2.0, 1),
                options: vec![],
            },
        ],
        result_types: vec![
            result_type("calm", 0, 5, 0),
            result_type("strained", 6, 12, 1),
            result_type("overloaded", 13, 100, 2),
        ],
    }
}

/// Report generator that answers instantly with a fixed report or error.
pub struct CannedReportGenerator {
    fail: bool,
}

impl CannedReportGenerator {
    pub fn succeeding() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl ReportGenerator for CannedReportGenerator {
    async fn generate(&self, input: &ReportInput) -> Result<DiagnosisReport, AppError> {
        if self.fail {
            return Err(AppError::Llm("model unavailable".to_string()));
        }
        Ok(DiagnosisReport {
            overview: "Canned overview".to_string(),
            section_analyses: input
                .result
                .category_scores
                .0
                .keys()
                .map(|category| SectionAnalysis {
                    category: category.clone(),
                    analysis: format!("{category} looks fine"),
                })
                .collect(),
            strengths: vec!["Honesty".to_string()],
            growth_areas: vec!["Rest".to_string()],
            recommendations: vec![PrioritizedRecommendation {
                priority: 1,
                title: "Sleep".to_string(),
                detail: "Go to bed earlier".to_string(),
            }],
            personalized_advice: "Take it slow.".to_string(),
            conclusion: "You are doing well.".to_string(),
        })
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/shindan_test".to_string(),
        database_max_connections: 1,
        anthropic_api_key: "test-key".to_string(),
        anthropic_base_url: None,
        auto_generate_report: false,
        port: 0,
        rust_log: "debug".to_string(),
    }
}

/// App state over a shared in-memory store.
pub fn test_state(store: Arc<MemoryStore>, generator: CannedReportGenerator) -> AppState {
    AppState {
        store: store.clone(),
        reports: store,
        report_generator: Arc::new(generator),
        config: test_config(),
    }
}
