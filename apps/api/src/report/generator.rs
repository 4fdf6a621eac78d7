//! Report generation: turns a scored result and its answers into a
//! structured, personalised report.
//!
//! `AppState` holds an `Arc<dyn ReportGenerator>`; the default backend is
//! `LlmReportGenerator`. Tests swap in canned generators.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::diagnosis::scoring::DEFAULT_CATEGORY;
use crate::errors::AppError;
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, NON_CLINICAL_INSTRUCTION};
use crate::llm_client::LlmClient;
use crate::models::diagnosis::DiagnosisBundle;
use crate::models::session::{AnswerRow, ResultRow};
use crate::report::prompts::{REPORT_PROMPT_TEMPLATE, REPORT_SYSTEM};

// ────────────────────────────────────────────────────────────────────────────
// Report document
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAnalysis {
    pub category: String,
    pub analysis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedRecommendation {
    /// 1 = most important.
    pub priority: u32,
    pub title: String,
    pub detail: String,
}

/// Fixed-shape report document stored as JSON on the report row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub overview: String,
    pub section_analyses: Vec<SectionAnalysis>,
    pub strengths: Vec<String>,
    pub growth_areas: Vec<String>,
    pub recommendations: Vec<PrioritizedRecommendation>,
    pub personalized_advice: String,
    pub conclusion: String,
}

impl DiagnosisReport {
    /// Orders recommendations by priority; the model does not always do it.
    pub fn normalized(mut self) -> Self {
        self.recommendations.sort_by_key(|r| r.priority);
        self
    }
}

/// Everything a generator may look at.
#[derive(Debug, Clone)]
pub struct ReportInput {
    pub diagnosis: DiagnosisBundle,
    pub result: ResultRow,
    pub answers: Vec<AnswerRow>,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait + LLM backend
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, input: &ReportInput) -> Result<DiagnosisReport, AppError>;
}

pub struct LlmReportGenerator(pub LlmClient);

#[async_trait]
impl ReportGenerator for LlmReportGenerator {
    async fn generate(&self, input: &ReportInput) -> Result<DiagnosisReport, AppError> {
        let prompt = build_report_prompt(input)?;
        let system = format!("{REPORT_SYSTEM} {JSON_ONLY_SYSTEM}");

        let report: DiagnosisReport = self
            .0
            .call_json(&prompt, &system)
            .await
            .map_err(|e| AppError::Llm(format!("Failed to generate report: {e}")))?;

        Ok(report.normalized())
    }
}

/// Fills the report template from a result, its diagnosis and the answers.
pub fn build_report_prompt(input: &ReportInput) -> Result<String, AppError> {
    let category_scores = serde_json::to_string_pretty(&input.result.category_scores.0)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize category scores: {e}")))?;

    let recommendations = if input.result.recommendations.is_empty() {
        "(none)".to_string()
    } else {
        input.result.recommendations.join("; ")
    };

    Ok(REPORT_PROMPT_TEMPLATE
        .replace("{non_clinical_instruction}", NON_CLINICAL_INSTRUCTION)
        .replace("{diagnosis_title}", &input.diagnosis.diagnosis.title)
        .replace("{diagnosis_description}", &input.diagnosis.diagnosis.description)
        .replace("{total_score}", &input.result.total_score.to_string())
        .replace("{result_title}", &input.result.result_title)
        .replace("{result_description}", &input.result.result_description)
        .replace("{recommendations}", &recommendations)
        .replace("{category_scores}", &category_scores)
        .replace("{answers}", &describe_answers(&input.diagnosis, &input.answers)))
}

/// One block per answered question, in questionnaire order. Answers to
/// questions no longer on the diagnosis are left out.
fn describe_answers(diagnosis: &DiagnosisBundle, answers: &[AnswerRow]) -> String {
    let mut out = String::new();

    for question in &diagnosis.questions {
        let Some(answer) = answers.iter().find(|a| a.question_id == question.question.id) else {
            continue;
        };

        let mut parts = Vec::new();
        let labels: Vec<&str> = answer
            .selected_option_ids
            .iter()
            .filter_map(|id| question.option(*id))
            .map(|o| o.label.as_str())
            .collect();
        if !labels.is_empty() {
            parts.push(labels.join(", "));
        }
        if let Some(scale) = answer.scale_value {
            parts.push(format!("scale {scale}"));
        }
        if let Some(text) = answer.text_value.as_deref().filter(|t| !t.trim().is_empty()) {
            parts.push(format!("\"{}\"", text.trim()));
        }
        if parts.is_empty() {
            parts.push("(no response)".to_string());
        }

        let category = question
            .question
            .category_tag
            .as_deref()
            .unwrap_or(DEFAULT_CATEGORY);
        out.push_str(&format!(
            "- [{category}] {}\n  Answer: {}\n",
            question.question.question_text,
            parts.join(" | ")
        ));
    }

    if out.is_empty() {
        out.push_str("(no answers)\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::scoring::{CategoryScore, CategoryScores};
    use crate::diagnosis::testing::stress_check;
    use crate::llm_client::MODEL;
    use chrono::Utc;
    use serde_json::json;
    use sqlx::types::Json;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_input() -> ReportInput {
        let diagnosis = stress_check();
        let q1 = &diagnosis.questions[0];
        let q2 = &diagnosis.questions[1];
        let session_id = Uuid::new_v4();

        let answers = vec![
            AnswerRow {
                id: Uuid::new_v4(),
                session_id,
                question_id: q1.question.id,
                selected_option_ids: vec![q1.options[1].id],
                scale_value: None,
                text_value: None,
                answered_at: Utc::now(),
            },
            AnswerRow {
                id: Uuid::new_v4(),
                session_id,
                question_id: q2.question.id,
                selected_option_ids: vec![],
                scale_value: Some(3.0),
                text_value: Some("  tired lately ".to_string()),
                answered_at: Utc::now(),
            },
        ];

        let mut categories = CategoryScores::new();
        categories.insert("stress".into(), CategoryScore { score: 5.0, max_score: 5.0 });
        categories.insert("mood".into(), CategoryScore { score: 6.0, max_score: 0.0 });

        let result = ResultRow {
            id: Uuid::new_v4(),
            session_id,
            user_id: Uuid::new_v4(),
            diagnosis_id: diagnosis.diagnosis.id,
            total_score: 11,
            category_scores: Json(categories),
            result_type: "strained".into(),
            result_title: "You are strained".into(),
            result_description: "Scores between 6 and 12".into(),
            recommendations: vec!["Advice for strained".into()],
            created_at: Utc::now(),
        };

        ReportInput {
            diagnosis,
            result,
            answers,
        }
    }

    fn report_json() -> serde_json::Value {
        json!({
            "overview": "You are carrying a fair amount of stress.",
            "section_analyses": [
                {"category": "stress", "analysis": "High"},
                {"category": "mood", "analysis": "Moderate"}
            ],
            "strengths": ["Self-awareness"],
            "growth_areas": ["Rest"],
            "recommendations": [
                {"priority": 2, "title": "Walk", "detail": "Daily"},
                {"priority": 1, "title": "Sleep", "detail": "Eight hours"}
            ],
            "personalized_advice": "Be kind to yourself.",
            "conclusion": "Small steps help."
        })
    }

    #[test]
    fn test_prompt_contains_result_and_answers() {
        let prompt = build_report_prompt(&make_input()).unwrap();

        assert!(prompt.contains("QUESTIONNAIRE: Stress check"));
        assert!(prompt.contains("Total score: 11"));
        assert!(prompt.contains("You are strained"));
        assert!(prompt.contains("Advice for strained"));
        assert!(prompt.contains("\"stress\""));
        assert!(prompt.contains("Answer: A lot"));
        assert!(prompt.contains("scale 3 | \"tired lately\""));
        assert!(!prompt.contains("{answers}"));
        assert!(!prompt.contains("{non_clinical_instruction}"));
    }

    #[test]
    fn test_describe_answers_skips_unanswered_questions() {
        let input = make_input();
        let only_first = vec![input.answers[0].clone()];
        let text = describe_answers(&input.diagnosis, &only_first);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("[stress]"));
        assert!(!text.contains("[mood]"));
    }

    #[test]
    fn test_describe_answers_without_answers() {
        let input = make_input();
        assert_eq!(describe_answers(&input.diagnosis, &[]), "(no answers)\n");
    }

    #[test]
    fn test_normalized_sorts_recommendations() {
        let report: DiagnosisReport = serde_json::from_value(report_json()).unwrap();
        let report = report.normalized();
        assert_eq!(report.recommendations[0].title, "Sleep");
        assert_eq!(report.recommendations[1].priority, 2);
    }

    #[tokio::test]
    async fn test_llm_generator_parses_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": MODEL,
                "content": [{"type": "text", "text": report_json().to_string()}],
                "usage": {"input_tokens": 900, "output_tokens": 400}
            })))
            .mount(&server)
            .await;

        let generator =
            LlmReportGenerator(LlmClient::new("test-key".into(), Some(server.uri())).unwrap());
        let report = generator.generate(&make_input()).await.unwrap();

        assert_eq!(report.section_analyses.len(), 2);
        assert_eq!(report.recommendations[0].priority, 1);
        assert_eq!(report.conclusion, "Small steps help.");
    }

    #[tokio::test]
    async fn test_llm_generator_rejects_malformed_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "{\"overview\": \"only this\"}"}],
                "usage": {"input_tokens": 1, "output_tokens": 1}
            })))
            .mount(&server)
            .await;

        let generator =
            LlmReportGenerator(LlmClient::new("test-key".into(), Some(server.uri())).unwrap());
        let err = generator.generate(&make_input()).await.unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }
}
