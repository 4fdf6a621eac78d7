//! Diagnosis scoring: turns a session's answers into a total score,
//! per-category sub-scores and the matching result type.
//!
//! Pure and synchronous: everything it needs is loaded before it runs, and
//! persisting the outcome is the caller's job (see `lifecycle::complete_session`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::diagnosis::{DiagnosisBundle, QuestionWithOptions, ResultTypeRow};
use crate::models::session::AnswerRow;

/// Category used for questions without a tag.
pub const DEFAULT_CATEGORY: &str = "general";
/// Result type name used when a diagnosis has no result types at all.
pub const DEFAULT_RESULT_TYPE: &str = "default";
pub const DEFAULT_RESULT_TITLE: &str = "診断結果";

// ────────────────────────────────────────────────────────────────────────────
// Output data models
// ────────────────────────────────────────────────────────────────────────────

/// Running score for one category tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: f64,
    /// Sum of (best option score × weight) over the answered questions only.
    pub max_score: f64,
}

impl CategoryScore {
    /// `score / max_score` as 0–100. `None` when `max_score` is zero, which is
    /// always the case for option-less scale questions.
    pub fn percentage(&self) -> Option<f64> {
        if self.max_score == 0.0 {
            None
        } else {
            Some(self.score / self.max_score * 100.0)
        }
    }
}

pub type CategoryScores = BTreeMap<String, CategoryScore>;

/// Result type content copied into a result at completion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedResultType {
    pub type_name: String,
    pub title: String,
    pub description: String,
    pub recommendations: Vec<String>,
}

impl ResolvedResultType {
    fn placeholder() -> Self {
        Self {
            type_name: DEFAULT_RESULT_TYPE.to_string(),
            title: DEFAULT_RESULT_TITLE.to_string(),
            description: String::new(),
            recommendations: vec![],
        }
    }
}

impl From<&ResultTypeRow> for ResolvedResultType {
    fn from(row: &ResultTypeRow) -> Self {
        Self {
            type_name: row.type_name.clone(),
            title: row.title.clone(),
            description: row.description.clone(),
            recommendations: row.recommendations.clone(),
        }
    }
}

/// Full scoring outcome, ready to be persisted as a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub total_score: i32,
    pub category_scores: CategoryScores,
    pub result_type: ResolvedResultType,
}

// ────────────────────────────────────────────────────────────────────────────
// Scoring
// ────────────────────────────────────────────────────────────────────────────

/// Scores a set of answers against a diagnosis.
///
/// Algorithm:
/// 1. For every answer whose question exists on the diagnosis:
///    - selected options found on the question add `option.score × weight`
///    - a scale value adds `scale × weight` (alongside options, if both present)
///    - free text adds nothing
///    - the category's `max_score` grows by `best option score × weight`
/// 2. The total is rounded to the nearest integer; category scores are not.
/// 3. The result type is the first band containing the rounded total, else the
///    first result type, else a `"default"` placeholder.
///
/// Answers pointing at unknown questions or options are skipped, not rejected.
/// Fails with `Validation` when the sums leave the finite range or the total
/// does not fit an `i32`; such an outcome could not be stored and read back.
pub fn score_answers(
    diagnosis: &DiagnosisBundle,
    answers: &[AnswerRow],
) -> Result<ScoreOutcome, AppError> {
    let (raw_total, category_scores) = accumulate(&diagnosis.questions, answers);

    if let Some((category, _)) = category_scores
        .iter()
        .find(|(_, c)| !c.score.is_finite() || !c.max_score.is_finite())
    {
        return Err(AppError::Validation(format!(
            "Score for category '{category}' is out of range"
        )));
    }
    let total_score = round_total(raw_total).ok_or_else(|| {
        AppError::Validation(format!("Total score {raw_total} is out of range"))
    })?;
    let result_type = select_result_type(&diagnosis.result_types, total_score);

    Ok(ScoreOutcome {
        total_score,
        category_scores,
        result_type,
    })
}

/// Sums weighted answer scores. Returns the unrounded total and the per-category map.
pub fn accumulate(questions: &[QuestionWithOptions], answers: &[AnswerRow]) -> (f64, CategoryScores) {
    let mut total = 0.0_f64;
    let mut categories = CategoryScores::new();

    for answer in answers {
        let Some(question) = questions.iter().find(|q| q.question.id == answer.question_id) else {
            // Stale answer: its question is no longer part of the diagnosis.
            continue;
        };

        let weight = question.question.weight;
        let category = question
            .question
            .category_tag
            .as_deref()
            .unwrap_or(DEFAULT_CATEGORY);
        let bucket = categories.entry(category.to_string()).or_default();

        for option_id in &answer.selected_option_ids {
            if let Some(option) = question.option(*option_id) {
                let points = option.score * weight;
                total += points;
                bucket.score += points;
            }
        }

        if let Some(scale) = answer.scale_value {
            let points = scale * weight;
            total += points;
            bucket.score += points;
        }

        bucket.max_score += max_option_score(question) * weight;
    }

    (total, categories)
}

/// Highest option score on a question, 0 when it has no options.
fn max_option_score(question: &QuestionWithOptions) -> f64 {
    question
        .options
        .iter()
        .map(|o| o.score)
        .reduce(f64::max)
        .unwrap_or(0.0)
}

/// Rounds half up (toward +∞), so -2.5 becomes -2 and 2.5 becomes 3.
/// `None` when the rounded value is not a finite `i32`.
pub fn round_total(raw: f64) -> Option<i32> {
    // `raw + 0.5` would round 0.49999999999999994 up to 1.0 before flooring.
    let floor = raw.floor();
    let rounded = if raw - floor >= 0.5 { floor + 1.0 } else { floor };

    if rounded.is_finite() && (i32::MIN as f64..=i32::MAX as f64).contains(&rounded) {
        Some(rounded as i32)
    } else {
        None
    }
}

/// Picks the first result type (authored order) whose band contains `total_score`.
/// Falls back to the first result type, then to the `"default"` placeholder.
pub fn select_result_type(result_types: &[ResultTypeRow], total_score: i32) -> ResolvedResultType {
    result_types
        .iter()
        .find(|rt| rt.min_score <= total_score && total_score <= rt.max_score)
        .or_else(|| result_types.first())
        .map(ResolvedResultType::from)
        .unwrap_or_else(ResolvedResultType::placeholder)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
