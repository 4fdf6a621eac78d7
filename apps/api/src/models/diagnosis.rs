use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DiagnosisRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub diagnosis_id: Uuid,
    pub question_text: String,
    /// single_choice | multiple_choice | scale | text
    pub question_type: String,
    pub category_tag: Option<String>,
    pub weight: f64,
    pub display_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OptionRow {
    pub id: Uuid,
    pub question_id: Uuid,
    pub label: String,
    pub score: f64,
    pub display_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResultTypeRow {
    pub id: Uuid,
    pub diagnosis_id: Uuid,
    pub type_name: String,
    pub title: String,
    pub description: String,
    pub recommendations: Vec<String>,
    pub min_score: i32,
    pub max_score: i32,
    pub display_order: i32,
}

/// A question together with its options in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionWithOptions {
    #[serde(flatten)]
    pub question: QuestionRow,
    pub options: Vec<OptionRow>,
}

impl QuestionWithOptions {
    pub fn option(&self, option_id: Uuid) -> Option<&OptionRow> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

/// A diagnosis with everything scoring needs, eagerly loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisBundle {
    pub diagnosis: DiagnosisRow,
    pub questions: Vec<QuestionWithOptions>,
    pub result_types: Vec<ResultTypeRow>,
}

impl DiagnosisBundle {
    /// Position of a question in authored order.
    pub fn question_index(&self, question_id: Uuid) -> Option<usize> {
        self.questions
            .iter()
            .position(|q| q.question.id == question_id)
    }
}
