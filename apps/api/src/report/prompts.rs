/// System prompt for report generation. Combined with `JSON_ONLY_SYSTEM`.
pub const REPORT_SYSTEM: &str = "You are an experienced counselor writing a personalised, \
    structured report from the results of a psychological self-assessment questionnaire.";

/// Report prompt template.
/// Replace: {non_clinical_instruction}, {diagnosis_title}, {diagnosis_description},
///          {total_score}, {result_title}, {result_description}, {recommendations},
///          {category_scores}, {answers}
pub const REPORT_PROMPT_TEMPLATE: &str = r#"{non_clinical_instruction}

QUESTIONNAIRE: {diagnosis_title}
{diagnosis_description}

RESULT
- Total score: {total_score}
- Result type: {result_title}
- Result description: {result_description}
- Standard recommendations: {recommendations}

CATEGORY SCORES (JSON, score and max_score per category; max_score 0 means no upper bound is known):
{category_scores}

ANSWERS (in questionnaire order):
{answers}

Write a report as a JSON object with this EXACT schema (no extra fields):
{
  "overview": "2-3 sentence summary of the result",
  "section_analyses": [
    {"category": "category name from CATEGORY SCORES", "analysis": "what this category's score suggests"}
  ],
  "strengths": ["strength grounded in the answers"],
  "growth_areas": ["area to work on, phrased constructively"],
  "recommendations": [
    {"priority": 1, "title": "short action", "detail": "how and why to do it"}
  ],
  "personalized_advice": "a paragraph addressed to the person",
  "conclusion": "one encouraging closing paragraph"
}

Rules:
- Include one section_analyses entry per category in CATEGORY SCORES, no others.
- recommendations: 3 to 5 items, priority 1 is the most important, priorities unique.
- Base every statement on the result and answers above. Do not invent facts about the person."#;
