// Cross-cutting prompt fragments. Feature-specific prompts live next to the
// feature (see `report::prompts`).

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Keeps generated text on the self-reflection side of the line.
pub const NON_CLINICAL_INSTRUCTION: &str = "\
    IMPORTANT: This is a self-reflection questionnaire, not a clinical assessment. \
    Never state or imply a medical or psychiatric diagnosis. \
    If scores suggest significant distress, gently recommend talking to a qualified professional. \
    Write in a warm, respectful, second-person voice.";
