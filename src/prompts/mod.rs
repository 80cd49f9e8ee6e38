//! LLM prompts for the two-phase notes pipeline.
//!
//! Phase 1 asks for a strict JSON outline of subtopics; phase 2 asks for
//! markdown lesson notes on one subtopic at a time. The outline prompt's
//! output contract is what [`extract_json_array`] and the worker's outline
//! parser rely on, so changes here and there go together.
//!
//! [`extract_json_array`]: crate::utils::json_extraction::extract_json_array

/// Builds the phase-1 prompt asking for a subtopic outline.
///
/// The response must be a bare JSON array of `{name, description}` objects.
pub fn subtopics_prompt(subject: &str, topic: &str) -> String {
    format!(
        r#"You are an expert {subject} teacher preparing lesson notes for university students.

List the key subtopics a student must master to fully understand the topic "{topic}" in {subject}. Order them the way they should be taught.

Your response MUST be a valid JSON array. Each element MUST be an object with exactly these fields:
- "name": the subtopic title
- "description": one sentence describing what the subtopic covers

Example format:
[
  {{"name": "Example subtopic", "description": "What this subtopic covers."}}
]

Do not include any text, explanation or markdown outside the JSON array."#
    )
}

/// Builds the phase-2 prompt asking for full notes on one subtopic.
///
/// The response is consumed as markdown verbatim.
pub fn subtopic_details_prompt(subject: &str, topic: &str, subtopic: &str) -> String {
    format!(
        r#"You are an expert {subject} teacher writing detailed lesson notes for university students.

Write exhaustive, well-structured lesson notes in markdown for the subtopic "{subtopic}" of the topic "{topic}" in {subject}.

The notes MUST include:
- A brief introduction placing the subtopic within "{topic}"
- Clear explanations of every key concept, each with a concrete example
- Definitions of all important terms
- A concluding summary of the main points

Respond with the markdown notes only. Do not include any text outside the notes and do not wrap them in code fences."#
    )
}
