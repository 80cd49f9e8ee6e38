//! JSON extraction from LLM responses.
//!
//! The outline phase of the pipeline asks the model for a bare JSON array,
//! but responses routinely arrive wrapped in markdown code fences or with
//! explanatory prose around the payload. This module digs the first
//! balanced JSON array out of such content.
//!
//! # Extraction strategy
//!
//! 1. ```json code fences
//! 2. Generic ``` code fences
//! 3. First balanced array anywhere in the content (bracket matching,
//!    string- and escape-aware)
//!
//! Candidates are validated with a real JSON parse before being returned.

use regex::Regex;
use thiserror::Error;

/// Error type for JSON extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON array appears truncated: {unclosed_brackets} unclosed brackets. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_brackets: usize,
    },

    #[error("No JSON array found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Extracts the first balanced JSON array from an LLM response.
///
/// # Arguments
///
/// * `content` - The raw response text
///
/// # Returns
///
/// The array as a string, ready for typed deserialization.
///
/// # Errors
///
/// `Truncated` when an array opens but never closes (the model ran out of
/// tokens mid-payload), `NotFound` when the content holds no array at all.
pub fn extract_json_array(content: &str) -> Result<String, JsonExtractionError> {
    let trimmed = content.trim();

    // Fenced blocks first: strict-output prompts regularly come back
    // inside ```json fences despite asking for bare JSON.
    for block in [
        extract_from_json_code_block(trimmed),
        extract_from_generic_code_block(trimmed),
    ]
    .into_iter()
    .flatten()
    {
        if serde_json::from_str::<serde_json::Value>(&block).is_ok() {
            return Ok(block);
        }
    }

    if let Some(start) = trimmed.find('[') {
        if let Some(end) = find_matching_bracket(&trimmed[start..]) {
            let candidate = &trimmed[start..=start + end];
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return Ok(candidate.to_string());
            }
        }

        let tail = &trimmed[start..];
        let unclosed = count_unclosed_brackets(tail);
        if unclosed > 0 {
            return Err(JsonExtractionError::Truncated {
                partial_preview: preview(tail, 100),
                unclosed_brackets: unclosed,
            });
        }
    }

    Err(JsonExtractionError::NotFound {
        content_preview: preview(trimmed, 50),
    })
}

/// Finds the matching closing bracket for a JSON array.
///
/// Handles nested arrays, string literals and escape sequences. `s` must
/// start at or before the opening '['.
///
/// # Returns
///
/// The index of the matching closing ']', or None if not found.
pub fn find_matching_bracket(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '[' if !in_string => {
                depth += 1;
            }
            ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extracts an array from a ```json ... ``` code block.
fn extract_from_json_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```json\s*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    bounded_array(caps.get(1)?.as_str().trim())
}

/// Extracts an array from a generic ``` ... ``` code block.
fn extract_from_generic_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    bounded_array(caps.get(1)?.as_str().trim())
}

fn bounded_array(content: &str) -> Option<String> {
    let start = content.find('[')?;
    let end = find_matching_bracket(&content[start..])?;
    Some(content[start..=start + end].to_string())
}

/// Counts '[' without a matching ']' outside string literals.
fn count_unclosed_brackets(s: &str) -> usize {
    let mut depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '[' if !in_string => {
                depth += 1;
            }
            ']' if !in_string => {
                depth -= 1;
            }
            _ => {}
        }
    }

    depth.max(0) as usize
}

/// Takes up to `max_chars` characters, safe on multibyte content.
fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
