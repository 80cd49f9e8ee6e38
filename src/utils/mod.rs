//! Shared utility functions for noteforge.
//!
//! Currently this is JSON extraction from LLM responses, used by the
//! worker's outline parser.

pub mod json_extraction;

pub use json_extraction::{extract_json_array, find_matching_bracket, JsonExtractionError};
