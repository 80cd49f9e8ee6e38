//! Gemini client for lesson-content generation.
//!
//! This module wraps the Google Generative Language `generateContent`
//! endpoint behind the [`ContentGenerator`] trait so the worker pipeline
//! can run against scripted generators in tests.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Model used when `GEMINI_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Request timeout used when `GEMINI_TIMEOUT_SECS` is not set.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Trait for LLM backends that turn a prompt into generated text.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate a completion for the given prompt.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Client for the Gemini `generateContent` API.
pub struct GeminiClient {
    /// Base URL for the API.
    api_base: String,
    /// API key sent in the `x-goog-api-key` header.
    api_key: String,
    /// Model identifier (e.g. "gemini-2.0-flash").
    model: String,
    /// HTTP client for making API requests.
    http_client: Client,
}

impl GeminiClient {
    /// Create a new Gemini client with the default API base and timeout.
    ///
    /// # Arguments
    ///
    /// * `api_key` - API key for the Generative Language API
    /// * `model` - Model identifier to generate with
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http_client: build_http_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Set the request timeout, replacing the default of 120 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = build_http_client(timeout);
        self
    }

    /// Set the API base URL, replacing the public Google endpoint.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Create a new Gemini client from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `GEMINI_API_KEY`: API key for authentication (required)
    /// - `GEMINI_MODEL`: Model identifier (defaults to "gemini-2.0-flash")
    /// - `GEMINI_TIMEOUT_SECS`: Request timeout in seconds (defaults to 120)
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` if `GEMINI_API_KEY` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var("GEMINI_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        let model = env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout = env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self::new(api_key, model).with_timeout(Duration::from_secs(timeout)))
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the configured model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }
}

fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to build HTTP client")
}

/// Internal request structure for the `generateContent` API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    contents: Vec<Content>,
}

/// A single turn of content in a request or response.
#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

/// A text fragment within a content turn.
#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

/// Internal response structure from the `generateContent` API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// A single generated candidate from the API response.
#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl ApiResponse {
    /// Join the text parts of the first candidate, if any.
    fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .map(|part| part.text.as_str())
            .collect();

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

/// Error detail from the API.
#[derive(Debug, Deserialize)]
#[allow(dead_code)] // Fields kept for complete API error deserialization
struct ApiErrorDetail {
    code: Option<u32>,
    message: String,
    status: Option<String>,
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let api_request = ApiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);

        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();

            // Try to parse error response body
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            // Try to parse as structured error
            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                // Handle rate limiting specifically
                if status_code == 429 {
                    return Err(LlmError::RateLimited(error_response.error.message));
                }

                return Err(LlmError::ApiError {
                    code: status_code,
                    message: error_response.error.message,
                });
            }

            // Fall back to raw error text
            return Err(LlmError::ApiError {
                code: status_code,
                message: error_text,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        api_response
            .first_text()
            .ok_or_else(|| LlmError::ParseError("No content in model response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_client_new() {
        let client = GeminiClient::new("test-key", "gemini-2.0-flash");

        assert_eq!(
            client.api_base(),
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(client.model(), "gemini-2.0-flash");
    }

    #[test]
    fn test_gemini_client_with_api_base() {
        let client =
            GeminiClient::new("test-key", "gemini-2.0-flash").with_api_base("http://localhost:4000");

        assert_eq!(client.api_base(), "http://localhost:4000");
    }

    #[tokio::test]
    async fn test_generate_connection_error() {
        // Test that connection errors are properly handled
        let client = GeminiClient::new("test-key", "gemini-2.0-flash")
            .with_api_base("http://localhost:65535") // Use a port that's unlikely to have a server
            .with_timeout(Duration::from_secs(2));

        let result = client.generate("test prompt").await;

        // Should return a RequestFailed error when no server is running
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }

    #[test]
    fn test_api_request_serialization() {
        let request = ApiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "Explain mitosis".to_string(),
                }],
            }],
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert_eq!(
            json,
            r#"{"contents":[{"parts":[{"text":"Explain mitosis"}]}]}"#
        );
    }

    #[test]
    fn test_api_response_first_text_joins_parts() {
        let response: ApiResponse = serde_json::from_str(
            r#"{
                "candidates": [
                    {
                        "content": {
                            "parts": [{"text": "Hello "}, {"text": "world"}],
                            "role": "model"
                        },
                        "finishReason": "STOP"
                    }
                ]
            }"#,
        )
        .expect("response should deserialize");

        assert_eq!(response.first_text(), Some("Hello world".to_string()));
    }

    #[test]
    fn test_api_response_without_candidates() {
        let response: ApiResponse =
            serde_json::from_str(r#"{}"#).expect("response should deserialize");

        assert_eq!(response.first_text(), None);
    }

    #[test]
    fn test_api_error_response_parsing() {
        let parsed: ApiErrorResponse = serde_json::from_str(
            r#"{
                "error": {
                    "code": 429,
                    "message": "Resource has been exhausted",
                    "status": "RESOURCE_EXHAUSTED"
                }
            }"#,
        )
        .expect("error response should deserialize");

        assert_eq!(parsed.error.message, "Resource has been exhausted");
        assert_eq!(parsed.error.code, Some(429));
    }
}
