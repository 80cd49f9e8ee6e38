//! Integration tests for the Gemini client.
//!
//! These tests make real API calls to the Generative Language API.
//! Run with: GEMINI_API_KEY=your_key cargo test --test llm_integration -- --ignored

use noteforge::llm::{ContentGenerator, GeminiClient};

fn create_test_client() -> GeminiClient {
    GeminiClient::from_env()
        .expect("GEMINI_API_KEY environment variable must be set for integration tests")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let client = create_test_client();

    let response = client
        .generate("What is 2 + 2? Reply with just the number.")
        .await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let content = response.expect("Should have response");
    assert!(
        content.contains('4'),
        "Response should contain '4', got: {}",
        content
    );
}

#[tokio::test]
#[ignore]
async fn test_outline_prompt_yields_parseable_array() {
    let client = create_test_client();

    let prompt = noteforge::prompts::subtopics_prompt("Biology", "Mitosis");
    let response = client
        .generate(&prompt)
        .await
        .expect("Generation should succeed");

    let array = noteforge::utils::json_extraction::extract_json_array(&response)
        .expect("Response should contain a JSON array");
    let outline: Vec<serde_json::Value> =
        serde_json::from_str(&array).expect("Array should parse");

    assert!(!outline.is_empty(), "Outline should not be empty");
    for item in &outline {
        assert!(item["name"].is_string(), "Each item needs a name: {}", item);
        assert!(
            item["description"].is_string(),
            "Each item needs a description: {}",
            item
        );
    }
}

#[tokio::test]
#[ignore]
async fn test_detail_prompt_yields_markdown() {
    let client = create_test_client();

    let prompt = noteforge::prompts::subtopic_details_prompt("Biology", "Mitosis", "Prophase");
    let content = client
        .generate(&prompt)
        .await
        .expect("Generation should succeed");

    assert!(!content.is_empty(), "Notes should not be empty");
}

#[tokio::test]
async fn test_invalid_api_key() {
    let client = GeminiClient::new("invalid-key", "gemini-2.0-flash");

    let response = client.generate("test").await;
    assert!(response.is_err(), "Should fail with invalid API key");
}
