//! Tests for the Ollama generation client.

use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn generator(server: &MockServer) -> OllamaGenerator {
    OllamaGenerator::new(
        format!("{}/api/generate", server.uri()),
        "llama3",
        Duration::from_secs(5),
    )
}

/// The request carries model, prompt, stream=false and the temperature option.
#[tokio::test]
async fn test_generate_sends_expected_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({
            "model": "llama3",
            "prompt": "say hi",
            "stream": false,
            "options": {"temperature": 0.5}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "  hi!  ", "done": true})))
        .expect(1)
        .mount(&server)
        .await;

    let reply = generator(&server)
        .with_temperature(0.5)
        .generate("say hi")
        .await
        .unwrap();

    assert_eq!(reply, "hi!");
}

/// Non-2xx responses are status errors.
#[tokio::test]
async fn test_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = generator(&server).generate("x").await;
    assert!(matches!(result, Err(GenerationError::Status { status: 500 })));
}

/// A body without `response` is reported as missing text.
#[tokio::test]
async fn test_missing_response_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
        .mount(&server)
        .await;

    let result = generator(&server).generate("x").await;
    assert!(matches!(result, Err(GenerationError::MissingResponse)));
}

/// A slow service hits the request timeout.
#[tokio::test]
async fn test_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": "late"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(
        format!("{}/api/generate", server.uri()),
        "llama3",
        Duration::from_millis(200),
    );
    let result = generator.generate("x").await;
    assert!(matches!(result, Err(GenerationError::Timeout(_))));
}

/// An unreachable service is a request error.
#[tokio::test]
async fn test_unreachable_service() {
    let generator = OllamaGenerator::new(
        "http://127.0.0.1:1/api/generate",
        "llama3",
        Duration::from_secs(2),
    );
    let result = generator.generate("x").await;
    assert!(matches!(result, Err(GenerationError::Request(_))));
}
