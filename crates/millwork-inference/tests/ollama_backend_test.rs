//! OllamaBackend and DimensionInterpreter against a mock Ollama server.

use std::sync::Arc;

use millwork_core::{
    BoundingBox, Candidate, ConfidenceScorer, Error, GenerationBackend, Recommendation,
};
use millwork_inference::{DimensionInterpreter, OllamaBackend};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer, timeout_secs: u64) -> OllamaBackend {
    OllamaBackend::with_config(server.uri(), "test-model".to_string(), timeout_secs)
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "model": "test-model",
        "message": {"role": "assistant", "content": content},
        "done": true
    })
}

#[tokio::test]
async fn test_generate_posts_chat_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": false,
            "format": "json"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("{\"ok\": true}")))
        .expect(1)
        .mount(&server)
        .await;

    let answer = backend(&server, 5)
        .generate_with_system("be brief", "hello")
        .await
        .unwrap();
    assert_eq!(answer, "{\"ok\": true}");
}

#[tokio::test]
async fn test_plain_text_mode_omits_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("hi")))
        .mount(&server)
        .await;

    let backend = backend(&server, 5).with_json_format(false);
    assert_eq!(backend.generate("hello").await.unwrap(), "hi");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("format").is_none());
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_http_error_is_boundary_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let err = backend(&server, 5).generate("hello").await.unwrap_err();
    match err {
        Error::ExternalBoundary(msg) => assert!(msg.contains("model not loaded")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_is_boundary_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_reply("late"))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = backend(&server, 1).generate("hello").await.unwrap_err();
    assert!(matches!(err, Error::ExternalBoundary(_)));
}

#[tokio::test]
async fn test_interpreter_over_ollama() {
    let server = MockServer::start().await;
    let answer = json!({
        "interpretation": {"cabinet_type": "base", "corrected_dimensions": {"width": 30, "height": 34.5, "depth": 24}},
        "component_analysis": {"drawer_count": 1, "door_count": 2},
        "improved_confidence": {"score": 84, "improvement_reason": "standard base cabinet"},
        "warnings": [],
        "recommendation": "approve"
    });
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(&answer.to_string())))
        .mount(&server)
        .await;

    let interpreter = DimensionInterpreter::new(Arc::new(backend(&server, 5)));
    let mut candidate = Candidate::named("Austin-Base");
    candidate.bounding_box = Some(BoundingBox::new([0.0; 3], [30.0, 24.0, 34.5]));
    let score = ConfidenceScorer::default().score(&candidate);

    let result = interpreter.interpret(&candidate, &score, None).await.unwrap();
    assert_eq!(result.recommendation, Recommendation::Approve);
    assert_eq!(result.improved_confidence, Some(84.0));
    assert_eq!(result.corrected_dimensions.unwrap().door_count, Some(2));
}

#[tokio::test]
async fn test_interpreter_survives_unreachable_service() {
    let interpreter = DimensionInterpreter::new(Arc::new(OllamaBackend::with_config(
        "http://127.0.0.1:9".to_string(),
        "test-model".to_string(),
        2,
    )));
    let candidate = Candidate::named("Austin-Base");
    let score = ConfidenceScorer::default().score(&candidate);
    assert!(interpreter.interpret(&candidate, &score, None).await.is_none());
}
