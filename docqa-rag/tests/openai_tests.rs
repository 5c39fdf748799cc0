//! HTTP-level tests for the OpenAI providers against a local mock server.

use std::time::Duration;

use docqa_rag::openai::{OpenAICompletionProvider, OpenAIConfig, OpenAIEmbeddingProvider};
use docqa_rag::{CompletionProvider, CompletionRequest, EmbeddingProvider, RagError, RetryPolicy};
use mockito::Matcher;
use serde_json::json;

fn config_for(server: &mockito::Server) -> OpenAIConfig {
    OpenAIConfig::new("test-key").unwrap().with_api_base(server.url())
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

#[tokio::test]
async fn embeddings_are_returned_in_input_order() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/embeddings")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "text-embedding-ada-002",
            "input": ["first", "second"],
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": [
                    { "index": 1, "embedding": [0.0, 1.0] },
                    { "index": 0, "embedding": [1.0, 0.0] },
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = OpenAIEmbeddingProvider::new(config_for(&server)).unwrap();
    let vectors = provider.embed_batch(&["first", "second"]).await.unwrap();

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    mock.assert_async().await;
}

#[tokio::test]
async fn large_inputs_are_split_into_batches() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("POST", "/v1/embeddings")
        .match_body(Matcher::PartialJson(json!({ "input": ["a", "b"] })))
        .with_status(200)
        .with_body(
            json!({
                "data": [
                    { "index": 0, "embedding": [1.0] },
                    { "index": 1, "embedding": [2.0] },
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", "/v1/embeddings")
        .match_body(Matcher::PartialJson(json!({ "input": ["c"] })))
        .with_status(200)
        .with_body(json!({ "data": [{ "index": 0, "embedding": [3.0] }] }).to_string())
        .expect(1)
        .create_async()
        .await;

    let provider = OpenAIEmbeddingProvider::new(config_for(&server)).unwrap().with_batch_size(2);
    let vectors = provider.embed_batch(&["a", "b", "c"]).await.unwrap();

    assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn server_errors_are_retried_until_exhausted() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/embeddings")
        .with_status(500)
        .with_body(json!({ "error": { "message": "upstream overloaded" } }).to_string())
        .expect(3)
        .create_async()
        .await;

    let provider = OpenAIEmbeddingProvider::new(config_for(&server))
        .unwrap()
        .with_retry_policy(fast_retry());
    let err = provider.embed("hello").await.unwrap_err();

    match err {
        RagError::EmbeddingError { message, .. } => {
            assert!(message.contains("upstream overloaded"), "unexpected message: {message}");
        }
        other => panic!("expected EmbeddingError, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn rate_limits_are_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/embeddings")
        .with_status(429)
        .with_body(json!({ "error": { "message": "slow down" } }).to_string())
        .expect(3)
        .create_async()
        .await;

    let provider = OpenAIEmbeddingProvider::new(config_for(&server))
        .unwrap()
        .with_retry_policy(fast_retry());
    assert!(provider.embed("hello").await.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn authentication_failures_are_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/embeddings")
        .with_status(401)
        .with_body(json!({ "error": { "message": "Incorrect API key provided" } }).to_string())
        .expect(1)
        .create_async()
        .await;

    let provider = OpenAIEmbeddingProvider::new(config_for(&server))
        .unwrap()
        .with_retry_policy(fast_retry());
    let err = provider.embed("hello").await.unwrap_err();

    assert!(matches!(err, RagError::EmbeddingError { .. }));
    assert!(err.is_service_error());
    mock.assert_async().await;
}

#[tokio::test]
async fn mismatched_embedding_count_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/embeddings")
        .with_status(200)
        .with_body(json!({ "data": [{ "index": 0, "embedding": [1.0] }] }).to_string())
        .create_async()
        .await;

    let provider = OpenAIEmbeddingProvider::new(config_for(&server)).unwrap();
    let err = provider.embed_batch(&["a", "b"]).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));
}

#[tokio::test]
async fn completion_sends_deterministic_request_and_trims_answer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-3.5-turbo",
            "temperature": 0.0,
            "max_tokens": 64,
            "messages": [{ "role": "user", "content": "When is the dentist appointment?" }],
        })))
        .with_status(200)
        .with_body(
            json!({
                "choices": [{ "message": { "role": "assistant", "content": "  Monday at 9am.\n" } }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = OpenAICompletionProvider::new(config_for(&server)).unwrap();
    let request = CompletionRequest {
        prompt: "When is the dentist appointment?".into(),
        temperature: 0.0,
        max_tokens: 64,
    };
    let answer = provider.complete(&request).await.unwrap();

    assert_eq!(answer, "Monday at 9am.");
    mock.assert_async().await;
}

#[tokio::test]
async fn completion_is_not_retried_by_default() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let provider = OpenAICompletionProvider::new(config_for(&server)).unwrap();
    let request = CompletionRequest { prompt: "q".into(), temperature: 0.0, max_tokens: 8 };
    let err = provider.complete(&request).await.unwrap_err();

    assert!(matches!(err, RagError::CompletionError { .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn empty_choices_are_a_completion_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(json!({ "choices": [] }).to_string())
        .create_async()
        .await;

    let provider = OpenAICompletionProvider::new(config_for(&server)).unwrap();
    let request = CompletionRequest { prompt: "q".into(), temperature: 0.0, max_tokens: 8 };
    assert!(matches!(
        provider.complete(&request).await,
        Err(RagError::CompletionError { .. })
    ));
}
