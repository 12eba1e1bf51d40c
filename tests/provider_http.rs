//! OpenAI-compatible provider against an in-process mock server.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use recall_index::config::EmbeddingConfig;
use recall_index::embedding::{
    create_provider, EmbeddingCategory, EmbeddingGenerator, EmbeddingProvider, OpenAIConfig,
    OpenAIProvider,
};
use recall_index::error::{Error, ProviderError, ValidationError};
use recall_index::retry::RetryPolicy;

/// Replies with `script[n]` to the n-th request, repeating the last entry.
struct Mock {
    script: Vec<(u16, Value)>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Value>>,
    auth: Mutex<Option<String>>,
}

impl Mock {
    fn new(script: Vec<(u16, Value)>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            auth: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn embeddings(
    State(mock): State<Arc<Mock>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let n = mock.calls.fetch_add(1, Ordering::SeqCst);
    mock.requests.lock().unwrap().push(body);
    *mock.auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (status, reply) = mock.script[n.min(mock.script.len() - 1)].clone();
    (StatusCode::from_u16(status).unwrap(), Json(reply))
}

async fn start(mock: Arc<Mock>) -> String {
    let app = Router::new()
        .route("/v1/embeddings", post(embeddings))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

fn ok(vector: &[f32], prompt_tokens: u32) -> (u16, Value) {
    (
        200,
        json!({
            "object": "list",
            "data": [{ "object": "embedding", "index": 0, "embedding": vector }],
            "model": "test-embed",
            "usage": { "prompt_tokens": prompt_tokens, "total_tokens": prompt_tokens }
        }),
    )
}

fn error(status: u16, message: &str) -> (u16, Value) {
    (status, json!({ "error": { "message": message } }))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        multiplier: 2.0,
        max_delay: Duration::from_millis(5),
    }
}

fn generator(base_url: String, dims: usize) -> EmbeddingGenerator {
    let provider = OpenAIProvider::new(OpenAIConfig {
        base_url,
        api_key: "test-key".into(),
        model: "test-embed".into(),
        dims,
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    EmbeddingGenerator::new(Arc::new(provider), fast_retry())
}

#[tokio::test]
async fn test_success_is_parsed_and_normalized() {
    let mock = Mock::new(vec![ok(&[3.0, 4.0], 7)]);
    let url = start(mock.clone()).await;
    let generator = generator(url, 2);

    let embedding = generator
        .generate("hello world", EmbeddingCategory::Query)
        .await
        .unwrap();
    assert_eq!(embedding.dimension, 2);
    assert_eq!(embedding.model, "test-embed");
    assert_eq!(embedding.token_count, 7);
    assert!((embedding.vector[0] - 0.6).abs() < 1e-6);
    assert!((embedding.vector[1] - 0.8).abs() < 1e-6);

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests[0]["model"], "test-embed");
    assert_eq!(requests[0]["input"], "hello world");
    assert_eq!(requests[0]["dimensions"], 2);
    assert_eq!(
        mock.auth.lock().unwrap().as_deref(),
        Some("Bearer test-key")
    );
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let mock = Mock::new(vec![error(429, "slow down"), ok(&[1.0, 0.0], 1)]);
    let url = start(mock.clone()).await;
    let generator = generator(url, 2);

    let embedding = generator
        .generate("retry me", EmbeddingCategory::Chunk)
        .await
        .unwrap();
    assert_eq!(embedding.vector, vec![1.0, 0.0]);
    assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    let mock = Mock::new(vec![error(400, "bad input")]);
    let url = start(mock.clone()).await;
    let generator = generator(url, 2);

    let err = generator
        .generate("nope", EmbeddingCategory::Chunk)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::Provider(ProviderError::Rejected { status: 400, .. })
        ),
        "unexpected error: {}",
        err
    );
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let mock = Mock::new(vec![error(503, "unavailable")]);
    let url = start(mock.clone()).await;
    let generator = generator(url, 2);

    let err = generator
        .generate("down", EmbeddingCategory::Summary)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Provider(ProviderError::Transient {
            status: Some(503),
            ..
        })
    ));
    assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn test_wrong_dimension_is_validation_error() {
    let mock = Mock::new(vec![ok(&[1.0, 2.0, 3.0], 1)]);
    let url = start(mock.clone()).await;
    let generator = generator(url, 2);

    let err = generator
        .generate("three dims", EmbeddingCategory::Chunk)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::DimensionMismatch {
            expected: 2,
            got: 3
        })
    ));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_malformed_body_is_not_retried() {
    let mock = Mock::new(vec![(200, json!({ "unexpected": true }))]);
    let url = start(mock.clone()).await;
    let generator = generator(url, 2);

    let err = generator
        .generate("garbage", EmbeddingCategory::Chunk)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Provider(ProviderError::InvalidResponse(_))
    ));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_blank_text_never_reaches_provider() {
    let mock = Mock::new(vec![ok(&[1.0, 0.0], 1)]);
    let url = start(mock.clone()).await;
    let generator = generator(url, 2);

    let err = generator
        .generate("  \n ", EmbeddingCategory::Chunk)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::EmptyText)));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    // Second request is rejected, the others succeed.
    let mock = Mock::new(vec![
        ok(&[1.0, 0.0], 2),
        error(400, "bad input"),
        ok(&[0.0, 1.0], 3),
    ]);
    let url = start(mock.clone()).await;
    let generator = generator(url, 2);

    let result = generator
        .generate_batch(&["a", "b", "c"], EmbeddingCategory::Chunk, true)
        .await;
    let ok_indices: Vec<usize> = result.successful.iter().map(|(i, _)| *i).collect();
    assert_eq!(ok_indices, vec![0, 2]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].0, 1);
    assert_eq!(result.total_tokens, 5);
}

#[tokio::test]
async fn test_create_provider_reads_key_from_named_env_var() {
    let mock = Mock::new(vec![ok(&[0.0, 2.0], 1)]);
    let url = start(mock.clone()).await;

    std::env::set_var("RECALL_TEST_PROVIDER_KEY", "env-key");
    let config = EmbeddingConfig {
        base_url: url,
        model: "test-embed".into(),
        dims: 2,
        api_key_env: "RECALL_TEST_PROVIDER_KEY".into(),
        ..EmbeddingConfig::default()
    };
    let provider = create_provider(&config).unwrap();
    let raw = provider.embed("key check").await.unwrap();
    assert_eq!(raw.vector, vec![0.0, 2.0]);
    assert_eq!(
        mock.auth.lock().unwrap().as_deref(),
        Some("Bearer env-key")
    );

    let missing = EmbeddingConfig {
        api_key_env: "RECALL_TEST_KEY_THAT_IS_NOT_SET".into(),
        ..EmbeddingConfig::default()
    };
    let err = create_provider(&missing).err().unwrap();
    assert!(err.to_string().contains("RECALL_TEST_KEY_THAT_IS_NOT_SET"));
}
