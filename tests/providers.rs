//! HTTP provider behaviour against a local stub server.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use docrag::config::{EmbeddingConfig, GenerationConfig, LoaderConfig};
use docrag::embedding::{EmbeddingProvider, HuggingFaceProvider};
use docrag::error::{kind_of, RagError};
use docrag::generation::{GenerationProvider, HuggingFaceGenerator};
use docrag::loader;
use docrag::models::{ExportMode, SourceFormat};

async fn hf_generate(Json(body): Json<Value>) -> impl IntoResponse {
    let prompt = body["inputs"].as_str().unwrap_or_default();
    if body["parameters"]["return_full_text"] != json!(false) {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "full text requested"})));
    }
    let answer = if prompt.contains("capital of France") {
        " Paris."
    } else {
        " No idea."
    };
    (StatusCode::OK, Json(json!([{ "generated_text": answer }])))
}

async fn broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "model crashed")
}

async fn slow() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!([{ "generated_text": "too late" }]))
}

/// Token-level output: two tokens per input, to be mean-pooled.
async fn hf_features(Json(body): Json<Value>) -> impl IntoResponse {
    let n = body["inputs"].as_array().map_or(0, Vec::len);
    let per_input = json!([[1.0, 0.0, 2.0], [3.0, 2.0, 0.0]]);
    Json(Value::Array(vec![per_input; n]))
}

async fn markdown_doc() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        "# Remote\n\nFetched over HTTP.\n",
    )
}

async fn oversized_doc() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/markdown")],
        "lorem ipsum ".repeat(1024),
    )
}

async fn spawn_stub() -> SocketAddr {
    let app = Router::new()
        .route("/models/tiny-llm", post(hf_generate))
        .route("/models/broken-llm", post(broken))
        .route("/models/slow-llm", post(slow))
        .route("/models/tiny-embed/pipeline/feature-extraction", post(hf_features))
        .route("/models/broken-embed/pipeline/feature-extraction", post(broken))
        .route("/docs/notes", get(markdown_doc))
        .route("/docs/huge.md", get(oversized_doc));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn generation_config(addr: SocketAddr, model: &str, timeout_secs: u64) -> GenerationConfig {
    GenerationConfig {
        provider: "huggingface".into(),
        model: model.into(),
        url: Some(format!("http://{}", addr)),
        api_key_env: Some("DOCRAG_TEST_UNSET_TOKEN".into()),
        timeout_secs,
        ..Default::default()
    }
}

fn embedding_config(addr: SocketAddr, model: &str) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: "huggingface".into(),
        model: Some(model.into()),
        url: Some(format!("http://{}", addr)),
        api_key_env: Some("DOCRAG_TEST_UNSET_TOKEN".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn hf_generation_returns_generated_text() {
    let addr = spawn_stub().await;
    let generator = HuggingFaceGenerator::new(&generation_config(addr, "tiny-llm", 5)).unwrap();

    let out = generator
        .generate("Query: What is the capital of France?\nAnswer: ")
        .await
        .unwrap();
    assert_eq!(out, " Paris.");
    assert_eq!(generator.model_name(), "tiny-llm");
}

#[tokio::test]
async fn hf_generation_server_error_is_generation_failure() {
    let addr = spawn_stub().await;
    let generator = HuggingFaceGenerator::new(&generation_config(addr, "broken-llm", 5)).unwrap();

    let err = generator.generate("hello").await.unwrap_err();
    assert!(matches!(kind_of(&err), Some(RagError::Generation(_))));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn hf_generation_timeout_is_generation_failure() {
    let addr = spawn_stub().await;
    let generator = HuggingFaceGenerator::new(&generation_config(addr, "slow-llm", 1)).unwrap();

    let err = generator.generate("hello").await.unwrap_err();
    match kind_of(&err) {
        Some(RagError::Generation(msg)) => assert!(msg.contains("timed out"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn hf_feature_extraction_is_mean_pooled() {
    let addr = spawn_stub().await;
    let provider = HuggingFaceProvider::new(&embedding_config(addr, "tiny-embed")).unwrap();

    let vectors = provider
        .embed(&["one".to_string(), "two".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![2.0, 1.0, 1.0]; 2]);
}

#[tokio::test]
async fn hf_embedding_server_error_is_embedding_failure() {
    let addr = spawn_stub().await;
    let provider = HuggingFaceProvider::new(&embedding_config(addr, "broken-embed")).unwrap();

    let err = provider.embed(&["x".to_string()]).await.unwrap_err();
    assert!(matches!(kind_of(&err), Some(RagError::Embedding(_))));
}

#[tokio::test]
async fn loader_fetches_uri_by_content_type() {
    let addr = spawn_stub().await;
    let uri = format!("http://{}/docs/notes", addr);

    let docs = loader::load(&uri, ExportMode::Structured, &LoaderConfig::default())
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].format, SourceFormat::Markdown);
    assert_eq!(docs[0].file_name, "notes");
    assert_eq!(docs[0].source, uri);
    assert_eq!(docs[0].content, "# Remote\n\nFetched over HTTP.\n");
    assert_eq!(docs[0].metadata["title"], "Remote");
}

#[tokio::test]
async fn loader_reports_missing_uri_as_unreachable() {
    let addr = spawn_stub().await;
    let uri = format!("http://{}/docs/missing.pdf", addr);

    let err = loader::load(&uri, ExportMode::Structured, &LoaderConfig::default())
        .await
        .unwrap_err();
    match kind_of(&err) {
        Some(RagError::UnreachableSource { source_ref, reason }) => {
            assert_eq!(source_ref, &uri);
            assert!(reason.contains("404"), "{reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn loader_rejects_uri_over_size_limit() {
    let addr = spawn_stub().await;
    let uri = format!("http://{}/docs/huge.md", addr);
    let config = LoaderConfig {
        max_file_bytes: 1000,
        ..Default::default()
    };

    let err = loader::load(&uri, ExportMode::Structured, &config)
        .await
        .unwrap_err();
    match kind_of(&err) {
        Some(RagError::Conversion { source_ref, reason }) => {
            assert_eq!(source_ref, &uri);
            assert!(reason.contains("limit is 1000"), "{reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
