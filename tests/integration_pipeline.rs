#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end ingestion and retrieval against mock collaborators: a document
// is chunked, embedded, and upserted, then a query is answered from the
// stored chunks.

use std::io::Write;

use serde_json::{Value, json};
use tempfile::NamedTempFile;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docs_rag::config::{IngestConfig, OpenAiConfig, PineconeConfig, RetryConfig};
use docs_rag::ingest::{Ingestor, vector_id};
use docs_rag::openai::OpenAiClient;
use docs_rag::pinecone::{NAMESPACE, PineconeClient};
use docs_rag::rag::RagPipeline;

fn retry() -> RetryConfig {
    RetryConfig {
        attempts: 1,
        base_delay_ms: 10,
    }
}

fn openai_client(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new(
        &OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: format!("{}/v1", server.uri()),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
        },
        retry(),
    )
    .expect("openai client should build")
}

fn pinecone_client(server: &MockServer) -> PineconeClient {
    PineconeClient::new(
        &PineconeConfig {
            api_key: "pc-test".to_string(),
            index_host: server.uri(),
        },
        retry(),
    )
    .expect("pinecone client should build")
}

/// A 1200-character document that chunks to exactly three pieces with the
/// default 500-character bound: twelve 99-char lines, four units per chunk.
fn twelve_hundred_char_document() -> String {
    let lines: Vec<String> = (0..12)
        .map(|index| {
            // 11 newlines join the lines, so the last line gets one extra
            // char to land exactly on 1200.
            let width = if index == 11 { 100 } else { 99 };
            let mut line = format!("line {index:02} ");
            while line.len() < width {
                line.push('x');
            }
            line
        })
        .collect();
    lines.join("\n")
}

#[tokio::test]
async fn ingest_then_answer_round_trip() {
    let openai_server = MockServer::start().await;
    let pinecone_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.25, 0.5, 0.75], "index": 0}]
        })))
        .expect(4) // 3 chunks + 1 query
        .mount(&openai_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_partial_json(json!({"namespace": NAMESPACE})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": 3})))
        .expect(1)
        .mount(&pinecone_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({
            "namespace": NAMESPACE,
            "topK": 3,
            "includeMetadata": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                {"id": "auth-a", "score": 0.9, "metadata": {"text": "x"}},
                {"id": "auth-b", "score": 0.8, "metadata": {"text": "y"}},
                {"id": "auth-c", "score": 0.7, "metadata": {"text": "z"}}
            ]
        })))
        .expect(1)
        .mount(&pinecone_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Context:\\nx\\ny\\nz"))
        .and(body_string_contains("Q: what issues tokens?"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "The auth service."}}]
        })))
        .expect(1)
        .mount(&openai_server)
        .await;

    let document = twelve_hundred_char_document();
    assert_eq!(document.len(), 1200);

    let mut file = NamedTempFile::new().expect("can create temp file");
    file.write_all(document.as_bytes()).expect("can write document");

    let ingestor = Ingestor::new(
        openai_client(&openai_server),
        pinecone_client(&pinecone_server),
        IngestConfig::default(),
    );
    let report = ingestor
        .ingest_file(file.path())
        .await
        .expect("ingestion should succeed");

    assert_eq!(report.chunks, 3);
    assert_eq!(report.upserted, 3);

    // Every stored vector carries a unique deterministic id and its chunk
    // text as metadata.
    let upsert_body: Value = pinecone_server
        .received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .find(|request| request.url.path() == "/vectors/upsert")
        .map(|request| serde_json::from_slice(&request.body).expect("upsert body is JSON"))
        .expect("one upsert request");
    let vectors = upsert_body["vectors"].as_array().expect("vectors array");
    assert_eq!(vectors.len(), 3);
    let mut seen_ids = std::collections::HashSet::new();
    for (index, vector) in vectors.iter().enumerate() {
        let id = vector["id"].as_str().expect("id string");
        let text = vector["metadata"]["text"].as_str().expect("metadata text");
        assert_eq!(id, vector_id(NAMESPACE, index, text));
        assert!(seen_ids.insert(id.to_string()));
        assert!(text.len() <= 500);
    }

    // A query is answered from a context of at most TOP_K stored chunks.
    let pipeline = RagPipeline::new(
        openai_client(&openai_server),
        pinecone_client(&pinecone_server),
    );
    let answer = pipeline
        .answer("what issues tokens?")
        .await
        .expect("answer should succeed");

    assert_eq!(answer, "The auth service.");
}

#[tokio::test]
async fn retrieval_context_joins_match_texts() {
    let openai_server = MockServer::start().await;
    let pinecone_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [1.0, 0.0], "index": 0}]
        })))
        .mount(&openai_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                {"id": "auth-a", "score": 0.9, "metadata": {"text": "x"}},
                {"id": "auth-b", "score": 0.8, "metadata": {"text": "y"}},
                {"id": "auth-c", "score": 0.7, "metadata": {"text": "z"}}
            ]
        })))
        .mount(&pinecone_server)
        .await;

    let pipeline = RagPipeline::new(
        openai_client(&openai_server),
        pinecone_client(&pinecone_server),
    );
    let context = pipeline
        .retrieve_context("anything")
        .await
        .expect("retrieval should succeed");

    assert_eq!(context, "x\ny\nz");
}

#[tokio::test]
async fn ingestion_failure_aborts_the_run() {
    let openai_server = MockServer::start().await;
    let pinecone_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&openai_server)
        .await;

    let ingestor = Ingestor::new(
        openai_client(&openai_server),
        pinecone_client(&pinecone_server),
        IngestConfig::default(),
    );
    let error = ingestor
        .ingest_text("a short document")
        .await
        .expect_err("ingestion should fail");

    assert!(error.to_string().contains("Failed to generate chunk embeddings"));
    // Nothing was upserted after the failure.
    assert!(
        pinecone_server
            .received_requests()
            .await
            .expect("request recording enabled")
            .is_empty()
    );
}
