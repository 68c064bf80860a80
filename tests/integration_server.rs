#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Drives the ask HTTP server end to end: bind the router to an ephemeral
// port and exercise it with a real HTTP client against mock collaborators.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use docs_rag::config::{OpenAiConfig, PineconeConfig, RetryConfig};
use docs_rag::openai::OpenAiClient;
use docs_rag::pinecone::PineconeClient;
use docs_rag::rag::RagPipeline;
use docs_rag::server::{AppState, build_router};

async fn spawn_ask_server(openai_server: &MockServer, pinecone_server: &MockServer) -> String {
    let retry = RetryConfig {
        attempts: 1,
        base_delay_ms: 10,
    };
    let openai = OpenAiClient::new(
        &OpenAiConfig {
            api_key: "sk-test".to_string(),
            base_url: format!("{}/v1", openai_server.uri()),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
        },
        retry.clone(),
    )
    .expect("openai client should build");
    let pinecone = PineconeClient::new(
        &PineconeConfig {
            api_key: "pc-test".to_string(),
            index_host: pinecone_server.uri(),
        },
        retry,
    )
    .expect("pinecone client should build");

    let state = Arc::new(AppState {
        rag: Arc::new(RagPipeline::new(openai, pinecone)),
    });
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("can bind ephemeral port");
    let address = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server runs");
    });

    format!("http://{address}")
}

async fn mount_happy_path(openai_server: &MockServer, pinecone_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.1, 0.9], "index": 0}]
        })))
        .mount(openai_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                {"id": "auth-a", "score": 0.9, "metadata": {"text": "tokens expire hourly"}}
            ]
        })))
        .mount(pinecone_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hourly."}}]
        })))
        .mount(openai_server)
        .await;
}

#[tokio::test]
async fn ask_returns_answer() {
    let openai_server = MockServer::start().await;
    let pinecone_server = MockServer::start().await;
    mount_happy_path(&openai_server, &pinecone_server).await;

    let base = spawn_ask_server(&openai_server, &pinecone_server).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/ask"))
        .json(&json!({"query": "when do tokens expire?"}))
        .send()
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("response is JSON");
    assert_eq!(body, json!({"answer": "Hourly."}));
}

#[tokio::test]
async fn collaborator_failure_maps_to_generic_500() {
    let openai_server = MockServer::start().await;
    let pinecone_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&openai_server)
        .await;

    let base = spawn_ask_server(&openai_server, &pinecone_server).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/ask"))
        .json(&json!({"query": "anything"}))
        .send()
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.expect("response is JSON");
    assert_eq!(body, json!({"error": "Something went wrong"}));
}

#[tokio::test]
async fn empty_query_passes_through_to_the_embedding_call() {
    // Empty queries are not validated locally; the embedding API rejects
    // them and the caller sees the generic failure.
    let openai_server = MockServer::start().await;
    let pinecone_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "input may not be empty"}
        })))
        .expect(1)
        .mount(&openai_server)
        .await;

    let base = spawn_ask_server(&openai_server, &pinecone_server).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/ask"))
        .json(&json!({"query": ""}))
        .send()
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn health_endpoint_responds() {
    let openai_server = MockServer::start().await;
    let pinecone_server = MockServer::start().await;

    let base = spawn_ask_server(&openai_server, &pinecone_server).await;

    let response = reqwest::get(format!("{base}/health"))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("response is JSON");
    assert_eq!(body, json!({"status": "ok"}));
}
