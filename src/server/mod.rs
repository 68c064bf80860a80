// Ask HTTP server
// Thin axum front over the RAG pipeline: POST /ask in, {"answer"} out.


use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::rag::RagPipeline;

/// The ask endpoint always listens here.
pub const ASK_PORT: u16 = 8000;

#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<RagPipeline>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.rag.answer(&request.query).await {
        Ok(answer) => Ok(Json(AskResponse { answer })),
        Err(error) => {
            error!("Error in /ask: {:#}", error);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Something went wrong".to_string(),
                }),
            ))
        }
    }
}

/// Build the ask router. Split from [`serve`] so tests can bind it to an
/// ephemeral port.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the ask endpoint until the process exits.
pub async fn serve(rag: RagPipeline) -> Result<()> {
    let state = Arc::new(AppState { rag: Arc::new(rag) });
    let app = build_router(state);

    let listener = TcpListener::bind(("0.0.0.0", ASK_PORT))
        .await
        .with_context(|| format!("Failed to bind port {ASK_PORT}"))?;

    info!("Ask endpoint live at http://localhost:{}/ask", ASK_PORT);

    axum::serve(listener, app)
        .await
        .context("Ask server terminated")?;

    Ok(())
}
