//! HTTP 서버 - 질의 API와 웹 UI
//!
//! - `POST /query`: 질문 → 답변 + 사용된 컨텍스트
//! - `GET /chunks`: 서버 시작 시 수집한 청크 목록
//! - `GET /healthz`: 상태 확인
//! - `GET /`: 대화형 페이지

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::RagError;
use crate::knowledge::{AnswerResponse, Chunk, QueryRequest, RagPipeline};

const INDEX_HTML: &str = include_str!("index.html");

// ============================================================================
// State
// ============================================================================

/// 핸들러 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    /// 시작 시 수집한 청크 (없으면 빈 목록)
    pub chunks: Arc<Vec<Chunk>>,
}

impl AppState {
    pub fn new(pipeline: RagPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            chunks: Arc::new(Vec::new()),
        }
    }

    pub fn with_chunks(mut self, chunks: Vec<Chunk>) -> Self {
        self.chunks = Arc::new(chunks);
        self
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

impl RagError {
    /// HTTP 상태 코드
    pub fn status_code(&self) -> StatusCode {
        match self {
            RagError::Validation(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound => StatusCode::NOT_FOUND,
            RagError::Fetch { .. } | RagError::Service { .. } => StatusCode::BAD_GATEWAY,
            RagError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", self.kind(), self);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.kind(), self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// 라우터 생성
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/query", post(query_handler))
        .route("/chunks", get(chunks_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// 서버 실행 (종료 시까지 대기)
pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Listening on http://{}", addr);
    println!("[OK] 서버 시작: http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("server error")
}

// ============================================================================
// Handlers
// ============================================================================

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn chunks_handler(State(state): State<AppState>) -> Json<Vec<Chunk>> {
    Json(state.chunks.as_ref().clone())
}

async fn query_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<Json<AnswerResponse>, RagError> {
    let Json(request) = payload.map_err(|e| RagError::validation(e.body_text()))?;
    let response = state.pipeline.query(&request).await?;
    Ok(Json(response))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{ChunkConfig, MemoryVectorStore};
    use crate::test_support::{
        spawn_stub, EchoGenerator, FailingEmbedding, HashEmbedding, StaticSource,
    };
    use serde_json::Value;

    const URL: &str = "https://example.test/a";

    fn pipeline(text: &str) -> RagPipeline {
        RagPipeline::new(
            Arc::new(StaticSource::with_page(URL, text)),
            Arc::new(HashEmbedding::new(16)),
            Arc::new(MemoryVectorStore::new()),
            Arc::new(EchoGenerator::default()),
        )
    }

    async fn ingested_state(text: &str) -> AppState {
        let pipeline = pipeline(text);
        let report = pipeline
            .ingest(URL, &ChunkConfig::default(), false)
            .await
            .unwrap();
        AppState::new(pipeline).with_chunks(report.chunks)
    }

    async fn post_query(base: &str, body: Value) -> (StatusCode, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}/query", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(RagError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(RagError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            RagError::service("openai-chat", "down").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RagError::config("bad").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_query_success() {
        let state = ingested_state("Rust is a systems programming language.").await;
        let base = spawn_stub(router(state)).await;

        let (status, body) = post_query(
            &base,
            json!({ "question": "What is Rust?", "top_k": 2, "temperature": 0.5 }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["question"], "What is Rust?");
        assert_eq!(body["context_used"], "Rust is a systems programming language.");
        assert!(!body["answer"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_empty_question_is_400() {
        let state = ingested_state("some text").await;
        let base = spawn_stub(router(state)).await;

        let (status, body) = post_query(&base, json!({ "question": "" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "question must not be empty");

        let (status, _) = post_query(&base, json!({ "top_k": 3 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_malformed_body_is_400() {
        let base = spawn_stub(router(AppState::new(pipeline("x")))).await;
        let response = reqwest::Client::new()
            .post(format!("{}/query", base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_query_empty_store_is_404() {
        let base = spawn_stub(router(AppState::new(pipeline("x")))).await;

        let (status, body) = post_query(&base, json!({ "question": "anything?" })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "No relevant chunks found for this query.");
    }

    #[tokio::test]
    async fn test_service_failure_is_502() {
        let pipeline = RagPipeline::new(
            Arc::new(StaticSource::default()),
            Arc::new(FailingEmbedding),
            Arc::new(MemoryVectorStore::new()),
            Arc::new(EchoGenerator::default()),
        );
        let base = spawn_stub(router(AppState::new(pipeline))).await;

        let (status, body) = post_query(&base, json!({ "question": "q" })).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["detail"].as_str().unwrap().contains("openai-embeddings"));
    }

    #[tokio::test]
    async fn test_chunks_and_index() {
        let text = "a".repeat(600);
        let state = ingested_state(&text).await;
        let base = spawn_stub(router(state)).await;
        let client = reqwest::Client::new();

        let chunks: Vec<Value> = client
            .get(format!("{}/chunks", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0]["index"], 0);

        let page = client.get(&base).send().await.unwrap().text().await.unwrap();
        assert!(page.contains("id=\"question\""));
        assert!(page.contains("id=\"top_k\" min=\"1\" max=\"5\""));

        let health = client
            .get(format!("{}/healthz", base))
            .send()
            .await
            .unwrap();
        assert!(health.status().is_success());
    }
}
