//! 임베딩 모듈 - OpenAI 호환 API를 통한 텍스트 벡터화
//!
//! 텍스트를 고정 차원 벡터로 변환합니다. 실패는 재시도 없이 그대로
//! `RagError::Service`로 전파됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OpenAiEmbedding::new(api_key, DEFAULT_OPENAI_BASE_URL, DEFAULT_EMBEDDING_MODEL)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, RagResult};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>>;

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// 기본 OpenAI API 주소
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// 기본 임베딩 모델
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// 기본 임베딩 차원 (text-embedding-ada-002)
pub const DEFAULT_DIMENSION: usize = 1536;

/// 서비스 이름 (에러 표시용)
const SERVICE: &str = "openai-embeddings";

/// 모델별 출력 차원
///
/// ref: https://platform.openai.com/docs/guides/embeddings
pub fn model_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-ada-002" | "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// OpenAI 임베딩 구현체
#[derive(Debug, Clone)]
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedding {
    /// 새 OpenAI 임베딩 클라이언트 생성
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API 키
    /// * `base_url` - OpenAI 호환 엔드포인트 (예: `https://api.openai.com/v1`)
    /// * `model` - 임베딩 모델 이름
    pub fn new(api_key: &str, base_url: &str, model: &str) -> RagResult<Self> {
        let dimension = model_dimension(model).unwrap_or(DEFAULT_DIMENSION);
        Self::with_dimension(api_key, base_url, model, dimension)
    }

    /// 차원을 지정하여 생성 (알 수 없는 모델용)
    pub fn with_dimension(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimension: usize,
    ) -> RagResult<Self> {
        if api_key.trim().is_empty() {
            return Err(RagError::config("missing OpenAI API key"));
        }
        if model.trim().is_empty() {
            return Err(RagError::config("missing embedding model name"));
        }
        if dimension == 0 {
            return Err(RagError::config("embedding dimension must be positive"));
        }

        let client = build_openai_client(api_key, Duration::from_secs(30))?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            dimension,
        })
    }
}

/// OpenAI 인증 헤더가 설정된 HTTP 클라이언트 생성
pub(crate) fn build_openai_client(api_key: &str, timeout: Duration) -> RagResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth).map_err(|_| RagError::config("invalid OpenAI API key"))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| RagError::config(format!("failed to build OpenAI HTTP client: {}", e)))
}

/// OpenAI 임베딩 요청 본문
/// ref: https://platform.openai.com/docs/api-reference/embeddings/create
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

/// OpenAI 임베딩 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.model,
            input: [text],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::service(SERVICE, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::service(SERVICE, format!("{}: {}", status, body)));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::service(SERVICE, format!("invalid response: {}", e)))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::service(SERVICE, "response contained no embedding"))?;

        if embedding.len() != self.dimension {
            return Err(RagError::service(
                SERVICE,
                format!(
                    "expected {} dimensions, got {}",
                    self.dimension,
                    embedding.len()
                ),
            ));
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
