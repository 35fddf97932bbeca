//! Vector Store - 벡터 저장소 트레이트 및 유틸리티
//!
//! (id, vector, metadata) 레코드를 저장하고 최근접 이웃 질의에 답합니다.
//! 메타데이터에는 항상 청크 원문이 담긴 `text` 키가 있어야 합니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RagResult;

// ============================================================================
// Types
// ============================================================================

/// 청크 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// 청크 텍스트
    pub text: String,
    /// 원본 URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// 수집 버전 (원장 ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl ChunkMetadata {
    /// 텍스트만 있는 메타데이터
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
            version: None,
        }
    }
}

/// 벡터 레코드 (저장용)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// 레코드 ID (청크 위치 인덱스 문자열)
    pub id: String,
    /// 임베딩 벡터
    pub values: Vec<f32>,
    /// 메타데이터
    pub metadata: ChunkMetadata,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    /// 레코드 ID
    pub id: String,
    /// 유사도 스코어 (높을수록 유사)
    pub score: f32,
    /// 메타데이터 (`include_metadata`가 false면 None)
    pub metadata: Option<ChunkMetadata>,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// `query`는 코사인 유사도 내림차순으로 최대 `top_k`개를 반환합니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 레코드 삽입 또는 덮어쓰기 (같은 ID)
    async fn upsert(&self, records: &[VectorRecord]) -> RagResult<usize>;

    /// 최근접 이웃 검색
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> RagResult<Vec<VectorMatch>>;

    /// ID로 레코드 삭제
    async fn delete(&self, ids: &[String]) -> RagResult<usize>;

    /// 레코드 개수 조회
    async fn count(&self) -> RagResult<usize>;

    /// 백엔드 이름
    fn name(&self) -> &str;

    /// 저장 위치 식별자 (수집 원장 키)
    ///
    /// 같은 값이면 같은 레코드 집합을 가리켜야 합니다.
    fn location(&self) -> String;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도를 계산합니다.
/// 결과는 -1.0 ~ 1.0 범위이며, 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 위치 인덱스 범위의 ID 목록 (`start..end`)
pub fn positional_ids(start: usize, end: usize) -> Vec<String> {
    (start..end).map(|i| i.to_string()).collect()
}

// ============================================================================
// Tests
// ============================================================================
