//! 에러 타입 - 파이프라인 실패 원인 구분
//!
//! 모든 협력 서비스(스크래퍼, 임베딩, 벡터 저장소, 생성 모델)는 `RagError`를
//! 반환합니다. HTTP/CLI 경계에서 원인별로 다르게 표시할 수 있습니다.

use thiserror::Error;

/// 파이프라인 결과 타입
pub type RagResult<T> = std::result::Result<T, RagError>;

/// 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 원본 페이지 가져오기 실패 (비정상 HTTP 상태 또는 네트워크 오류)
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        url: String,
        /// 응답을 받은 경우의 HTTP 상태 코드
        status: Option<u16>,
        message: String,
    },

    /// 잘못된 설정 (chunk_size/overlap, 누락된 자격 증명 등)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// 외부 서비스 호출 실패 (임베딩, 벡터 저장소, 생성 모델, 원장)
    #[error("{service} error: {message}")]
    Service {
        service: &'static str,
        message: String,
    },

    /// 검색 결과 없음
    #[error("No relevant chunks found for this query.")]
    NotFound,

    /// 요청 검증 실패
    #[error("{0}")]
    Validation(String),
}

impl RagError {
    /// 서비스 에러 생성
    pub fn service(service: &'static str, err: impl std::fmt::Display) -> Self {
        RagError::Service {
            service,
            message: err.to_string(),
        }
    }

    /// 설정 에러 생성
    pub fn config(message: impl Into<String>) -> Self {
        RagError::Config(message.into())
    }

    /// 검증 에러 생성
    pub fn validation(message: impl Into<String>) -> Self {
        RagError::Validation(message.into())
    }

    /// 짧은 분류 이름 (로그/CLI 표시용)
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Fetch { .. } => "fetch",
            RagError::Config(_) => "config",
            RagError::Service { .. } => "service",
            RagError::NotFound => "not_found",
            RagError::Validation(_) => "validation",
        }
    }
}
