//! 설정 모듈 - 기본값, 자격 증명, 서비스 조립
//!
//! 모든 설정은 clap 인자이며 환경변수로도 지정할 수 있습니다.
//! 자격 증명이 없으면 파이프라인 생성 시점에 바로 실패합니다.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::embedding::{
    model_dimension, EmbeddingProvider, OpenAiEmbedding, DEFAULT_DIMENSION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL,
};
use crate::error::{RagError, RagResult};
use crate::generation::{OpenAiChat, DEFAULT_CHAT_MODEL};
use crate::knowledge::{
    get_data_dir, IngestLedger, LanceVectorStore, MemoryVectorStore, PineconeVectorStore,
    RagPipeline, VectorStore, PINECONE_CONTROL_URL,
};
use crate::scraper::WebScraper;

/// 기본 Pinecone 인덱스 이름
pub const DEFAULT_PINECONE_INDEX: &str = "ragchatbot";

/// 기본 서버 바인드 주소
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// 페이지 요청 타임아웃
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Store Backend
// ============================================================================

/// 벡터 저장소 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Pinecone 호스팅 인덱스
    Pinecone,
    /// 로컬 LanceDB 테이블
    Lance,
    /// 프로세스 메모리 (재시작 시 사라짐)
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Pinecone => "pinecone",
            StoreBackend::Lance => "lance",
            StoreBackend::Memory => "memory",
        }
    }
}

// ============================================================================
// Service Arguments
// ============================================================================

/// 외부 서비스 연결 설정
#[derive(Debug, Clone, Args)]
pub struct ServiceArgs {
    /// OpenAI API 키
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI 호환 API 주소
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL, global = true)]
    pub openai_base_url: String,

    /// 답변 생성 모델
    #[arg(long, env = "PAGECHAT_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL, global = true)]
    pub chat_model: String,

    /// 임베딩 모델
    #[arg(long, env = "PAGECHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL, global = true)]
    pub embedding_model: String,

    /// 임베딩 차원 (미지정 시 모델에서 추론)
    #[arg(long, env = "PAGECHAT_EMBEDDING_DIMENSION", global = true)]
    pub embedding_dimension: Option<usize>,

    /// 벡터 저장소 백엔드
    #[arg(long, env = "PAGECHAT_STORE", value_enum, default_value_t = StoreBackend::Pinecone, global = true)]
    pub store: StoreBackend,

    /// Pinecone API 키
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true, global = true)]
    pub pinecone_api_key: Option<String>,

    /// Pinecone 인덱스 이름
    #[arg(long, env = "PINECONE_INDEX", default_value = DEFAULT_PINECONE_INDEX, global = true)]
    pub pinecone_index: String,

    /// Pinecone 인덱스 호스트 (지정 시 control plane 조회 생략)
    #[arg(long, env = "PINECONE_INDEX_HOST", global = true)]
    pub pinecone_host: Option<String>,

    /// 벡터 namespace (빈 문자열이면 기본)
    #[arg(long, env = "PAGECHAT_NAMESPACE", default_value = "", global = true)]
    pub namespace: String,

    /// 로컬 데이터 디렉토리
    #[arg(long, env = "PAGECHAT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,
}

impl ServiceArgs {
    /// 데이터 디렉토리 (미지정 시 기본 위치)
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(get_data_dir)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir().join("ledger.db")
    }

    pub fn lance_path(&self) -> PathBuf {
        self.data_dir().join("vectors.lance")
    }

    /// 임베딩 차원 결정: 명시값 → 모델 기본값 → 1536
    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
            .or_else(|| model_dimension(&self.embedding_model))
            .unwrap_or(DEFAULT_DIMENSION)
    }

    pub fn openai_key(&self) -> RagResult<&str> {
        require(self.openai_api_key.as_deref(), "OPENAI_API_KEY")
    }

    pub fn pinecone_key(&self) -> RagResult<&str> {
        require(self.pinecone_api_key.as_deref(), "PINECONE_API_KEY")
    }

    /// 필요한 자격 증명이 모두 있는지 확인
    pub fn check_credentials(&self) -> RagResult<()> {
        self.openai_key()?;
        if self.store == StoreBackend::Pinecone {
            self.pinecone_key()?;
        }
        Ok(())
    }

    /// 벡터 저장소 생성
    pub async fn build_store(&self) -> RagResult<Arc<dyn VectorStore>> {
        let store: Arc<dyn VectorStore> = match self.store {
            StoreBackend::Pinecone => {
                let key = self.pinecone_key()?;
                match self.pinecone_host.as_deref().filter(|h| !h.is_empty()) {
                    Some(host) => Arc::new(PineconeVectorStore::new(key, host, &self.namespace)?),
                    None => Arc::new(
                        PineconeVectorStore::connect(
                            key,
                            PINECONE_CONTROL_URL,
                            &self.pinecone_index,
                            &self.namespace,
                        )
                        .await?,
                    ),
                }
            }
            StoreBackend::Lance => Arc::new(
                LanceVectorStore::open(
                    &self.lance_path(),
                    &self.namespace,
                    self.embedding_dimension(),
                )
                .await?,
            ),
            StoreBackend::Memory => Arc::new(MemoryVectorStore::new()),
        };

        Ok(store)
    }

    /// 수집 원장 열기
    ///
    /// 파일 원장은 모든 백엔드가 함께 쓰며, 기록은 저장소 위치별로 구분됩니다.
    /// 메모리 저장소는 프로세스와 함께 사라지므로 원장도 메모리에 둡니다.
    pub fn open_ledger(&self) -> RagResult<IngestLedger> {
        match self.store {
            StoreBackend::Memory => IngestLedger::open_in_memory(),
            _ => IngestLedger::open(&self.ledger_path()),
        }
    }

    /// 전체 RAG 파이프라인 조립
    pub async fn build_pipeline(&self) -> RagResult<RagPipeline> {
        self.check_credentials()?;
        let openai_key = self.openai_key()?;

        let source = Arc::new(WebScraper::with_timeout(FETCH_TIMEOUT)?);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbedding::with_dimension(
            openai_key,
            &self.openai_base_url,
            &self.embedding_model,
            self.embedding_dimension(),
        )?);
        let generator = Arc::new(OpenAiChat::new(
            openai_key,
            &self.openai_base_url,
            &self.chat_model,
        )?);
        let store = self.build_store().await?;
        let ledger = self.open_ledger()?;

        let pipeline = RagPipeline::new(source, embedder, store, generator)
            .with_ledger(ledger, self.namespace.clone());

        tracing::info!(
            "Pipeline ready ({}, namespace='{}')",
            pipeline.describe(),
            self.namespace
        );

        Ok(pipeline)
    }
}

/// 비어 있지 않은 자격 증명 값 확인
fn require<'a>(value: Option<&'a str>, var: &str) -> RagResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RagError::config(format!(
            "{} is not set (export {}=...)",
            var, var
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        service: ServiceArgs,
    }

    fn parse(args: &[&str]) -> ServiceArgs {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().service
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--store", "memory"]);
        assert_eq!(args.store, StoreBackend::Memory);
        assert_eq!(args.embedding_dimension(), 1536);
        assert!(args.ledger_path().ends_with("ledger.db"));
    }

    #[test]
    fn test_explicit_dimension_wins() {
        let args = parse(&["--embedding-dimension", "64"]);
        assert_eq!(args.embedding_dimension(), 64);
    }

    #[test]
    fn test_missing_openai_key_fails_fast() {
        let args = parse(&["--openai-api-key", " ", "--store", "memory"]);
        let err = args.check_credentials().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_pinecone_requires_key() {
        let args = parse(&[
            "--openai-api-key",
            "sk-test",
            "--store",
            "pinecone",
            "--pinecone-api-key",
            "",
        ]);
        let err = args.check_credentials().unwrap_err();
        assert!(err.to_string().contains("PINECONE_API_KEY"));
    }

    #[tokio::test]
    async fn test_build_memory_pipeline() {
        let args = parse(&["--openai-api-key", "sk-test", "--store", "memory"]);
        let pipeline = args.build_pipeline().await.unwrap();
        assert_eq!(pipeline.store().name(), "memory");
        assert!(pipeline.ledger().unwrap().db_path().is_none());
    }

    #[tokio::test]
    async fn test_build_pinecone_with_host() {
        let tmp = TempDir::new().unwrap();
        let data_dir = tmp.path().to_str().unwrap();
        let args = parse(&[
            "--openai-api-key",
            "sk-test",
            "--pinecone-api-key",
            "pc-test",
            "--pinecone-host",
            "ragchatbot-abc.svc.pinecone.io",
            "--namespace",
            "demo",
            "--data-dir",
            data_dir,
        ]);

        let pipeline = args.build_pipeline().await.unwrap();
        assert_eq!(pipeline.store().name(), "pinecone");
        assert_eq!(
            pipeline.store().location(),
            "pinecone:https://ragchatbot-abc.svc.pinecone.io"
        );
        assert_eq!(pipeline.namespace(), "demo");
        assert!(tmp.path().join("ledger.db").exists());
    }

    #[tokio::test]
    async fn test_build_lance_store() {
        let tmp = TempDir::new().unwrap();
        let args = parse(&[
            "--store",
            "lance",
            "--embedding-dimension",
            "8",
            "--data-dir",
            tmp.path().to_str().unwrap(),
        ]);

        let store = args.build_store().await.unwrap();
        assert_eq!(store.name(), "lancedb");
        assert!(store.location().starts_with("lancedb:"));
        assert!(store.location().ends_with("vectors.lance#chunks"));
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
