//! RAG 파이프라인 - 수집(ingest)과 질의(query)
//!
//! 수집: URL → 텍스트 추출 → 청킹 → 청크별 임베딩 → 벡터 저장소 upsert
//! 질의: 질문 임베딩 → top_k 검색 → 컨텍스트 조립 → 프롬프트 → 답변 생성
//!
//! 협력 서비스는 모두 트레이트 객체로 주입되므로 테스트에서 교체할 수 있습니다.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, RagResult};
use crate::generation::{GenerationProvider, GenerationRequest};
use crate::scraper::TextSource;

use super::chunker::{Chunk, ChunkConfig, Chunker, FixedSizeChunker};
use super::store::{content_hash, IngestLedger, NewIngestRecord};
use super::vector::{positional_ids, ChunkMetadata, VectorRecord, VectorStore};

/// 기본 검색 개수
pub const DEFAULT_TOP_K: usize = 3;

/// 검색 개수 상한
pub const MAX_TOP_K: usize = 100;

/// 기본 생성 온도
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// 컨텍스트 구분자
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// 답변 프롬프트 템플릿 (`{context}`, `{question}` 치환)
pub const PROMPT_TEMPLATE: &str = "You are a helpful assistant. Use ONLY the provided context to answer the question. Do NOT use external knowledge.\n\nContext:\n{context}\n\nQuestion: {question}\n\nAnswer:";

// ============================================================================
// Types
// ============================================================================

/// 질의 요청
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryRequest {
    /// 누락 시 빈 문자열 (검증 에러로 처리)
    #[serde(default)]
    pub question: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// 없으면 파이프라인 기본 온도 사용
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: DEFAULT_TOP_K,
            temperature: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// 질의 응답
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResponse {
    /// 입력 질문 그대로
    pub question: String,
    pub answer: String,
    /// 프롬프트에 넣은 컨텍스트 (검색 순서대로 "\n\n" 결합)
    pub context_used: String,
}

/// 검색된 청크
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub score: f32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// 검색 결과 (유사도 내림차순, 최대 top_k개)
pub type RetrievalResult = Vec<RetrievedChunk>;

/// 수집 결과 보고
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub url: String,
    pub chunks: Vec<Chunk>,
    /// 원장 버전 (원장 없으면 None)
    pub version: Option<i64>,
    /// 정리된 이전 항목 수
    pub pruned: usize,
    /// 변경 없음으로 임베딩을 건너뛰었는지
    pub cached: bool,
}

// ============================================================================
// RagPipeline
// ============================================================================

/// RAG 파이프라인
pub struct RagPipeline {
    source: Arc<dyn TextSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationProvider>,
    ledger: Option<IngestLedger>,
    namespace: String,
    temperature: f32,
}

impl RagPipeline {
    /// 협력 서비스로 생성 (원장 없음, 기본 namespace)
    pub fn new(
        source: Arc<dyn TextSource>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            source,
            embedder,
            store,
            generator,
            ledger: None,
            namespace: String::new(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// 수집 원장 연결
    pub fn with_ledger(mut self, ledger: IngestLedger, namespace: impl Into<String>) -> Self {
        self.ledger = Some(ledger);
        self.namespace = namespace.into();
        self
    }

    /// 기본 생성 온도 설정
    pub fn with_temperature(mut self, temperature: f32) -> RagResult<Self> {
        self.temperature = check_temperature(temperature)?;
        Ok(self)
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn ledger(&self) -> Option<&IngestLedger> {
        self.ledger.as_ref()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 협력 서비스 이름 요약 (로그/상태 표시용)
    pub fn describe(&self) -> String {
        format!(
            "source=web, embedder={} ({} dims), store={}, generator={}",
            self.embedder.name(),
            self.embedder.dimension(),
            self.store.name(),
            self.generator.name()
        )
    }

    // ========================================================================
    // Ingest
    // ========================================================================

    /// 페이지를 수집하여 벡터 저장소에 적재
    ///
    /// 청크 i는 ID `"i"`로 저장되며 같은 ID는 덮어씁니다.
    /// 원장이 있으면 같은 저장소 위치의 이전 기록을 기준으로 남은 `N..M` 항목을
    /// 삭제하고, URL/콘텐츠/설정이 같으면 (`force`가 아닐 때) 임베딩을 건너뜁니다.
    ///
    /// 원장 기록은 모든 upsert가 끝난 뒤에만 남습니다. 도중에 실패한 수집은
    /// 기록되지 않으므로 다음 수집은 캐시 없이 다시 적재하지만, 정리 범위는
    /// 마지막 *성공* 기록의 청크 수까지입니다. 실패한 수집이 그보다 많은 청크를
    /// 올렸다면 그 초과분 ID는 남습니다 (필요하면 namespace를 비우고 다시 수집).
    /// 원장이 없으면 정리도 하지 않습니다.
    pub async fn ingest(
        &self,
        url: &str,
        config: &ChunkConfig,
        force: bool,
    ) -> RagResult<IngestReport> {
        let document = self.source.extract(url).await?;
        let chunks = FixedSizeChunker::new(*config).chunk(&document.text);

        if chunks.is_empty() {
            return Err(RagError::validation(format!(
                "no visible text extracted from {}",
                url
            )));
        }

        let hash = content_hash(&document.text);
        let location = self.store.location();
        let previous = match &self.ledger {
            Some(ledger) => ledger.latest(&location, &self.namespace)?,
            None => None,
        };

        if let Some(prev) = previous.as_ref() {
            if !force && prev.matches(url, &hash, config) && prev.chunk_count == chunks.len() {
                tracing::info!(
                    "Page unchanged since version {}, skipping embedding: {}",
                    prev.version,
                    url
                );
                return Ok(IngestReport {
                    url: url.to_string(),
                    chunks,
                    version: Some(prev.version),
                    pruned: 0,
                    cached: true,
                });
            }
        }

        let version = match &self.ledger {
            Some(ledger) => Some(ledger.next_version()?),
            None => None,
        };

        tracing::info!(
            "Ingesting {} ({} chunks, size={}, overlap={})",
            url,
            chunks.len(),
            config.chunk_size(),
            config.chunk_overlap()
        );

        // 청크 순서대로 하나씩 임베딩 후 upsert
        for chunk in &chunks {
            let values = self.embedder.embed(&chunk.text).await?;
            let record = VectorRecord {
                id: chunk.id(),
                values,
                metadata: ChunkMetadata {
                    text: chunk.text.clone(),
                    source: Some(url.to_string()),
                    version,
                },
            };
            self.store.upsert(std::slice::from_ref(&record)).await?;
            tracing::debug!("Upserted chunk {} ({} chars)", record.id, chunk.text.chars().count());
        }

        let mut pruned = 0;
        if let Some(prev) = previous.as_ref() {
            if prev.chunk_count > chunks.len() {
                let stale = positional_ids(chunks.len(), prev.chunk_count);
                pruned = self.store.delete(&stale).await?;
                tracing::info!(
                    "Pruned {} stale entries left by version {}",
                    pruned,
                    prev.version
                );
            }
        }

        if let Some(ledger) = &self.ledger {
            ledger.record(&NewIngestRecord {
                version,
                store: location,
                namespace: self.namespace.clone(),
                url: url.to_string(),
                content_hash: hash,
                config: *config,
                chunk_count: chunks.len(),
            })?;
        }

        tracing::info!("Ingested {} chunks from {}", chunks.len(), url);

        Ok(IngestReport {
            url: url.to_string(),
            chunks,
            version,
            pruned,
            cached: false,
        })
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// 질문과 가장 유사한 청크 top_k개 (유사도 내림차순)
    pub async fn retrieve(&self, question: &str, top_k: usize) -> RagResult<RetrievalResult> {
        check_question(question)?;
        check_top_k(top_k)?;

        let vector = self.embedder.embed(question).await?;
        let matches = self.store.query(&vector, top_k, true).await?;

        if matches.is_empty() {
            return Err(RagError::NotFound);
        }

        matches
            .into_iter()
            .map(|m| -> RagResult<RetrievedChunk> {
                let metadata = m.metadata.ok_or_else(|| {
                    RagError::service("vector-store", format!("match {} has no metadata", m.id))
                })?;
                Ok(RetrievedChunk {
                    id: m.id,
                    score: m.score,
                    text: metadata.text,
                    source: metadata.source,
                })
            })
            .collect()
    }

    /// 질문에 답변 (검색 → 프롬프트 → 생성)
    pub async fn query(&self, request: &QueryRequest) -> RagResult<AnswerResponse> {
        let temperature = match request.temperature {
            Some(t) => check_temperature(t)?,
            None => self.temperature,
        };

        let retrieved = self.retrieve(&request.question, request.top_k).await?;
        let context_used = retrieved
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let prompt = build_prompt(&context_used, &request.question);
        let answer = self
            .generator
            .generate(GenerationRequest {
                prompt: &prompt,
                temperature,
            })
            .await?;

        tracing::info!(
            "Answered question with {} context chunks (temperature={})",
            retrieved.len(),
            temperature
        );

        Ok(AnswerResponse {
            question: request.question.clone(),
            answer,
            context_used,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 컨텍스트와 질문으로 프롬프트 생성
///
/// 템플릿을 한 번만 훑으며 자리표시자를 채웁니다.
/// 채워 넣은 값 안의 `{context}`/`{question}`은 그대로 남습니다.
pub fn build_prompt(context: &str, question: &str) -> String {
    let mut prompt =
        String::with_capacity(PROMPT_TEMPLATE.len() + context.len() + question.len());
    let mut rest = PROMPT_TEMPLATE;

    while let Some(start) = rest.find('{') {
        prompt.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            prompt.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            prompt.push_str(question);
            rest = after;
        } else {
            prompt.push('{');
            rest = &tail[1..];
        }
    }
    prompt.push_str(rest);
    prompt
}

/// 페이지 텍스트 추출 후 청킹만 수행 (임베딩 없음)
pub async fn chunk_page(
    source: &dyn TextSource,
    url: &str,
    config: &ChunkConfig,
) -> RagResult<Vec<Chunk>> {
    let document = source.extract(url).await?;
    Ok(FixedSizeChunker::new(*config).chunk(&document.text))
}

fn check_question(question: &str) -> RagResult<()> {
    if question.trim().is_empty() {
        return Err(RagError::validation("question must not be empty"));
    }
    Ok(())
}

fn check_top_k(top_k: usize) -> RagResult<()> {
    if top_k == 0 || top_k > MAX_TOP_K {
        return Err(RagError::validation(format!(
            "top_k must be between 1 and {}",
            MAX_TOP_K
        )));
    }
    Ok(())
}

fn check_temperature(temperature: f32) -> RagResult<f32> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(RagError::validation(format!(
            "temperature must be between 0.0 and 2.0 (got {})",
            temperature
        )));
    }
    Ok(temperature)
}

// ============================================================================
// Tests
// ============================================================================
