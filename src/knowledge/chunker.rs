//! Text Chunking Module
//!
//! 고정 길이 슬라이딩 윈도우로 텍스트를 분할합니다.
//! 길이는 바이트가 아닌 문자(char) 단위입니다.

use serde::Serialize;

use crate::error::{RagError, RagResult};

/// 기본 청크 크기 (문자 수)
pub const DEFAULT_CHUNK_SIZE: usize = 250;

/// 기본 오버랩 크기 (문자 수)
pub const DEFAULT_CHUNK_OVERLAP: usize = 10;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
///
/// `chunk_overlap < chunk_size`가 항상 보장됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// 설정 생성 (검증 포함)
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> RagResult<Self> {
        if chunk_size == 0 {
            return Err(RagError::config("chunk_size must be positive"));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// 윈도우 이동 거리
    pub fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// 청크
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// 순서 인덱스 (0-based)
    pub index: usize,
    /// 청크 텍스트
    pub text: String,
}

impl Chunk {
    /// 벡터 저장소 ID (위치 인덱스 문자열)
    pub fn id(&self) -> String {
        self.index.to_string()
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<Chunk>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// FixedSizeChunker
// ============================================================================

/// 고정 길이 오버랩 청커
///
/// 왼쪽부터 `chunk_size` 길이의 윈도우를 자르고,
/// 매번 `chunk_size - chunk_overlap`만큼 이동합니다.
/// 마지막 윈도우는 더 짧을 수 있습니다 (패딩 없음).
#[derive(Debug, Clone, Default)]
pub struct FixedSizeChunker {
    config: ChunkConfig,
}

impl FixedSizeChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 크기/오버랩으로 생성
    pub fn with_sizes(chunk_size: usize, chunk_overlap: usize) -> RagResult<Self> {
        Ok(Self::new(ChunkConfig::new(chunk_size, chunk_overlap)?))
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return vec![];
        }

        // 문자 경계 바이트 오프셋 (끝 위치 포함)
        let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        bounds.push(text.len());
        let char_count = bounds.len() - 1;

        if char_count <= self.config.chunk_size {
            return vec![Chunk {
                index: 0,
                text: text.to_string(),
            }];
        }

        let step = self.config.step();
        let mut chunks = Vec::with_capacity(char_count / step + 1);
        let mut start = 0;

        loop {
            let end = (start + self.config.chunk_size).min(char_count);
            chunks.push(Chunk {
                index: chunks.len(),
                text: text[bounds[start]..bounds[end]].to_string(),
            });

            if end >= char_count {
                break;
            }

            start += step;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "FixedSizeChunker"
    }
}

// ============================================================================
// Tests
// ============================================================================
