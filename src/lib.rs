//! pagechat-rag - 웹페이지 RAG 데모
//!
//! 웹페이지 하나를 스크래핑하여 고정 길이 청크로 나누고,
//! 청크 임베딩을 벡터 저장소에 적재한 뒤
//! 질문과 가장 유사한 청크를 컨텍스트로 LLM 답변을 생성합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod scraper;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use config::{ServiceArgs, StoreBackend};
pub use embedding::{EmbeddingProvider, OpenAiEmbedding};
pub use error::{RagError, RagResult};
pub use generation::{GenerationProvider, GenerationRequest, OpenAiChat};
pub use knowledge::{
    AnswerResponse, Chunk, ChunkConfig, Chunker, FixedSizeChunker, IngestLedger, IngestReport,
    LanceVectorStore, MemoryVectorStore, PineconeVectorStore, QueryRequest, RagPipeline,
    RetrievedChunk, VectorStore,
};
pub use crate::scraper::{clean_html, Document, TextSource, WebScraper};
