//! Knowledge 모듈 - 청킹, 벡터 저장소, 수집 원장, RAG 파이프라인
//!
//! - Chunker: 고정 길이 오버랩 텍스트 분할
//! - VectorStore: Pinecone / LanceDB / 메모리 백엔드
//! - IngestLedger: SQLite 수집 기록 (오래된 항목 정리, 재수집 생략)
//! - RagPipeline: ingest / retrieve / query

mod chunker;
mod lance;
mod memory;
mod pinecone;
mod pipeline;
mod store;
mod vector;

// Re-exports
pub use chunker::{
    Chunk, ChunkConfig, Chunker, FixedSizeChunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
pub use lance::LanceVectorStore;
pub use memory::MemoryVectorStore;
pub use pinecone::{PineconeVectorStore, PINECONE_CONTROL_URL};
pub use pipeline::{
    build_prompt, chunk_page, AnswerResponse, IngestReport, QueryRequest, RagPipeline,
    RetrievalResult, RetrievedChunk, CONTEXT_SEPARATOR, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
    MAX_TOP_K, PROMPT_TEMPLATE,
};
pub use store::{
    content_hash, get_data_dir, IngestLedger, IngestRecord, NewIngestRecord,
};
pub use vector::{
    cosine_similarity, positional_ids, ChunkMetadata, VectorMatch, VectorRecord, VectorStore,
};
