//! 테스트용 가짜 협력 서비스와 로컬 HTTP 스텁 서버

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::Router;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, RagResult};
use crate::generation::{GenerationProvider, GenerationRequest};
use crate::scraper::{Document, TextSource};

/// 라우터를 127.0.0.1 임의 포트에 띄우고 base URL 반환
pub(crate) async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

/// 고정 텍스트를 돌려주는 소스
#[derive(Default)]
pub(crate) struct StaticSource {
    pages: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub(crate) fn with_page(url: &str, text: &str) -> Self {
        let source = Self::default();
        source.set_page(url, text);
        source
    }

    pub(crate) fn set_page(&self, url: &str, text: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), text.to_string());
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextSource for StaticSource {
    async fn extract(&self, url: &str) -> RagResult<Document> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = self.pages.lock().unwrap().get(url).cloned();
        match text {
            Some(text) => Ok(Document {
                url: url.to_string(),
                text,
            }),
            None => Err(RagError::Fetch {
                url: url.to_string(),
                status: Some(404),
                message: "HTTP 404 Not Found".to_string(),
            }),
        }
    }
}

/// 단어 해시 버킷 임베딩 (결정적)
pub(crate) struct HashEmbedding {
    dimension: usize,
    calls: AtomicUsize,
}

impl HashEmbedding {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
            vector[bucket as usize % self.dimension] += 1.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// 항상 실패하는 임베딩
pub(crate) struct FailingEmbedding;

#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed(&self, _text: &str) -> RagResult<Vec<f32>> {
        Err(RagError::service("openai-embeddings", "503 Service Unavailable"))
    }

    fn dimension(&self) -> usize {
        8
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// 프롬프트를 기록하고 고정 형식 답변을 돌려주는 생성기
#[derive(Default)]
pub(crate) struct EchoGenerator {
    last: Mutex<Option<(String, f32)>>,
}

impl EchoGenerator {
    /// 마지막 (프롬프트, 온도)
    pub(crate) fn last(&self) -> Option<(String, f32)> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for EchoGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> RagResult<String> {
        *self.last.lock().unwrap() = Some((request.prompt.to_string(), request.temperature));
        Ok(format!("answer from {} prompt chars", request.prompt.chars().count()))
    }

    fn name(&self) -> &str {
        "echo"
    }
}
