//! Pinecone Vector Store - 호스팅 벡터 인덱스 (REST data plane)
//!
//! ref: https://docs.pinecone.io/reference/api/introduction
//!
//! 인덱스 호스트는 control plane(`GET /indexes/{name}`)에서 조회하거나
//! 직접 지정할 수 있습니다. 모든 요청은 하나의 namespace로 한정됩니다.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, RagResult};

use super::vector::{ChunkMetadata, VectorMatch, VectorRecord, VectorStore};

/// Pinecone control plane 주소
pub const PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";

/// 사용하는 REST API 버전
const API_VERSION: &str = "2024-07";

/// 서비스 이름 (에러 표시용)
const SERVICE: &str = "pinecone";

/// upsert 요청당 최대 레코드 수
const UPSERT_BATCH: usize = 100;

// ============================================================================
// PineconeVectorStore
// ============================================================================

/// Pinecone 벡터 저장소
#[derive(Debug, Clone)]
pub struct PineconeVectorStore {
    client: reqwest::Client,
    host: String,
    namespace: String,
}

impl PineconeVectorStore {
    /// 인덱스 호스트를 직접 지정하여 생성
    ///
    /// # Arguments
    /// * `api_key` - Pinecone API 키
    /// * `host` - 인덱스 호스트 (`https://` 생략 가능)
    /// * `namespace` - 대상 namespace (빈 문자열이면 기본 namespace)
    pub fn new(api_key: &str, host: &str, namespace: &str) -> RagResult<Self> {
        let client = build_client(api_key)?;
        Ok(Self {
            client,
            host: normalize_host(host),
            namespace: namespace.to_string(),
        })
    }

    /// 인덱스 이름으로 호스트를 조회하여 연결
    pub async fn connect(
        api_key: &str,
        control_url: &str,
        index_name: &str,
        namespace: &str,
    ) -> RagResult<Self> {
        let client = build_client(api_key)?;
        let url = format!("{}/indexes/{}", control_url.trim_end_matches('/'), index_name);

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| RagError::service(SERVICE, format!("describe index failed: {}", e)))?;
        let description: IndexDescription = read_json(response).await?;

        tracing::info!("Resolved Pinecone index '{}' -> {}", index_name, description.host);

        Ok(Self {
            client,
            host: normalize_host(&description.host),
            namespace: namespace.to_string(),
        })
    }

    /// 인덱스 호스트 URL
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 대상 namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> RagResult<R> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::service(SERVICE, format!("{} failed: {}", path, e)))?;
        read_json(response).await
    }
}

fn build_client(api_key: &str) -> RagResult<reqwest::Client> {
    if api_key.trim().is_empty() {
        return Err(RagError::config("missing Pinecone API key"));
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        "api-key",
        HeaderValue::from_str(api_key.trim())
            .map_err(|_| RagError::config("invalid Pinecone API key"))?,
    );
    headers.insert("x-pinecone-api-version", HeaderValue::from_static(API_VERSION));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .default_headers(headers)
        .build()
        .map_err(|e| RagError::config(format!("failed to build Pinecone HTTP client: {}", e)))
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> RagResult<R> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RagError::service(SERVICE, format!("failed to read response: {}", e)))?;

    if !status.is_success() {
        return Err(RagError::service(SERVICE, format!("{}: {}", status, body)));
    }

    // 빈 응답 본문은 빈 객체로 취급 (delete)
    let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
    serde_json::from_str(body)
        .map_err(|e| RagError::service(SERVICE, format!("invalid response: {}", e)))
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<WireVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct WireVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a ChunkMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_values: bool,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<ChunkMetadata>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct Empty {}

#[derive(Debug, Deserialize)]
struct IndexStats {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: usize,
}

// ============================================================================
// VectorStore Implementation
// ============================================================================

#[async_trait]
impl VectorStore for PineconeVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> RagResult<usize> {
        let mut upserted = 0;

        for batch in records.chunks(UPSERT_BATCH) {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|r| WireVector {
                        id: &r.id,
                        values: &r.values,
                        metadata: &r.metadata,
                    })
                    .collect(),
                namespace: &self.namespace,
            };

            let response: UpsertResponse = self.post("/vectors/upsert", &request).await?;
            upserted += response.upserted_count;
        }

        Ok(upserted)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> RagResult<Vec<VectorMatch>> {
        let request = QueryRequest {
            namespace: &self.namespace,
            vector,
            top_k,
            include_values: false,
            include_metadata,
        };

        let response: QueryResponse = self.post("/query", &request).await?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    /// Pinecone은 삭제 개수를 반환하지 않으므로 요청한 ID 수를 반환
    async fn delete(&self, ids: &[String]) -> RagResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let request = DeleteRequest {
            ids,
            namespace: &self.namespace,
        };
        let _: Empty = self.post("/vectors/delete", &request).await?;
        Ok(ids.len())
    }

    async fn count(&self) -> RagResult<usize> {
        let stats: IndexStats = self
            .post("/describe_index_stats", &serde_json::json!({}))
            .await?;

        let count = if self.namespace.is_empty() {
            // 기본 namespace 표기는 API 버전에 따라 다름
            ["", "__default__"]
                .iter()
                .filter_map(|key| stats.namespaces.get(*key))
                .map(|ns| ns.vector_count)
                .sum()
        } else {
            stats
                .namespaces
                .get(&self.namespace)
                .map(|ns| ns.vector_count)
                .unwrap_or(0)
        };

        Ok(count)
    }

    fn name(&self) -> &str {
        "pinecone"
    }

    fn location(&self) -> String {
        format!("pinecone:{}", self.host)
    }
}

// ============================================================================
// Tests
// ============================================================================
