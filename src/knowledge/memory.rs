//! In-Memory Vector Store
//!
//! 프로세스 로컬 전수 비교(brute-force) 코사인 검색 저장소.
//! 데모 실행과 테스트용입니다.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{RagError, RagResult};

use super::vector::{cosine_similarity, VectorMatch, VectorRecord, VectorStore};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// 메모리 벡터 저장소
#[derive(Debug)]
pub struct MemoryVectorStore {
    records: RwLock<BTreeMap<String, VectorRecord>>,
    /// 프로세스 내 인스턴스 번호
    instance: u64,
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 ID 목록 (정렬됨)
    pub fn ids(&self) -> Vec<String> {
        self.records
            .read()
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// ID로 레코드 조회
    pub fn get(&self, id: &str) -> Option<VectorRecord> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(id).cloned())
    }
}

fn lock_error(e: impl std::fmt::Display) -> RagError {
    RagError::service("memory-store", format!("Lock error: {}", e))
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> RagResult<usize> {
        let mut guard = self.records.write().map_err(lock_error)?;
        for record in records {
            guard.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> RagResult<Vec<VectorMatch>> {
        let guard = self.records.read().map_err(lock_error)?;

        let mut matches: Vec<VectorMatch> = guard
            .values()
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: include_metadata.then(|| record.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> RagResult<usize> {
        let mut guard = self.records.write().map_err(lock_error)?;
        Ok(ids.iter().filter(|id| guard.remove(*id).is_some()).count())
    }

    async fn count(&self) -> RagResult<usize> {
        Ok(self.records.read().map_err(lock_error)?.len())
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn location(&self) -> String {
        format!("memory:{}", self.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::vector::ChunkMetadata;

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: ChunkMetadata::text(format!("chunk {}", id)),
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_id() {
        let store = MemoryVectorStore::new();
        store.upsert(&[record("0", vec![1.0, 0.0])]).await.unwrap();
        store
            .upsert(&[VectorRecord {
                metadata: ChunkMetadata::text("replaced"),
                ..record("0", vec![0.0, 1.0])
            }])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("0").unwrap().metadata.text, "replaced");
    }

    #[tokio::test]
    async fn test_query_top_k_descending() {
        let store = MemoryVectorStore::new();
        let records: Vec<VectorRecord> = (0..5)
            .map(|i| record(&i.to_string(), vec![1.0, i as f32]))
            .collect();
        store.upsert(&records).await.unwrap();

        let matches = store.query(&[1.0, 0.0], 3, true).await.unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(
            matches.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["0", "1", "2"]
        );
        assert!(matches.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(matches[0].metadata.as_ref().unwrap().text, "chunk 0");
    }

    #[tokio::test]
    async fn test_query_without_metadata() {
        let store = MemoryVectorStore::new();
        store.upsert(&[record("0", vec![1.0])]).await.unwrap();

        let matches = store.query(&[1.0], 1, false).await.unwrap();
        assert!(matches[0].metadata.is_none());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryVectorStore::new();
        assert!(store.query(&[1.0], 3, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryVectorStore::new();
        store
            .upsert(&[record("0", vec![1.0]), record("1", vec![1.0])])
            .await
            .unwrap();

        let deleted = store
            .delete(&["1".to_string(), "7".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.ids(), vec!["0"]);
    }

    #[test]
    fn test_location_differs_per_instance() {
        let a = MemoryVectorStore::new();
        let b = MemoryVectorStore::new();
        assert!(a.location().starts_with("memory:"));
        assert_ne!(a.location(), b.location());
        assert_eq!(a.location(), a.location());
    }
}
