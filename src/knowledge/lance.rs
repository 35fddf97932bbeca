//! LanceDB Vector Store - 로컬 임베디드 벡터 저장소
//!
//! 호스팅 인덱스 없이 실행할 때 사용합니다. 코사인 거리로 검색합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use crate::error::{RagError, RagResult};

use super::vector::{ChunkMetadata, VectorMatch, VectorRecord, VectorStore};

/// 기본 벡터 테이블 이름
const DEFAULT_TABLE: &str = "chunks";

/// 서비스 이름 (에러 표시용)
const SERVICE: &str = "lancedb";

fn lance_error(context: &str, e: impl std::fmt::Display) -> RagError {
    RagError::service(SERVICE, format!("{}: {}", context, e))
}

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// namespace마다 별도의 테이블(`chunks` 또는 `chunks_{namespace}`)을 사용합니다.
pub struct LanceVectorStore {
    db: Connection,
    path: PathBuf,
    table_name: String,
    dimension: usize,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `namespace` - 테이블 구분자 (빈 문자열이면 기본 테이블)
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, namespace: &str, dimension: usize) -> RagResult<Self> {
        if dimension == 0 || i32::try_from(dimension).is_err() {
            return Err(RagError::config(format!("invalid embedding dimension {}", dimension)));
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| lance_error("Failed to create LanceDB directory", e))?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::config("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .map_err(|e| lance_error("Failed to connect to LanceDB", e))?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
            table_name: table_name_for(namespace),
            dimension,
        })
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, true),
            Field::new("version", DataType::Int64, true),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(&self, records: &[VectorRecord]) -> RagResult<RecordBatch> {
        if let Some(bad) = records.iter().find(|r| r.values.len() != self.dimension) {
            return Err(RagError::service(
                SERVICE,
                format!(
                    "record {} has {} dimensions, table expects {}",
                    bad.id,
                    bad.values.len(),
                    self.dimension
                ),
            ));
        }

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.metadata.text.as_str()).collect();
        let sources: Vec<Option<&str>> = records
            .iter()
            .map(|r| r.metadata.source.as_deref())
            .collect();
        let versions: Vec<Option<i64>> = records.iter().map(|r| r.metadata.version).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.values.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(|e| lance_error("Failed to create embedding array", e))?;

        RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(sources)),
                Arc::new(Int64Array::from(versions)),
                Arc::new(embeddings_list),
            ],
        )
        .map_err(|e| lance_error("Failed to create RecordBatch", e))
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&self.table_name))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> RagResult<lancedb::table::Table> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| lance_error("Failed to open table", e))
    }
}

/// namespace에 대응하는 테이블 이름
fn table_name_for(namespace: &str) -> String {
    let cleaned: String = namespace
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        DEFAULT_TABLE.to_string()
    } else {
        format!("{}_{}", DEFAULT_TABLE, cleaned)
    }
}

/// `id IN ('0', '1')` 필터 생성 (작은따옴표 이스케이프)
fn id_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("'{}'", id.replace('\'', "''")))
        .collect();
    format!("id IN ({})", quoted.join(", "))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> RagResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let batch = self.records_to_batch(records)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self.open_table().await?;

            // 같은 ID를 먼저 지우고 추가 (덮어쓰기)
            let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
            table
                .delete(&id_filter(&ids))
                .await
                .map_err(|e| lance_error("Failed to delete previous vectors", e))?;

            table
                .add(batches)
                .execute()
                .await
                .map_err(|e| lance_error("Failed to add vectors to table", e))?;
        } else {
            self.db
                .create_table(&self.table_name, batches)
                .execute()
                .await
                .map_err(|e| lance_error("Failed to create table", e))?;
        }

        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> RagResult<Vec<VectorMatch>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;

        let stream = table
            .vector_search(vector.to_vec())
            .map_err(|e| lance_error("Failed to create vector search", e))?
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| lance_error("Failed to execute vector search", e))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| lance_error("Failed to read search results", e))?;

        let mut matches = Vec::new();

        for batch in batches {
            let column = |name: &str| {
                batch
                    .column_by_name(name)
                    .ok_or_else(|| lance_error("Missing column", name))
            };

            let ids = column("id")?
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| lance_error("Bad column type", "id"))?;
            let texts = column("text")?
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| lance_error("Bad column type", "text"))?;
            let sources = column("source")?
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| lance_error("Bad column type", "source"))?;
            let versions = column("version")?
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| lance_error("Bad column type", "version"))?;
            // _distance 컬럼 (LanceDB가 자동 추가, 코사인 거리 = 1 - 유사도)
            let distances = column("_distance")?
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| lance_error("Bad column type", "_distance"))?;

            for i in 0..batch.num_rows() {
                let metadata = include_metadata.then(|| ChunkMetadata {
                    text: texts.value(i).to_string(),
                    source: (!sources.is_null(i)).then(|| sources.value(i).to_string()),
                    version: (!versions.is_null(i)).then(|| versions.value(i)),
                });

                matches.push(VectorMatch {
                    id: ids.value(i).to_string(),
                    score: 1.0 - distances.value(i),
                    metadata,
                });
            }
        }

        // 배치 경계를 넘어서도 내림차순 유지
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> RagResult<usize> {
        if ids.is_empty() || !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;

        let before_count = self.count().await?;
        table
            .delete(&id_filter(ids))
            .await
            .map_err(|e| lance_error("Failed to delete vectors", e))?;
        let after_count = self.count().await?;

        Ok(before_count.saturating_sub(after_count))
    }

    async fn count(&self) -> RagResult<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| lance_error("Failed to count rows", e))
    }

    fn name(&self) -> &str {
        "lancedb"
    }

    fn location(&self) -> String {
        format!("lancedb:{}#{}", self.path.display(), self.table_name)
    }
}

// ============================================================================
// Tests
// ============================================================================
