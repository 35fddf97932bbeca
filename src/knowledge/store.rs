//! Ingest Ledger - rusqlite 기반 수집 기록
//!
//! 완료된 수집마다 (저장소 위치, namespace, url, 콘텐츠 해시, 청크 설정, 청크 수)를 남깁니다.
//! 벡터 저장소 ID는 청크 위치이므로, 이전 기록의 청크 수로 남은 항목을 정리하고
//! 같은 콘텐츠의 재수집을 건너뛸 수 있습니다.
//! 기록은 저장소 위치별로 구분되므로 백엔드나 인덱스가 바뀌면 처음부터 수집합니다.
//!
//! 저장 위치: <data_dir>/ledger.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{RagError, RagResult};

use super::chunker::ChunkConfig;

/// 서비스 이름 (에러 표시용)
const SERVICE: &str = "ledger";

fn ledger_error(e: impl std::fmt::Display) -> RagError {
    RagError::service(SERVICE, e)
}

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (<local data dir>/.pagechat-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pagechat-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 수집 기록
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestRecord {
    /// 기록 ID (= 수집 버전)
    pub version: i64,
    /// 벡터 저장소 위치 (`VectorStore::location`)
    pub store: String,
    pub namespace: String,
    pub url: String,
    pub content_hash: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

impl IngestRecord {
    /// 같은 콘텐츠/설정으로 이미 수집되었는지 확인
    pub fn matches(&self, url: &str, content_hash: &str, config: &ChunkConfig) -> bool {
        self.url == url
            && self.content_hash == content_hash
            && self.chunk_size == config.chunk_size()
            && self.chunk_overlap == config.chunk_overlap()
    }
}

/// 새 기록 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewIngestRecord {
    /// 미리 정한 버전 (None이면 자동 증가)
    pub version: Option<i64>,
    pub store: String,
    pub namespace: String,
    pub url: String,
    pub content_hash: String,
    pub config: ChunkConfig,
    pub chunk_count: usize,
}

// ============================================================================
// IngestLedger
// ============================================================================

/// 수집 원장
#[derive(Clone)]
pub struct IngestLedger {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl IngestLedger {
    /// 원장 열기 (없으면 생성)
    pub fn open(path: &Path) -> RagResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(ledger_error)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(ledger_error)?;

        let ledger = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(path.to_path_buf()),
        };

        ledger.initialize()?;
        Ok(ledger)
    }

    /// 메모리 원장 (프로세스 종료 시 사라짐)
    pub fn open_in_memory() -> RagResult<Self> {
        let conn = Connection::open_in_memory().map_err(ledger_error)?;
        let ledger = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        };

        ledger.initialize()?;
        Ok(ledger)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> RagResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ledger_error(format!("Lock error: {}", e)))
    }

    /// 스키마 초기화
    fn initialize(&self) -> RagResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ingestions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                store TEXT NOT NULL DEFAULT '',
                namespace TEXT NOT NULL,
                url TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                chunk_size INTEGER NOT NULL,
                chunk_overlap INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                ingested_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ingestions_namespace ON ingestions(namespace);",
        )
        .map_err(ledger_error)?;

        // store 컬럼이 없던 원장 파일
        let has_store: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('ingestions') WHERE name = 'store'",
                [],
                |row| row.get(0),
            )
            .map_err(ledger_error)?;
        if !has_store {
            conn.execute(
                "ALTER TABLE ingestions ADD COLUMN store TEXT NOT NULL DEFAULT ''",
                [],
            )
            .map_err(ledger_error)?;
            tracing::info!("Migrated ingest ledger: added store column");
        }

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ingestions_store ON ingestions(store, namespace)",
            [],
        )
        .map_err(ledger_error)?;

        tracing::debug!("Ingest ledger initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 수집 기록 추가, 버전(ID) 반환
    pub fn record(&self, record: &NewIngestRecord) -> RagResult<i64> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO ingestions
                (id, store, namespace, url, content_hash, chunk_size, chunk_overlap, chunk_count, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.version,
                record.store,
                record.namespace,
                record.url,
                record.content_hash,
                record.config.chunk_size() as i64,
                record.config.chunk_overlap() as i64,
                record.chunk_count as i64,
                now
            ],
        )
        .map_err(ledger_error)?;

        Ok(conn.last_insert_rowid())
    }

    /// 다음 수집 버전 (아직 기록되지 않음)
    pub fn next_version(&self) -> RagResult<i64> {
        let conn = self.lock()?;
        let max: i64 = conn
            .query_row("SELECT COALESCE(MAX(id), 0) FROM ingestions", [], |row| {
                row.get(0)
            })
            .map_err(ledger_error)?;
        Ok(max + 1)
    }

    /// 저장소 위치 + namespace의 최신 기록
    pub fn latest(&self, store: &str, namespace: &str) -> RagResult<Option<IngestRecord>> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT id, store, namespace, url, content_hash, chunk_size, chunk_overlap, chunk_count, ingested_at
             FROM ingestions WHERE store = ?1 AND namespace = ?2
             ORDER BY id DESC LIMIT 1",
            params![store, namespace],
            row_to_record,
        )
        .optional()
        .map_err(ledger_error)
    }

    /// 최근 기록 목록 (최신순)
    pub fn history(&self, limit: usize) -> RagResult<Vec<IngestRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, store, namespace, url, content_hash, chunk_size, chunk_overlap, chunk_count, ingested_at
                 FROM ingestions ORDER BY id DESC LIMIT ?1",
            )
            .map_err(ledger_error)?;

        let records = stmt
            .query_map(params![limit as i64], row_to_record)
            .map_err(ledger_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ledger_error)?;

        Ok(records)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<IngestRecord> {
    Ok(IngestRecord {
        version: row.get(0)?,
        store: row.get(1)?,
        namespace: row.get(2)?,
        url: row.get(3)?,
        content_hash: row.get(4)?,
        chunk_size: row.get::<_, i64>(5)? as usize,
        chunk_overlap: row.get::<_, i64>(6)? as usize,
        chunk_count: row.get::<_, i64>(7)? as usize,
        ingested_at: parse_datetime(8, &row.get::<_, String>(8)?)?,
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// 콘텐츠 SHA-256 해시 (hex)
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STORE: &str = "memory:1";

    fn new_record(namespace: &str, url: &str, chunk_count: usize) -> NewIngestRecord {
        NewIngestRecord {
            version: None,
            store: STORE.to_string(),
            namespace: namespace.to_string(),
            url: url.to_string(),
            content_hash: content_hash(url),
            config: ChunkConfig::default(),
            chunk_count,
        }
    }

    #[test]
    fn test_record_and_latest() {
        let dir = TempDir::new().unwrap();
        let ledger = IngestLedger::open(&dir.path().join("ledger.db")).unwrap();

        assert!(ledger.latest(STORE, "").unwrap().is_none());
        assert_eq!(ledger.next_version().unwrap(), 1);

        let v1 = ledger.record(&new_record("", "https://example.test/a", 5)).unwrap();
        let v2 = ledger.record(&new_record("", "https://example.test/b", 3)).unwrap();
        assert!(v2 > v1);
        assert_eq!(ledger.next_version().unwrap(), v2 + 1);

        let latest = ledger.latest(STORE, "").unwrap().unwrap();
        assert_eq!(latest.version, v2);
        assert_eq!(latest.store, STORE);
        assert_eq!(latest.url, "https://example.test/b");
        assert_eq!(latest.chunk_count, 3);
        assert_eq!(latest.chunk_size, 250);
    }

    #[test]
    fn test_namespaces_are_separate() {
        let ledger = IngestLedger::open_in_memory().unwrap();
        ledger.record(&new_record("docs", "https://example.test/a", 5)).unwrap();

        assert!(ledger.latest(STORE, "").unwrap().is_none());
        assert_eq!(ledger.latest(STORE, "docs").unwrap().unwrap().chunk_count, 5);
    }

    #[test]
    fn test_stores_are_separate() {
        let ledger = IngestLedger::open_in_memory().unwrap();
        ledger.record(&new_record("", "https://example.test/a", 5)).unwrap();
        ledger
            .record(&NewIngestRecord {
                store: "pinecone:https://idx-b.example.test".to_string(),
                ..new_record("", "https://example.test/a", 2)
            })
            .unwrap();

        assert!(ledger.latest("lancedb:/tmp/v.lance#chunks", "").unwrap().is_none());
        assert_eq!(ledger.latest(STORE, "").unwrap().unwrap().chunk_count, 5);
        assert_eq!(
            ledger
                .latest("pinecone:https://idx-b.example.test", "")
                .unwrap()
                .unwrap()
                .chunk_count,
            2
        );
    }

    #[test]
    fn test_history_order() {
        let ledger = IngestLedger::open_in_memory().unwrap();
        for i in 0..4 {
            ledger
                .record(&new_record("", &format!("https://example.test/{}", i), i))
                .unwrap();
        }

        let history = ledger.history(2).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].url, "https://example.test/3");
        assert_eq!(history[1].url, "https://example.test/2");
    }

    #[test]
    fn test_history_bad_timestamp_is_error() {
        let ledger = IngestLedger::open_in_memory().unwrap();
        ledger.record(&new_record("", "https://example.test/a", 1)).unwrap();
        ledger
            .lock()
            .unwrap()
            .execute("UPDATE ingestions SET ingested_at = 'yesterday'", [])
            .unwrap();

        let err = ledger.history(10).unwrap_err();
        assert_eq!(err.kind(), "service");
        assert!(ledger.latest(STORE, "").is_err());
    }

    #[test]
    fn test_matches() {
        let ledger = IngestLedger::open_in_memory().unwrap();
        ledger.record(&new_record("", "https://example.test/a", 2)).unwrap();
        let latest = ledger.latest(STORE, "").unwrap().unwrap();

        let hash = content_hash("https://example.test/a");
        assert!(latest.matches("https://example.test/a", &hash, &ChunkConfig::default()));
        assert!(!latest.matches("https://example.test/b", &hash, &ChunkConfig::default()));
        assert!(!latest.matches(
            "https://example.test/a",
            &hash,
            &ChunkConfig::new(100, 0).unwrap()
        ));
    }

    #[test]
    fn test_explicit_version() {
        let ledger = IngestLedger::open_in_memory().unwrap();
        let version = ledger.next_version().unwrap();
        let recorded = ledger
            .record(&NewIngestRecord {
                version: Some(version),
                ..new_record("", "https://example.test/a", 1)
            })
            .unwrap();
        assert_eq!(recorded, version);
        assert!(ledger
            .record(&NewIngestRecord {
                version: Some(version),
                ..new_record("", "https://example.test/a", 1)
            })
            .is_err());
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ledger.db");

        {
            let ledger = IngestLedger::open(&path).unwrap();
            ledger.record(&new_record("", "https://example.test/a", 4)).unwrap();
        }

        let ledger = IngestLedger::open(&path).unwrap();
        assert_eq!(ledger.latest(STORE, "").unwrap().unwrap().chunk_count, 4);
        assert_eq!(ledger.db_path(), Some(path.as_path()));
    }

    #[test]
    fn test_open_adds_store_column_to_old_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE ingestions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    namespace TEXT NOT NULL,
                    url TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    chunk_size INTEGER NOT NULL,
                    chunk_overlap INTEGER NOT NULL,
                    chunk_count INTEGER NOT NULL,
                    ingested_at TEXT NOT NULL
                );
                INSERT INTO ingestions
                    (namespace, url, content_hash, chunk_size, chunk_overlap, chunk_count, ingested_at)
                VALUES ('', 'https://example.test/a', 'h', 250, 20, 7, '2024-05-01T10:00:00+00:00');",
            )
            .unwrap();
        }

        let ledger = IngestLedger::open(&path).unwrap();
        let history = ledger.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].store, "");
        assert!(ledger.latest(STORE, "").unwrap().is_none());

        // 두 번째 열기에서는 마이그레이션 없음
        drop(ledger);
        assert!(IngestLedger::open(&path).is_ok());
    }
}
