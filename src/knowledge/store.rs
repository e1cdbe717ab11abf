//! Document Store - rusqlite 기반 영구 문서 저장소
//!
//! 코퍼스 원문, 벡터 스냅샷, 장소/업체 레코드를 저장합니다.
//! 저장 위치: ~/.plannr-rag/plannr.db
//!
//! 모든 SQLite 호출은 `spawn_blocking`에서 실행되어
//! 요청 처리 태스크를 막지 않습니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::directory::{Vendor, Venue};
use super::vector::VectorRecord;
use crate::error::StoreError;

/// 코퍼스 원문 문서 타입
const RAW_TEXT_TYPE: &str = "event_management_text";
/// 벡터 스냅샷 문서 타입
const SNAPSHOT_TYPE: &str = "vector_store_json";

// ============================================================================
// Types
// ============================================================================

/// 스냅샷 저장 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotWrite {
    /// 저장된 레코드 수
    pub records: usize,
    /// 삭제된 중복 스냅샷 수
    pub duplicates_removed: usize,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub raw_text_bytes: Option<usize>,
    pub snapshot_count: usize,
    pub vector_count: usize,
    pub venue_count: usize,
    pub vendor_count: usize,
    /// 스냅샷이 현재 원문으로 만들어졌는지 (스냅샷이 없으면 None)
    pub snapshot_current: Option<bool>,
    pub db_path: PathBuf,
}

// ============================================================================
// DocumentStore Trait
// ============================================================================

/// 영구 문서 저장소 인터페이스
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 현재 벡터 스냅샷 (없으면 빈 목록)
    async fn load_corpus(&self) -> Result<Vec<VectorRecord>, StoreError>;

    /// 코퍼스 원문 (없으면 `MissingDocument`)
    async fn load_raw_text(&self) -> Result<String, StoreError>;

    /// 코퍼스 원문 저장 (없으면 생성)
    async fn store_raw_text(&self, text: &str) -> Result<(), StoreError>;

    /// 벡터 스냅샷 교체 + 중복 스냅샷 정리 (정확히 1개만 남김)
    async fn store_vector_records(
        &self,
        records: &[VectorRecord],
        source_fingerprint: &str,
    ) -> Result<SnapshotWrite, StoreError>;

    /// 장소 레코드 목록
    async fn list_venues(&self) -> Result<Vec<Venue>, StoreError>;

    /// 업체 레코드 목록
    async fn list_vendors(&self) -> Result<Vec<Vendor>, StoreError>;
}

// ============================================================================
// SqliteDocumentStore
// ============================================================================

/// SQLite 문서 저장소
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteDocumentStore {
    /// 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - DB 파일 경로
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        initialize(&conn)?;
        tracing::debug!("Document store initialized at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        })
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 블로킹 스레드에서 커넥션 사용
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Worker(format!("lock error: {}", e)))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }

    /// 장소 레코드 전체 교체
    pub async fn replace_venues(&self, venues: Vec<Venue>) -> Result<usize, StoreError> {
        self.with_conn(move |conn| replace_rows(conn, "venues", &venues))
            .await
    }

    /// 업체 레코드 전체 교체
    pub async fn replace_vendors(&self, vendors: Vec<Vendor>) -> Result<usize, StoreError> {
        self.with_conn(move |conn| replace_rows(conn, "vendors", &vendors))
            .await
    }

    /// 저장소 통계
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let db_path = self.db_path.clone();
        self.with_conn(move |conn| {
            let raw_text = query_raw_text(conn)?;
            let snapshot: Option<(i64, Option<String>)> = conn
                .query_row(
                    "SELECT json_array_length(content), fingerprint FROM corpus_documents
                     WHERE doc_type = ?1 ORDER BY id LIMIT 1",
                    params![SNAPSHOT_TYPE],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let snapshot_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM corpus_documents WHERE doc_type = ?1",
                params![SNAPSHOT_TYPE],
                |row| row.get(0),
            )?;
            let venue_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM venues", [], |row| row.get(0))?;
            let vendor_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM vendors", [], |row| row.get(0))?;

            let snapshot_current = snapshot.as_ref().map(|(_, fp)| {
                match (fp, raw_text.as_deref()) {
                    (Some(fp), Some(text)) => *fp == fingerprint(text),
                    _ => false,
                }
            });

            Ok(StoreStats {
                raw_text_bytes: raw_text.as_ref().map(String::len),
                snapshot_count: snapshot_count as usize,
                vector_count: snapshot.map(|(n, _)| n as usize).unwrap_or(0),
                venue_count: venue_count as usize,
                vendor_count: vendor_count as usize,
                snapshot_current,
                db_path,
            })
        })
        .await
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn load_corpus(&self) -> Result<Vec<VectorRecord>, StoreError> {
        self.with_conn(|conn| {
            let content: Option<String> = conn
                .query_row(
                    "SELECT content FROM corpus_documents
                     WHERE doc_type = ?1 ORDER BY id LIMIT 1",
                    params![SNAPSHOT_TYPE],
                    |row| row.get(0),
                )
                .optional()?;

            match content {
                Some(json) => {
                    serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                        table: "corpus_documents",
                        message: e.to_string(),
                    })
                }
                None => {
                    tracing::warn!("No vector snapshot found; starting with an empty corpus");
                    Ok(vec![])
                }
            }
        })
        .await
    }

    async fn load_raw_text(&self) -> Result<String, StoreError> {
        self.with_conn(|conn| {
            query_raw_text(conn)?.ok_or(StoreError::MissingDocument("corpus text"))
        })
        .await
    }

    async fn store_raw_text(&self, text: &str) -> Result<(), StoreError> {
        let text = text.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let updated = conn.execute(
                "UPDATE corpus_documents SET content = ?1, updated_at = ?2
                 WHERE id = (SELECT id FROM corpus_documents WHERE doc_type = ?3
                             ORDER BY id LIMIT 1)",
                params![text, now, RAW_TEXT_TYPE],
            )?;

            if updated == 0 {
                conn.execute(
                    "INSERT INTO corpus_documents (doc_type, content, updated_at)
                     VALUES (?1, ?2, ?3)",
                    params![RAW_TEXT_TYPE, text, now],
                )?;
            }

            tracing::info!("Stored corpus text ({} bytes)", text.len());
            Ok(())
        })
        .await
    }

    async fn store_vector_records(
        &self,
        records: &[VectorRecord],
        source_fingerprint: &str,
    ) -> Result<SnapshotWrite, StoreError> {
        let json = serde_json::to_string(records).map_err(|e| StoreError::Corrupt {
            table: "corpus_documents",
            message: e.to_string(),
        })?;
        let fingerprint = source_fingerprint.to_string();
        let count = records.len();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let ids: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM corpus_documents WHERE doc_type = ?1 ORDER BY id",
                )?;
                let rows = stmt.query_map(params![SNAPSHOT_TYPE], |row| row.get(0))?;
                let ids = rows.collect::<Result<Vec<i64>, _>>()?;
                ids
            };

            // 첫 스냅샷만 남기고 삭제
            for id in ids.iter().skip(1) {
                tx.execute("DELETE FROM corpus_documents WHERE id = ?1", params![id])?;
            }
            let duplicates_removed = ids.len().saturating_sub(1);

            let now = Utc::now().to_rfc3339();
            match ids.first() {
                Some(id) => {
                    tx.execute(
                        "UPDATE corpus_documents SET content = ?1, fingerprint = ?2, updated_at = ?3
                         WHERE id = ?4",
                        params![json, fingerprint, now, id],
                    )?;
                }
                None => {
                    tx.execute(
                        "INSERT INTO corpus_documents (doc_type, content, fingerprint, updated_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![SNAPSHOT_TYPE, json, fingerprint, now],
                    )?;
                }
            }

            tx.commit()?;

            if duplicates_removed > 0 {
                tracing::info!("Deleted {} duplicate vector snapshots", duplicates_removed);
            }
            tracing::info!("Stored vector snapshot ({} records)", count);

            Ok(SnapshotWrite {
                records: count,
                duplicates_removed,
            })
        })
        .await
    }

    async fn list_venues(&self) -> Result<Vec<Venue>, StoreError> {
        self.with_conn(|conn| list_rows(conn, "venues")).await
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>, StoreError> {
        self.with_conn(|conn| list_rows(conn, "vendors")).await
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 코퍼스 원문 지문 (SHA-256 hex)
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// 스키마 초기화
fn initialize(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS corpus_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_type TEXT NOT NULL,
            content TEXT NOT NULL,
            fingerprint TEXT,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_corpus_documents_type ON corpus_documents(doc_type);

        CREATE TABLE IF NOT EXISTS venues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS vendors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn query_raw_text(conn: &Connection) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT content FROM corpus_documents WHERE doc_type = ?1 ORDER BY id LIMIT 1",
            params![RAW_TEXT_TYPE],
            |row| row.get(0),
        )
        .optional()?)
}

/// JSON 행 목록 읽기 (삽입 순서)
fn list_rows<T: DeserializeOwned>(
    conn: &Connection,
    table: &'static str,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT data FROM {} ORDER BY id", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut items = Vec::new();
    for row in rows {
        let data = row?;
        let item = serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
            table,
            message: e.to_string(),
        })?;
        items.push(item);
    }
    Ok(items)
}

/// 테이블 내용을 JSON 행으로 전체 교체
fn replace_rows<T: Serialize>(
    conn: &mut Connection,
    table: &'static str,
    items: &[T],
) -> Result<usize, StoreError> {
    let tx = conn.transaction()?;
    tx.execute(&format!("DELETE FROM {}", table), [])?;
    {
        let mut stmt = tx.prepare(&format!("INSERT INTO {} (data) VALUES (?1)", table))?;
        for item in items {
            let data = serde_json::to_string(item).map_err(|e| StoreError::Corrupt {
                table,
                message: e.to_string(),
            })?;
            stmt.execute(params![data])?;
        }
    }
    tx.commit()?;

    tracing::info!("Replaced {} rows in {}", items.len(), table);
    Ok(items.len())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteDocumentStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteDocumentStore::open(&db_path).unwrap();
        (dir, store)
    }

    /// 이전 버전이 남긴 중복 스냅샷 흉내
    async fn insert_raw_snapshot(store: &SqliteDocumentStore, json: &str) {
        let json = json.to_string();
        store
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO corpus_documents (doc_type, content, updated_at)
                     VALUES (?1, ?2, 'then')",
                    params![SNAPSHOT_TYPE, json],
                )?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_raw_text() {
        let (_dir, store) = create_test_store();
        let err = store.load_raw_text().await.unwrap_err();
        assert!(matches!(err, StoreError::MissingDocument(_)));
    }

    #[tokio::test]
    async fn test_raw_text_round_trip() {
        let (_dir, store) = create_test_store();
        store.store_raw_text("first").await.unwrap();
        store.store_raw_text("second").await.unwrap();
        assert_eq!(store.load_raw_text().await.unwrap(), "second");

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.raw_text_bytes, Some(6));
    }

    #[tokio::test]
    async fn test_empty_corpus_when_no_snapshot() {
        let (_dir, store) = create_test_store();
        assert!(store.load_corpus().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_vector_records_deduplicates() {
        let (_dir, store) = create_test_store();
        insert_raw_snapshot(&store, "[]").await;
        insert_raw_snapshot(&store, "[]").await;
        insert_raw_snapshot(&store, "[]").await;

        let records = vec![
            VectorRecord::new(vec![1.0, 0.0], "a"),
            VectorRecord::new(vec![0.0, 1.0], "b"),
        ];
        let write = store.store_vector_records(&records, "fp").await.unwrap();
        assert_eq!(write.records, 2);
        assert_eq!(write.duplicates_removed, 2);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.snapshot_count, 1);
        assert_eq!(stats.vector_count, 2);

        assert_eq!(store.load_corpus().await.unwrap(), records);

        // 두 번째 저장은 중복 없음
        let write = store.store_vector_records(&records, "fp").await.unwrap();
        assert_eq!(write.duplicates_removed, 0);
    }

    #[tokio::test]
    async fn test_snapshot_freshness() {
        let (_dir, store) = create_test_store();
        assert_eq!(store.stats().await.unwrap().snapshot_current, None);

        store.store_raw_text("corpus v1").await.unwrap();
        store
            .store_vector_records(&[], &fingerprint("corpus v1"))
            .await
            .unwrap();
        assert_eq!(store.stats().await.unwrap().snapshot_current, Some(true));

        store.store_raw_text("corpus v2").await.unwrap();
        assert_eq!(store.stats().await.unwrap().snapshot_current, Some(false));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot() {
        let (_dir, store) = create_test_store();
        insert_raw_snapshot(&store, "not json").await;
        let err = store.load_corpus().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_replace_directory_records() {
        let (_dir, store) = create_test_store();

        let venues = vec![
            Venue {
                venue_name: "Hall A".into(),
                ..Venue::default()
            },
            Venue {
                venue_name: "Hall B".into(),
                ..Venue::default()
            },
        ];
        assert_eq!(store.replace_venues(venues.clone()).await.unwrap(), 2);
        assert_eq!(store.list_venues().await.unwrap(), venues);

        store
            .replace_vendors(vec![Vendor {
                company_name: "Lights Co".into(),
                ..Vendor::default()
            }])
            .await
            .unwrap();
        store.replace_vendors(vec![]).await.unwrap();
        assert!(store.list_vendors().await.unwrap().is_empty());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.venue_count, 2);
        assert_eq!(stats.vendor_count, 0);
    }

    #[test]
    fn test_fingerprint_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("").len(), 64);
    }
}
