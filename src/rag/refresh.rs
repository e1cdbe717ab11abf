//! 코퍼스 갱신 (관리 작업)
//!
//! 1. 저장된 원문을 섹션 단위로 파싱
//! 2. 장소/업체 섹션을 최신 레코드로 교체 (빈 목록이면 비움) 후 원문 저장
//! 3. 청킹 → 문서 모드 임베딩
//! 4. 벡터 스냅샷 저장 (중복 스냅샷 정리)
//! 5. 인메모리 벡터 저장소 세대 교체
//!
//! 중간에 실패하면 인메모리 코퍼스는 이전 세대를 그대로 유지합니다.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::embedding::{EmbedMode, EmbeddingProvider, EMBEDDING_LABEL};
use crate::error::{ProviderError, RagError};
use crate::knowledge::{
    fingerprint, validate_dimensions, CorpusDocument, DocumentStore, TextSplitter, VectorRecord,
    VectorStore,
};

/// 갱신 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// 원문이 바뀌어 다시 저장했는지
    pub text_updated: bool,
    /// 반영한 장소 수
    pub venues: usize,
    /// 반영한 업체 수
    pub vendors: usize,
    pub chunks: usize,
    pub duplicates_removed: usize,
}

/// 코퍼스 갱신기 (단일 writer)
pub struct IngestionRefresher {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    splitter: TextSplitter,
    writer: Mutex<()>,
}

impl IngestionRefresher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        splitter: TextSplitter,
    ) -> Self {
        Self {
            store,
            embedder,
            vectors,
            splitter,
            writer: Mutex::new(()),
        }
    }

    /// 저장된 스냅샷을 인메모리 저장소로 로드 (시작 시)
    pub async fn load_snapshot(&self) -> Result<usize, RagError> {
        let records = self.store.load_corpus().await?;
        self.vectors.load(records).await
    }

    /// 전체 갱신
    pub async fn refresh(&self) -> Result<RefreshReport, RagError> {
        let _writer = self.writer.lock().await;
        let started = Instant::now();

        let raw = self.store.load_raw_text().await?;
        let venues = self.store.list_venues().await?;
        let vendors = self.store.list_vendors().await?;

        // 레코드가 비어 있어도 교체 (삭제된 장소/업체가 코퍼스에 남지 않도록)
        let mut document = CorpusDocument::parse(&raw);
        let venue_count = venues.len();
        let vendor_count = vendors.len();
        document.set_venues(venues);
        document.set_vendors(vendors);

        let text = document.render();
        let text_updated = text != raw;
        if text_updated {
            self.store.store_raw_text(&text).await?;
        }

        let chunks: Vec<String> = self
            .splitter
            .split(&text)
            .map(str::to_string)
            .collect();
        tracing::info!("Split corpus into {} chunks", chunks.len());

        let embeddings = self
            .embedder
            .embed_batch(&chunks, EmbedMode::Document)
            .await?;
        if embeddings.len() != chunks.len() {
            return Err(ProviderError::Malformed {
                provider: EMBEDDING_LABEL,
                message: format!(
                    "expected {} embeddings, got {}",
                    chunks.len(),
                    embeddings.len()
                ),
            }
            .into());
        }

        let records: Vec<VectorRecord> = embeddings
            .into_iter()
            .zip(chunks)
            .map(|(embedding, text)| VectorRecord::new(embedding, text))
            .collect();
        validate_dimensions(&records)?;

        let write = self
            .store
            .store_vector_records(&records, &fingerprint(&text))
            .await?;
        self.vectors.load(records).await?;

        tracing::info!(
            "Refresh finished in {:?} ({} chunks, {} duplicate snapshots removed)",
            started.elapsed(),
            write.records,
            write.duplicates_removed
        );

        Ok(RefreshReport {
            text_updated,
            venues: venue_count,
            vendors: vendor_count,
            chunks: write.records,
            duplicates_removed: write.duplicates_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::knowledge::{InMemoryVectorStore, SqliteDocumentStore, Venue};

    /// 문자 수 기반 1차원 임베딩
    struct LengthEmbedder {
        fail: AtomicBool,
    }

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
            mode: EmbedMode,
        ) -> Result<Vec<Vec<f32>>, ProviderError> {
            assert_eq!(mode, EmbedMode::Document);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProviderError::Timeout { provider: "nomic" });
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f32, 1.0])
                .collect())
        }

        fn name(&self) -> &str {
            "length"
        }
    }

    struct Fixture {
        _dir: TempDir,
        store: Arc<SqliteDocumentStore>,
        vectors: Arc<InMemoryVectorStore>,
        embedder: Arc<LengthEmbedder>,
        refresher: IngestionRefresher,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteDocumentStore::open(&dir.path().join("t.db")).unwrap());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(LengthEmbedder {
            fail: AtomicBool::new(false),
        });
        let refresher = IngestionRefresher::new(
            store.clone(),
            embedder.clone(),
            vectors.clone(),
            TextSplitter::new(64).unwrap(),
        );
        Fixture {
            _dir: dir,
            store,
            vectors,
            embedder,
            refresher,
        }
    }

    const CORPUS: &str = "Welcome to PlannrAI.\n\
=== VENUE DIRECTORY ===\n\
VENUE: Stale Hall\n\
=== VENDOR DIRECTORY ===\n\
VENDOR: Old Lights\n\
=== PLATFORM USAGE GUIDE ===\n\
Sign up, then book.\n";

    #[tokio::test]
    async fn test_refresh_missing_text_fails() {
        let f = fixture();
        let err = f.refresher.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            RagError::Store(crate::error::StoreError::MissingDocument(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_splices_venues_and_loads_vectors() {
        let f = fixture();
        f.store.store_raw_text(CORPUS).await.unwrap();
        f.store
            .replace_venues(vec![Venue {
                venue_name: "Grand Hall".into(),
                location: "Dhaka".into(),
                ..Venue::default()
            }])
            .await
            .unwrap();

        let report = f.refresher.refresh().await.unwrap();
        assert!(report.text_updated);
        assert_eq!(report.venues, 1);
        assert_eq!(report.vendors, 0);
        assert!(report.chunks > 0);

        let text = f.store.load_raw_text().await.unwrap();
        assert!(text.contains("VENUE: Grand Hall"));
        assert!(!text.contains("Stale Hall"));
        assert!(!text.contains("Old Lights"));
        assert!(text.contains("=== VENDOR DIRECTORY ===\n\n=== PLATFORM USAGE GUIDE ==="));

        let persisted = f.store.load_corpus().await.unwrap();
        assert_eq!(persisted.len(), report.chunks);
        assert_eq!(f.vectors.count().await, report.chunks);

        let joined: String = persisted.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(joined, text);

        let stats = f.store.stats().await.unwrap();
        assert_eq!(stats.snapshot_count, 1);
        assert_eq!(stats.snapshot_current, Some(true));
    }

    #[tokio::test]
    async fn test_second_refresh_is_stable() {
        let f = fixture();
        f.store.store_raw_text(CORPUS).await.unwrap();

        let first = f.refresher.refresh().await.unwrap();
        assert!(first.text_updated);

        let second = f.refresher.refresh().await.unwrap();
        assert!(!second.text_updated);
        assert_eq!(first.chunks, second.chunks);
        assert_eq!(second.duplicates_removed, 0);
        assert_eq!(f.vectors.generation(), 2);
    }

    #[tokio::test]
    async fn test_removed_venues_leave_corpus() {
        let f = fixture();
        f.store.store_raw_text(CORPUS).await.unwrap();
        f.store
            .replace_venues(vec![Venue {
                venue_name: "Closed Hall".into(),
                location: "Sylhet".into(),
                ..Venue::default()
            }])
            .await
            .unwrap();
        f.refresher.refresh().await.unwrap();
        assert!(f.store.load_raw_text().await.unwrap().contains("Closed Hall"));

        f.store.replace_venues(vec![]).await.unwrap();
        let report = f.refresher.refresh().await.unwrap();
        assert!(report.text_updated);
        assert_eq!(report.venues, 0);

        let text = f.store.load_raw_text().await.unwrap();
        assert!(!text.contains("Closed Hall"));
        assert!(text.contains("=== VENUE DIRECTORY ==="));

        let persisted = f.store.load_corpus().await.unwrap();
        assert!(persisted.iter().all(|r| !r.text.contains("Closed Hall")));
        assert_eq!(f.vectors.count().await, persisted.len());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_generation() {
        let f = fixture();
        f.store.store_raw_text(CORPUS).await.unwrap();
        let report = f.refresher.refresh().await.unwrap();

        f.embedder.fail.store(true, Ordering::SeqCst);
        let err = f.refresher.refresh().await.unwrap_err();
        assert!(matches!(err, RagError::Provider(_)));

        assert_eq!(f.vectors.generation(), 1);
        assert_eq!(f.vectors.count().await, report.chunks);
    }

    #[tokio::test]
    async fn test_load_snapshot() {
        let f = fixture();
        assert_eq!(f.refresher.load_snapshot().await.unwrap(), 0);

        f.store
            .store_vector_records(&[VectorRecord::new(vec![1.0, 0.0], "a")], "fp")
            .await
            .unwrap();
        assert_eq!(f.refresher.load_snapshot().await.unwrap(), 1);
        assert_eq!(f.vectors.count().await, 1);
    }
}
