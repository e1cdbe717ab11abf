//! Vector Store - 인메모리 벡터 검색
//!
//! 코퍼스 크기(수백~수천 청크)가 작으므로 ANN 인덱스 없이
//! 전체 선형 스캔 + 코사인 유사도로 top-k를 고릅니다.
//! 인덱스 기반 구현으로 교체할 수 있도록 `VectorStore` 트레이트 뒤에 둡니다.
//!
//! ## 동시성
//! `load`는 새 세대(generation)를 락 밖에서 만든 뒤 `Arc`만 교체합니다.
//! `query`는 현재 세대의 `Arc`를 복제해 락을 바로 놓고 스캔하므로
//! 절반만 로드된 상태를 볼 수 없습니다.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::chunker::Chunk;
use crate::error::RagError;

// ============================================================================
// Types
// ============================================================================

/// 벡터 레코드 (임베딩, 청크 텍스트)
///
/// 직렬화 형식은 `{"vector": [...], "text": "..."}` 입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    #[serde(rename = "vector")]
    pub embedding: Vec<f32>,
    pub text: String,
}

impl VectorRecord {
    pub fn new(embedding: Vec<f32>, text: impl Into<String>) -> Self {
        Self {
            embedding,
            text: text.into(),
        }
    }
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// 청크
    pub chunk: Chunk,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
    /// 로드 순서상 위치 (동점 정렬 기준)
    pub position: usize,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// `load`가 유일한 변경 연산입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 코퍼스 전체 교체 (원자적). 로드된 레코드 수를 반환
    async fn load(&self, records: Vec<VectorRecord>) -> Result<usize, RagError>;

    /// 유사도 내림차순 top-k (동점은 로드 순서)
    async fn query(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchResult>, RagError>;

    /// 레코드 개수
    async fn count(&self) -> usize;
}

// ============================================================================
// InMemoryVectorStore
// ============================================================================

/// 한 세대의 코퍼스
#[derive(Debug, Default)]
struct Corpus {
    generation: u64,
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
}

/// 선형 스캔 인메모리 벡터 저장소
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    current: RwLock<Arc<Corpus>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<Corpus> {
        // 쓰기 구간은 Arc 교체뿐이라 poison 되어도 데이터는 온전함
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 현재 세대 번호 (load 할 때마다 1 증가)
    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// 현재 임베딩 차원 (비어 있으면 None)
    pub fn dimension(&self) -> Option<usize> {
        self.snapshot().dimension
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn load(&self, records: Vec<VectorRecord>) -> Result<usize, RagError> {
        let dimension = validate_dimensions(&records)?;
        let count = records.len();

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = current.generation + 1;
        *current = Arc::new(Corpus {
            generation,
            dimension,
            records,
        });
        drop(current);

        tracing::info!(
            "Loaded vector corpus generation {} ({} records, dimension {:?})",
            generation,
            count,
            dimension
        );
        Ok(count)
    }

    async fn query(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchResult>, RagError> {
        let corpus = self.snapshot();

        let Some(dimension) = corpus.dimension else {
            return Ok(vec![]);
        };

        if query_embedding.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query_embedding.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = corpus
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let score = cosine_similarity(query_embedding, &record.embedding);
                (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();

        // stable sort: 동점이면 먼저 로드된 레코드가 앞
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, similarity)| SearchResult {
                chunk: Chunk::new(corpus.records[position].text.clone()),
                similarity,
                position,
            })
            .collect())
    }

    async fn count(&self) -> usize {
        self.snapshot().records.len()
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 모든 레코드의 차원이 같은지 확인
///
/// 빈 목록이면 `None`, 차원 0 벡터는 거부합니다.
pub(crate) fn validate_dimensions(records: &[VectorRecord]) -> Result<Option<usize>, RagError> {
    let Some(first) = records.first() else {
        return Ok(None);
    };

    let expected = first.embedding.len();
    if expected == 0 {
        return Err(RagError::InvalidInput(
            "vector record with empty embedding".to_string(),
        ));
    }

    if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
        return Err(RagError::DimensionMismatch {
            expected,
            actual: bad.embedding.len(),
        });
    }

    Ok(Some(expected))
}

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
