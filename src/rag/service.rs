//! RAG 서비스 핸들
//!
//! 시작 시 클라이언트와 저장소를 명시적으로 생성하고, 저장된 벡터
//! 스냅샷을 인메모리 저장소로 로드합니다. 프로세스 전역 상태는 없습니다.

use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::embedding::{EmbeddingProvider, NomicEmbedding};
use crate::error::{RagError, StoreError};
use crate::knowledge::{
    Chunk, InMemoryVectorStore, SqliteDocumentStore, StoreStats, TextSplitter, VectorStore,
};
use crate::llm::{ChatModel, ChatTurn, GroqChat};

use super::history::HistoryCompressor;
use super::pipeline::AnsweringPipeline;
use super::refresh::{IngestionRefresher, RefreshReport};

/// 서비스 통계
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    /// 현재 메모리에 올라간 청크 수
    pub loaded_chunks: usize,
    /// 코퍼스 로드 횟수 (시작 시 스냅샷 로드 포함)
    pub generation: u64,
    pub dimension: Option<usize>,
    pub store: StoreStats,
}

/// RAG 서비스
pub struct RagService {
    store: Arc<SqliteDocumentStore>,
    vectors: Arc<InMemoryVectorStore>,
    pipeline: AnsweringPipeline,
    refresher: IngestionRefresher,
}

impl RagService {
    /// 설정으로 서비스 시작 (Nomic + Groq 클라이언트)
    pub async fn start(config: Config) -> Result<Self, RagError> {
        let embedder =
            NomicEmbedding::new(config.require_nomic_key()?, config.embed_model.clone())?;
        let chat = GroqChat::new(config.require_groq_key()?)?;

        Self::with_providers(config, Arc::new(embedder), Arc::new(chat)).await
    }

    /// 주어진 프로바이더로 서비스 시작
    pub async fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self, RagError> {
        let splitter = TextSplitter::new(config.chunk_size)?;
        let compressor =
            HistoryCompressor::new(chat.clone(), config.summary_model.clone(), &config.history)?;

        let db_path = config.db_path();
        let store = Arc::new(
            tokio::task::spawn_blocking(move || SqliteDocumentStore::open(&db_path))
                .await
                .map_err(|e| StoreError::Worker(e.to_string()))??,
        );
        let vectors = Arc::new(InMemoryVectorStore::new());

        let pipeline = AnsweringPipeline::new(
            embedder.clone(),
            chat,
            vectors.clone(),
            compressor,
            config.answer_model.clone(),
            config.top_k,
        );
        let refresher = IngestionRefresher::new(store.clone(), embedder, vectors.clone(), splitter);

        let loaded = refresher.load_snapshot().await?;
        tracing::info!(
            "RAG service started ({} chunks loaded from {:?})",
            loaded,
            store.db_path()
        );

        Ok(Self {
            store,
            vectors,
            pipeline,
            refresher,
        })
    }

    /// 질문에 답변 (대화 기록은 호출자가 보관)
    pub async fn answer(
        &self,
        question: &str,
        history: Option<&[ChatTurn]>,
    ) -> Result<String, RagError> {
        self.pipeline.answer(question, history).await
    }

    /// 질문과 관련된 청크 (관련도 내림차순)
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>, RagError> {
        self.pipeline.retrieve(question).await
    }

    /// 코퍼스 갱신
    pub async fn refresh(&self) -> Result<RefreshReport, RagError> {
        self.refresher.refresh().await
    }

    /// 통계
    pub async fn stats(&self) -> Result<ServiceStats, RagError> {
        Ok(ServiceStats {
            loaded_chunks: self.vectors.count().await,
            generation: self.vectors.generation(),
            dimension: self.vectors.dimension(),
            store: self.store.stats().await?,
        })
    }

    /// 문서 저장소
    pub fn store(&self) -> &SqliteDocumentStore {
        &self.store
    }

    /// 종료
    ///
    /// 진행 중인 요청이 끝난 뒤 호출합니다. 핸들을 소비하므로 이후 호출은 불가능합니다.
    pub async fn shutdown(self) {
        tracing::info!(
            "RAG service shutting down (generation {}, {} chunks)",
            self.vectors.generation(),
            self.vectors.count().await
        );
    }
}
