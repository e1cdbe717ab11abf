//! plannr-rag - 이벤트 플래닝 어시스턴트용 RAG 백엔드
//!
//! 코퍼스 원문을 청크로 나눠 임베딩하고, 인메모리 코사인 검색으로
//! 근거 컨텍스트를 찾아 LLM 답변을 생성합니다.
//! 긴 대화 기록은 작은 모델로 요약해 압축합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod rag;

// Re-exports
pub use config::{get_data_dir, Config, HistoryPolicy};
pub use embedding::{EmbedMode, EmbeddingProvider, NomicEmbedding};
pub use error::{ErrorKind, ProviderError, RagError, StoreError};
pub use knowledge::{
    split, Chunk, Chunker, CorpusDocument, DocumentStore, InMemoryVectorStore, SearchResult,
    SqliteDocumentStore, StoreStats, TextSplitter, Vendor, Venue, VectorRecord, VectorStore,
};
pub use llm::{ChatModel, ChatTurn, CompletionOptions, GroqChat, Role};
pub use rag::{
    AnsweringPipeline, HistoryCompressor, IngestionRefresher, RagService, RefreshReport,
    ServiceStats, SummaryOutcome,
};
