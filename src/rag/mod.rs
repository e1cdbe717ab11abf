//! RAG 모듈 - 답변 파이프라인과 코퍼스 관리
//!
//! - History: 긴 대화 기록 요약 압축
//! - Pipeline: 질문 → 검색 → 근거 컨텍스트 → 답변
//! - Refresh: 원문/장소/업체 → 청크 → 임베딩 → 스냅샷 교체
//! - Service: 시작/종료 수명주기를 가진 서비스 핸들

mod history;
mod pipeline;
mod refresh;
mod service;

// Re-exports
pub use history::{fallback_summary, HistoryCompressor, SummaryOutcome, SUMMARY_PREFIX};
pub use pipeline::{
    assemble_messages, build_context, user_message, AnsweringPipeline, CONTEXT_SEPARATOR,
    SYSTEM_PROMPT,
};
pub use refresh::{IngestionRefresher, RefreshReport};
pub use service::{RagService, ServiceStats};
