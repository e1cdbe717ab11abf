//! 답변 파이프라인
//!
//! 질문 임베딩 → 벡터 검색 → 근거 컨텍스트 조립 → (대화 압축) → LLM 호출
//!
//! 요청 간 공유하는 가변 상태는 벡터 저장소뿐이고, 대화 기록은
//! 매 요청마다 호출자가 전달합니다.

use std::sync::Arc;

use crate::embedding::{EmbedMode, EmbeddingProvider};
use crate::error::RagError;
use crate::knowledge::{Chunk, VectorStore};
use crate::llm::{ChatModel, ChatTurn, CompletionOptions};

use super::history::HistoryCompressor;

/// 청크 사이 구분자
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// 고정 시스템 지시문
pub const SYSTEM_PROMPT: &str = "You are PlannrAI Sync, an intelligent event planning assistant that helps users \
with venue bookings, vendor selection, and event management in Bangladesh. \
You provide guidance on venues, catering, photography, decoration, and other event services \
with accurate pricing and recommendations when they are in your context. \
STRICT RULE: You must NEVER provide any information or facts that are not found directly in the \
provided context. If the answer is not in the context, say you do not have enough information. \
Do NOT guess, invent, or use outside knowledge under ANY circumstances. \
You support both English and Bangla queries - respond in the same language as the user's question. \
Always reply in concise bullet points or numbered lists, keeping answers short and actionable \
unless detailed information is requested. \
Include relevant pricing in Bangladeshi Taka (৳) when discussing costs. \
Do not reference 'the context' in your responses - answer as if this is your expertise.";

// ============================================================================
// AnsweringPipeline
// ============================================================================

/// 답변 파이프라인
pub struct AnsweringPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    vectors: Arc<dyn VectorStore>,
    compressor: HistoryCompressor,
    answer_options: CompletionOptions,
    top_k: usize,
}

impl AnsweringPipeline {
    /// 생성 (모든 의존성은 호출자가 주입)
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
        vectors: Arc<dyn VectorStore>,
        compressor: HistoryCompressor,
        answer_model: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            chat,
            vectors,
            compressor,
            answer_options: CompletionOptions::model(answer_model),
            top_k,
        }
    }

    /// 질문과 관련된 청크 검색 (관련도 내림차순)
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>, RagError> {
        let query = self.embedder.embed(question, EmbedMode::Query).await?;
        let results = self.vectors.query(&query, self.top_k).await?;

        tracing::debug!(
            "Retrieved {} chunks (top similarity {:?})",
            results.len(),
            results.first().map(|r| r.similarity)
        );

        Ok(results.into_iter().map(|r| r.chunk).collect())
    }

    /// 질문에 답변
    ///
    /// # Arguments
    /// * `question` - 사용자 질문
    /// * `history` - 이전 대화 (없으면 단일 질의)
    pub async fn answer(
        &self,
        question: &str,
        history: Option<&[ChatTurn]>,
    ) -> Result<String, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".to_string()));
        }

        let chunks = self.retrieve(question).await?;
        let context = build_context(&chunks);

        let history = match history {
            Some(turns) if !turns.is_empty() => self.compressor.compress(turns).await,
            _ => Vec::new(),
        };

        let messages = assemble_messages(&context, question, &history);
        let answer = self.chat.complete(&messages, &self.answer_options).await?;

        tracing::info!(
            "Answered question ({} chunks, {} history turns)",
            chunks.len(),
            history.len()
        );
        Ok(answer)
    }
}

// ============================================================================
// Prompt Assembly
// ============================================================================

/// 청크를 검색 순서대로 이어 붙인 근거 컨텍스트
///
/// 검색 결과가 없으면 빈 문자열입니다.
pub fn build_context(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let joined = chunks
        .iter()
        .map(Chunk::text)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    format!("{}\n\n---", joined)
}

/// 사용자 턴 본문 (컨텍스트 + 질문)
pub fn user_message(context: &str, question: &str) -> String {
    format!(
        "Context:\n{}\n\nUser Question:\n{}\n",
        context, question
    )
}

/// 모델 입력 메시지: 시스템 지시문 → 압축된 기록 → 사용자 턴
pub fn assemble_messages(context: &str, question: &str, history: &[ChatTurn]) -> Vec<ChatTurn> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatTurn::system(SYSTEM_PROMPT));
    messages.extend_from_slice(history);
    messages.push(ChatTurn::user(user_message(context, question)));
    messages
}

// ============================================================================
// Tests
// ============================================================================
