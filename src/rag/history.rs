//! 대화 기록 압축
//!
//! 기록이 `trigger_threshold`보다 길면 최근 `keep_recent`개만 남기고
//! 나머지는 작은 모델로 요약한 system 턴 하나로 대체합니다.
//! 요약이 실패해도 에러를 올리지 않고 메시지 수만 적은 대체 턴을 씁니다.

use std::sync::Arc;
use std::time::Duration;

use crate::config::HistoryPolicy;
use crate::error::RagError;
use crate::llm::{ChatModel, ChatTurn, CompletionOptions, Role};

/// 요약 턴 접두어
pub const SUMMARY_PREFIX: &str = "Previous context: ";

// ============================================================================
// Summary Outcome
// ============================================================================

/// 요약 결과 (실패도 값으로 표현)
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutcome {
    Summarized(String),
    Failed { reason: String, message_count: usize },
}

impl SummaryOutcome {
    /// system 턴에 들어갈 본문
    pub fn into_text(self) -> String {
        match self {
            SummaryOutcome::Summarized(summary) => summary,
            SummaryOutcome::Failed { message_count, .. } => fallback_summary(message_count),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SummaryOutcome::Failed { .. })
    }
}

/// 요약 실패 시 대체 문장
pub fn fallback_summary(message_count: usize) -> String {
    format!(
        "Previous conversation covered: {} messages about event planning topics.",
        message_count
    )
}

// ============================================================================
// HistoryCompressor
// ============================================================================

/// 대화 기록 압축기
pub struct HistoryCompressor {
    chat: Arc<dyn ChatModel>,
    options: CompletionOptions,
    keep_recent: usize,
    trigger_threshold: usize,
    timeout: Duration,
}

impl HistoryCompressor {
    /// 생성
    ///
    /// # Arguments
    /// * `chat` - 요약에 사용할 모델 프로바이더
    /// * `summary_model` - 작은 모델 티어 이름
    /// * `policy` - 압축 정책 (`keep_recent <= trigger_threshold`)
    pub fn new(
        chat: Arc<dyn ChatModel>,
        summary_model: impl Into<String>,
        policy: &HistoryPolicy,
    ) -> Result<Self, RagError> {
        if policy.keep_recent > policy.trigger_threshold {
            return Err(RagError::InvalidInput(format!(
                "keep_recent ({}) must not exceed trigger_threshold ({})",
                policy.keep_recent, policy.trigger_threshold
            )));
        }

        Ok(Self {
            chat,
            options: CompletionOptions {
                model: summary_model.into(),
                max_tokens: Some(policy.summary_max_tokens),
                temperature: Some(policy.summary_temperature),
            },
            keep_recent: policy.keep_recent,
            trigger_threshold: policy.trigger_threshold,
            timeout: policy.summary_timeout,
        })
    }

    /// 기록 압축
    ///
    /// 길이가 임계값 이하이면 그대로, 아니면 `keep_recent + 1`개 턴을 반환합니다.
    pub async fn compress(&self, history: &[ChatTurn]) -> Vec<ChatTurn> {
        if history.len() <= self.trigger_threshold {
            return history.to_vec();
        }

        let split = history.len() - self.keep_recent;
        let (old, recent) = history.split_at(split);

        let outcome = self.summarize(old).await;
        if let SummaryOutcome::Failed { reason, .. } = &outcome {
            tracing::warn!(
                "History summarization failed, using fallback ({} turns): {}",
                old.len(),
                reason
            );
        } else {
            tracing::debug!("Summarized {} older turns", old.len());
        }

        let mut compressed = Vec::with_capacity(recent.len() + 1);
        compressed.push(ChatTurn::system(format!(
            "{}{}",
            SUMMARY_PREFIX,
            outcome.into_text()
        )));
        compressed.extend_from_slice(recent);
        compressed
    }

    /// 오래된 턴 요약 (5~10문장)
    pub async fn summarize(&self, turns: &[ChatTurn]) -> SummaryOutcome {
        let prompt = format!(
            "Summarize this conversation in 5 to 10 sentences, focusing on the main topics \
             discussed and key information shared:\n\n{}\nSummary:",
            render_transcript(turns)
        );
        let messages = [ChatTurn::user(prompt)];

        let failed = |reason: String| SummaryOutcome::Failed {
            reason,
            message_count: turns.len(),
        };

        match tokio::time::timeout(self.timeout, self.chat.complete(&messages, &self.options)).await
        {
            Ok(Ok(summary)) => {
                let summary = summary.trim();
                if summary.is_empty() {
                    failed("empty summary".to_string())
                } else {
                    SummaryOutcome::Summarized(summary.to_string())
                }
            }
            Ok(Err(e)) => failed(e.to_string()),
            Err(_) => failed(format!("timed out after {:?}", self.timeout)),
        }
    }
}

/// `Role: content` 형식의 대화록
fn render_transcript(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let label = match turn.role {
                Role::User => "User",
                _ => "Assistant",
            };
            format!("{}: {}\n\n", label, turn.content)
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
