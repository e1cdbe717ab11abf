//! LLM 모듈 - Groq(OpenAI 호환) Chat Completions 클라이언트
//!
//! 두 가지 모델 티어를 사용합니다:
//! - 답변용 큰 모델 (`Config::answer_model`)
//! - 대화 요약용 작은 모델 (`Config::summary_model`)

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

const PROVIDER: &str = "groq";

/// Groq OpenAI 호환 엔드포인트
const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

// ============================================================================
// Chat Types
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        f.write_str(label)
    }
}

/// 대화 턴 (요청마다 호출자가 전달, 서버는 보관하지 않음)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// 모델 호출 옵션
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionOptions {
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: None,
            temperature: None,
        }
    }
}

// ============================================================================
// ChatModel Trait
// ============================================================================

/// 언어 모델 프로바이더 트레이트
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 메시지 목록으로 답변 생성
    async fn complete(
        &self,
        messages: &[ChatTurn],
        options: &CompletionOptions,
    ) -> Result<String, ProviderError>;
}

// ============================================================================
// Groq Chat
// ============================================================================

/// Groq Chat Completions 구현체
#[derive(Debug)]
pub struct GroqChat {
    api_key: String,
    client: reqwest::Client,
}

impl GroqChat {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        Ok(Self { api_key, client })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroqError {
    error: GroqErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GroqErrorDetail {
    message: String,
}

#[async_trait]
impl ChatModel for GroqChat {
    async fn complete(
        &self,
        messages: &[ChatTurn],
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &options.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        tracing::debug!(
            "Calling {} with {} messages",
            options.model,
            messages.len()
        );

        let resp = self
            .client
            .post(GROQ_CHAT_URL)
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                provider: PROVIDER,
                attempts: 1,
            });
        }

        if !status.is_success() {
            let message = serde_json::from_str::<GroqError>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        parse_completion(&text)
    }
}

/// 응답 본문에서 첫 번째 답변 추출
fn parse_completion(body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| ProviderError::Malformed {
        provider: PROVIDER,
        message: e.to_string(),
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::Malformed {
            provider: PROVIDER,
            message: "response contained no message content".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        let turn = ChatTurn::system("hi");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);

        let parsed: ChatTurn = serde_json::from_str(r#"{"role":"assistant","content":"ok"}"#).unwrap();
        assert_eq!(parsed.role, Role::Assistant);
    }

    #[test]
    fn test_request_omits_unset_options() {
        let messages = vec![ChatTurn::user("hello")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            max_tokens: None,
            temperature: Some(0.3),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_some());
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"- Venue A"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "- Venue A");
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed { .. }));
    }
}
