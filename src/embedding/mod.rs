//! 임베딩 모듈 - Nomic API를 통한 텍스트 벡터화
//!
//! 코퍼스 청크는 `search_document` 모드로, 사용자 질문은 `search_query`
//! 모드로 임베딩합니다. 두 모드의 벡터는 같은 공간에 있어야 하므로
//! 반드시 같은 모델을 사용해야 합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = NomicEmbedding::new(api_key, "nomic-embed-text-v1.5")?;
//! let vector = embedder.embed("Venue in Dhaka", EmbedMode::Query).await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::ProviderError;

const PROVIDER: &str = "nomic";

/// 특정 구현체와 무관한 임베딩 에러 라벨
pub const EMBEDDING_LABEL: &str = "embedding";

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 용도
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// 코퍼스 청크 (인덱싱)
    Document,
    /// 사용자 질문 (검색)
    Query,
}

impl EmbedMode {
    /// Nomic `task_type` 값
    pub fn task_type(self) -> &'static str {
        match self {
            EmbedMode::Document => "search_document",
            EmbedMode::Query => "search_query",
        }
    }
}

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 외부 서비스 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 배치 임베딩 (입력 순서 유지)
    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// 단일 텍스트 임베딩 (기본 구현: 크기 1 배치)
    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()], mode).await?;
        vectors.pop().ok_or_else(|| ProviderError::Malformed {
            provider: EMBEDDING_LABEL,
            message: "empty embedding list".to_string(),
        })
    }

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Nomic Embedding
// ============================================================================

/// Nomic 임베딩 API 엔드포인트
const NOMIC_EMBED_URL: &str = "https://api-atlas.nomic.ai/v1/embedding/text";

/// 요청당 최대 텍스트 수
const MAX_BATCH_SIZE: usize = 64;

/// Rate Limiter 설정
const RATE_LIMIT_RPM: u32 = 120;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이
const MIN_DELAY_MS: u64 = 100;
/// 429/네트워크 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Nomic 임베딩 구현체
#[derive(Debug)]
pub struct NomicEmbedding {
    api_key: String,
    model: String,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능할 때까지 대기 후 기록
    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl NomicEmbedding {
    /// 새 Nomic 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Nomic Atlas API 키
    /// * `model` - 임베딩 모델 이름
    pub fn new(api_key: String, model: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
            Duration::from_millis(MIN_DELAY_MS),
        )));

        Ok(Self {
            api_key,
            model: model.into(),
            client,
            rate_limiter,
        })
    }

    /// 단일 요청 (재시도 포함)
    async fn request_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = EmbedRequest {
            model: &self.model,
            texts,
            task_type: mode.task_type(),
        };

        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));

            let response = match self
                .client
                .post(NOMIC_EMBED_URL)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(ProviderError::from_reqwest(PROVIDER, e));
                    if attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Embedding request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

            if status.is_success() {
                let parsed: EmbedResponse =
                    serde_json::from_str(&body).map_err(|e| ProviderError::Malformed {
                        provider: PROVIDER,
                        message: e.to_string(),
                    })?;

                if parsed.embeddings.len() != texts.len() {
                    return Err(ProviderError::Malformed {
                        provider: PROVIDER,
                        message: format!(
                            "expected {} embeddings, got {}",
                            texts.len(),
                            parsed.embeddings.len()
                        ),
                    });
                }
                return Ok(parsed.embeddings);
            }

            if status.as_u16() == 429 {
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(ProviderError::RateLimited {
                    provider: PROVIDER,
                    attempts: attempt + 1,
                });

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                let message = serde_json::from_str::<NomicError>(&body)
                    .map(|e| e.detail.to_string())
                    .unwrap_or(body);
                return Err(ProviderError::Api {
                    provider: PROVIDER,
                    status: status.as_u16(),
                    message,
                });
            }
        }

        Err(last_error.unwrap_or(ProviderError::RateLimited {
            provider: PROVIDER,
            attempts: MAX_RETRIES + 1,
        }))
    }
}

/// Nomic API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    task_type: &'static str,
}

/// Nomic API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Nomic API 에러 응답
#[derive(Debug, Deserialize)]
struct NomicError {
    detail: serde_json::Value,
}

#[async_trait]
impl EmbeddingProvider for NomicEmbedding {
    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(MAX_BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({} texts, mode={})",
                i + 1,
                batch.len(),
                mode.task_type()
            );
            results.extend(self.request_batch(batch, mode).await?);
        }

        Ok(results)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct SilentProvider;

    #[async_trait]
    impl EmbeddingProvider for SilentProvider {
        async fn embed_batch(
            &self,
            _texts: &[String],
            _mode: EmbedMode,
        ) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    #[tokio::test]
    async fn test_default_embed_empty_response_uses_neutral_label() {
        let err = SilentProvider
            .embed("hello", EmbedMode::Query)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Malformed {
                provider: EMBEDDING_LABEL,
                ..
            }
        ));
    }

    #[test]
    fn test_task_types() {
        assert_eq!(EmbedMode::Document.task_type(), "search_document");
        assert_eq!(EmbedMode::Query.task_type(), "search_query");
    }

    #[test]
    fn test_request_serialization() {
        let texts = vec!["hello".to_string()];
        let request = EmbedRequest {
            model: "nomic-embed-text-v1.5",
            texts: &texts,
            task_type: EmbedMode::Query.task_type(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["task_type"], "search_query");
        assert_eq!(json["texts"][0], "hello");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"embeddings": [[0.1, 0.2], [0.3, 0.4]], "usage": {"total_tokens": 4}}"#;
        let parsed: EmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[1], vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_rate_limiter_records_requests() {
        let mut limiter = RateLimiter::new(10, Duration::from_secs(60), Duration::ZERO);
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.requests.len(), 2);
        assert!(limiter.last_request.is_some());
    }

    #[test]
    fn test_client_creation() {
        let embedder = NomicEmbedding::new("fake_key".to_string(), "nomic-embed-text-v1.5");
        assert!(embedder.is_ok());
        assert_eq!(embedder.unwrap().name(), "nomic-embed-text-v1.5");
    }
}
