//! 설정 모듈 - 환경변수 기반 설정 로드
//!
//! 모든 클라이언트는 이 설정으로 명시적으로 생성됩니다.
//! 전역 상태는 두지 않습니다.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ProviderError;

// ============================================================================
// Defaults
// ============================================================================

/// 기본 임베딩 모델
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text-v1.5";
/// 최종 답변용 모델 (큰 모델)
pub const DEFAULT_ANSWER_MODEL: &str = "llama-3.3-70b-versatile";
/// 대화 요약용 모델 (작고 빠른 모델)
pub const DEFAULT_SUMMARY_MODEL: &str = "llama-3.1-8b-instant";
/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 3;
/// 기본 청크 크기 (문자 수)
pub const DEFAULT_CHUNK_SIZE: usize = 512;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.plannr-rag/)
///
/// `PLANNR_DATA_DIR`이 설정되어 있으면 그 값을 사용합니다.
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = non_empty_env("PLANNR_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".plannr-rag")
}

// ============================================================================
// Config Types
// ============================================================================

/// 대화 압축 정책
#[derive(Debug, Clone)]
pub struct HistoryPolicy {
    /// 압축 후 그대로 유지할 최근 턴 수
    pub keep_recent: usize,
    /// 이 길이를 초과하면 압축
    pub trigger_threshold: usize,
    /// 요약 응답 최대 토큰
    pub summary_max_tokens: u32,
    /// 요약 샘플링 온도 (낮을수록 결정적)
    pub summary_temperature: f32,
    /// 요약 호출 타임아웃
    pub summary_timeout: Duration,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            keep_recent: 3,
            trigger_threshold: 6,
            summary_max_tokens: 150,
            summary_temperature: 0.3,
            summary_timeout: Duration::from_secs(20),
        }
    }
}

/// 전체 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub nomic_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub embed_model: String,
    pub answer_model: String,
    pub summary_model: String,
    pub top_k: usize,
    pub chunk_size: usize,
    pub data_dir: PathBuf,
    pub history: HistoryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nomic_api_key: None,
            groq_api_key: None,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            answer_model: DEFAULT_ANSWER_MODEL.to_string(),
            summary_model: DEFAULT_SUMMARY_MODEL.to_string(),
            top_k: DEFAULT_TOP_K,
            chunk_size: DEFAULT_CHUNK_SIZE,
            data_dir: get_data_dir(),
            history: HistoryPolicy::default(),
        }
    }
}

impl Config {
    /// 환경변수에서 설정 로드
    ///
    /// 숫자 값이 잘못된 경우 경고 후 기본값을 사용합니다.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            nomic_api_key: non_empty_env("NOMIC_API_KEY"),
            groq_api_key: non_empty_env("GROQ_API_KEY"),
            embed_model: non_empty_env("PLANNR_EMBED_MODEL").unwrap_or(defaults.embed_model),
            answer_model: non_empty_env("PLANNR_ANSWER_MODEL").unwrap_or(defaults.answer_model),
            summary_model: non_empty_env("PLANNR_SUMMARY_MODEL")
                .unwrap_or(defaults.summary_model),
            top_k: parse_env("PLANNR_TOP_K").unwrap_or(defaults.top_k),
            chunk_size: parse_env("PLANNR_CHUNK_SIZE").unwrap_or(defaults.chunk_size),
            data_dir: defaults.data_dir,
            history: defaults.history,
        }
    }

    /// SQLite 파일 경로
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("plannr.db")
    }

    /// 임베딩 API 키 (없으면 에러)
    pub fn require_nomic_key(&self) -> Result<String, ProviderError> {
        self.nomic_api_key
            .clone()
            .ok_or(ProviderError::MissingApiKey {
                provider: "nomic",
                env_var: "NOMIC_API_KEY",
            })
    }

    /// LLM API 키 (없으면 에러)
    pub fn require_groq_key(&self) -> Result<String, ProviderError> {
        self.groq_api_key.clone().ok_or(ProviderError::MissingApiKey {
            provider: "groq",
            env_var: "GROQ_API_KEY",
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = non_empty_env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}
