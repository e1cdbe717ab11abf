//! 에러 타입 정의
//!
//! 라이브러리 경계에서 사용하는 에러 분류입니다.
//! 호출자가 "프로바이더 장애", "잘못된 입력", "내부 불일치"를
//! 구분할 수 있도록 `ErrorKind`를 제공합니다.
//!
//! CLI 계층에서는 `anyhow`로 감싸서 사용합니다.

use thiserror::Error;

/// 파이프라인 결과 타입
pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// Error Kind
// ============================================================================

/// 에러 대분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 외부 서비스(임베딩/LLM/저장소) 장애 - 재시도로 회복 가능
    Unavailable,
    /// 호출자 입력 오류
    BadInput,
    /// 설정 오류 또는 내부 데이터 불일치
    Internal,
}

// ============================================================================
// Provider Error
// ============================================================================

/// 외부 프로바이더(임베딩, LLM) 호출 에러
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: API key not set ({env_var})")]
    MissingApiKey {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("{provider}: network error: {message}")]
    Network {
        provider: &'static str,
        message: String,
    },

    #[error("{provider}: request timed out")]
    Timeout { provider: &'static str },

    #[error("{provider}: rate limit exceeded after {attempts} attempts")]
    RateLimited {
        provider: &'static str,
        attempts: u32,
    },

    #[error("{provider}: API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider}: malformed response: {message}")]
    Malformed {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    /// reqwest 에러를 분류
    pub fn from_reqwest(provider: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { provider }
        } else {
            Self::Network {
                provider,
                message: err.to_string(),
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            // 키 누락/거부는 사용자 입력이 아닌 설정 문제
            Self::MissingApiKey { .. } => ErrorKind::Internal,
            Self::Api { status: 401 | 403, .. } => ErrorKind::Internal,
            Self::Api { status, .. } if (400..500).contains(status) && *status != 429 => {
                ErrorKind::BadInput
            }
            _ => ErrorKind::Unavailable,
        }
    }
}

// ============================================================================
// Store Error
// ============================================================================

/// 영구 문서 저장소 에러
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document not found: {0}")]
    MissingDocument(&'static str),

    #[error("corrupt record in {table}: {message}")]
    Corrupt { table: &'static str, message: String },

    #[error("store worker failed: {0}")]
    Worker(String),
}

// ============================================================================
// RagError
// ============================================================================

/// 검색/응답 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// 벡터 차원 불일치 (설정 버그 - 일시적 장애와 구분)
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(e) => e.kind(),
            Self::DimensionMismatch { .. } => ErrorKind::Internal,
            Self::Store(StoreError::Sqlite(_) | StoreError::Io(_) | StoreError::Worker(_)) => {
                ErrorKind::Unavailable
            }
            Self::Store(_) => ErrorKind::Internal,
            Self::InvalidInput(_) => ErrorKind::BadInput,
        }
    }
}
