//! Error types for Nexus configuration
//!
//! 모든 에러를 중앙에서 관리. 하나의 갱신 사이클 결과를 여러 대기자에게
//! 나눠줘야 하므로 `Clone`을 구현한다.

use crate::core::SourceKey;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Nexus 설정 에러 타입
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // 설정 소스 관련
    // ========================================================================
    /// 소스에 접근/읽기 불가 (네트워크, IO)
    #[error("Source unavailable: {source_name} - {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// 소스에 키가 없음
    #[error("Config not found: {0}")]
    NotFound(SourceKey),

    // ========================================================================
    // 디코딩 관련
    // ========================================================================
    /// 페이로드는 있지만 스키마 검증 실패
    #[error("Decode error for {key}: {detail}")]
    Decode { key: SourceKey, detail: String },

    // ========================================================================
    // 레지스트리 관련
    // ========================================================================
    #[error("Config not registered: {0}")]
    NotRegistered(String),

    /// 등록 중 초기 로드 실패 (원인 포함)
    #[error("Registration failed for {schema}: {cause}")]
    Registration {
        schema: String,
        #[source]
        cause: Box<Error>,
    },

    #[error("Schema conflict: {schema} is bound to {registered}, not {requested}")]
    SchemaConflict {
        schema: String,
        registered: SourceKey,
        requested: SourceKey,
    },

    #[error("Config manager closed")]
    Closed,

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// 일시적인 에러인지 확인 (이후 변경 알림으로 재시도 가능)
    pub fn is_transient(&self) -> bool {
        match self {
            Error::SourceUnavailable { .. } => true,
            Error::Registration { cause, .. } => cause.is_transient(),
            _ => false,
        }
    }

    /// Registration 래핑을 벗긴 근본 원인
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Registration { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// SourceUnavailable 생성 헬퍼
    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Decode 에러 생성 헬퍼
    pub fn decode(key: &SourceKey, detail: impl Into<String>) -> Self {
        Error::Decode {
            key: key.clone(),
            detail: detail.into(),
        }
    }

    /// Registration 에러 생성 헬퍼
    pub fn registration(schema: impl Into<String>, cause: Error) -> Self {
        Error::Registration {
            schema: schema.into(),
            cause: Box::new(cause),
        }
    }
}

// ============================================================================
// From 구현
// ============================================================================

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(format!("JSON: {}", e))
    }
}
