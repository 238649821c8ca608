//! Decode - 원본 페이로드 → 타입 인스턴스
//!
//! 두 단계로 나뉜다.
//!
//! 1. `Decoder::parse` - 포맷(JSON/YAML/TOML) 파싱 → `serde_json::Value`
//! 2. `decode_as` - `Value` → 스키마 타입 (serde가 필드 명세를 검증)
//!
//! 1단계는 object-safe trait이라 레지스트리가 `Arc<dyn Decoder>`로 보관한다.

mod env;
mod redact;

pub use env::{expand_env_str, expand_env_vars};
pub use redact::{is_sensitive_field, redact_sensitive, HIDDEN_VALUE};

use crate::core::SourceKey;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

// ============================================================================
// PayloadFormat
// ============================================================================

/// 페이로드 포맷
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Json,
    Yaml,
    Toml,
}

impl PayloadFormat {
    /// 확장자로 포맷 추론
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// 파일 확장자
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
        }
    }

    /// 문자열 파싱
    pub fn parse(&self, raw: &str) -> std::result::Result<Value, String> {
        match self {
            Self::Json => serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e)),
            Self::Yaml => serde_yaml::from_str(raw).map_err(|e| format!("invalid YAML: {}", e)),
            Self::Toml => toml::from_str(raw).map_err(|e| format!("invalid TOML: {}", e)),
        }
    }
}

impl std::str::FromStr for PayloadFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s).ok_or_else(|| Error::Config(format!("Unknown payload format: {}", s)))
    }
}

// ============================================================================
// Decoder Trait
// ============================================================================

/// 원본 페이로드를 구조화된 값으로 파싱
pub trait Decoder: Send + Sync {
    fn parse(&self, key: &SourceKey, raw: &str) -> Result<Value>;
}

/// 포맷 기반 기본 디코더
///
/// data_id 확장자로 포맷을 고르고, 확장자가 없거나 모르는 경우 `fallback`을 쓴다.
#[derive(Debug, Clone, Default)]
pub struct FormatDecoder {
    fallback: PayloadFormat,
    expand_env: bool,
}

impl FormatDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 확장자가 없을 때 사용할 포맷
    pub fn with_fallback(mut self, format: PayloadFormat) -> Self {
        self.fallback = format;
        self
    }

    /// 문자열 값의 `${VAR}` / `$VAR` 치환 활성화
    pub fn with_env_expansion(mut self, enabled: bool) -> Self {
        self.expand_env = enabled;
        self
    }

    /// 키에 대해 사용할 포맷
    pub fn format_for(&self, key: &SourceKey) -> PayloadFormat {
        key.extension()
            .and_then(|ext| PayloadFormat::from_extension(&ext))
            .unwrap_or(self.fallback)
    }
}

impl Decoder for FormatDecoder {
    fn parse(&self, key: &SourceKey, raw: &str) -> Result<Value> {
        let format = self.format_for(key);
        trace!("Parsing {} as {:?} ({} bytes)", key, format, raw.len());

        let value = format.parse(raw).map_err(|detail| Error::decode(key, detail))?;

        if self.expand_env {
            Ok(expand_env_vars(value))
        } else {
            Ok(value)
        }
    }
}

/// 파싱 + 스키마 검증
pub fn decode_as<T: DeserializeOwned>(decoder: &dyn Decoder, key: &SourceKey, raw: &str) -> Result<T> {
    let value = decoder.parse(key, raw)?;
    serde_json::from_value(value).map_err(|e| Error::decode(key, e.to_string()))
}
