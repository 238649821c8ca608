//! # nexus-foundation
//!
//! Foundation layer for Nexus configuration:
//! - Core: 설정 소스 계약 (`ConfigSource`, `SourceKey`, 변경 알림)
//! - Schema: 스키마 선언 (`NexusConfig`, `nexus_config!`, `SchemaDescriptor`)
//! - Decode: 포맷 파싱, 환경 변수 치환, 민감 필드 마스킹
//! - Error: 통합 에러 타입
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  NexusConfig 스키마 ──(data_id, group)──┐               │
//! │                                         ▼               │
//! │  ConfigSource::fetch ──raw──▶ Decoder::parse ──Value──▶ │
//! │                               decode_as::<T>() ──▶ T    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod core;
pub mod decode;
pub mod error;
pub mod schema;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core (소스 계약 및 타입)
// ============================================================================
pub use self::core::{
    ChangeCallback, ChangeNotification, ConfigSource, SourceInfo, SourceKey, SubscriptionId,
    DEFAULT_GROUP,
};

// ============================================================================
// Schema
// ============================================================================
pub use schema::{NexusConfig, SchemaDescriptor};

// ============================================================================
// Decode
// ============================================================================
pub use decode::{
    decode_as, expand_env_str, expand_env_vars, is_sensitive_field, redact_sensitive, Decoder,
    FormatDecoder, PayloadFormat, HIDDEN_VALUE,
};
