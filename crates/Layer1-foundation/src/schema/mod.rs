//! Schema - 설정 스키마 선언
//!
//! 스키마 타입에 소스 좌표 `(data_id, group)`를 붙이는 방법.
//! 필드 명세(이름, 타입, 기본값, 필수 여부, 중첩 구조)는 스키마의
//! `serde::Deserialize` 구현이 담당한다.
//!
//! ```ignore
//! use nexus_foundation::{nexus_config, NexusConfig};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct DatabaseConfig {
//!     host: String,
//!     #[serde(default = "default_port")]
//!     port: u16,
//! }
//!
//! nexus_config!(DatabaseConfig, data_id = "database.json", group = "PROD");
//! ```

use crate::core::{SourceKey, DEFAULT_GROUP};
use serde::de::DeserializeOwned;
use std::any::TypeId;
use std::fmt;

// ============================================================================
// NexusConfig Trait
// ============================================================================

/// 레지스트리에 등록 가능한 설정 스키마
pub trait NexusConfig: DeserializeOwned + Send + Sync + 'static {
    /// 소스 내 설정 ID
    const DATA_ID: &'static str;

    /// 설정 그룹
    const GROUP: &'static str = DEFAULT_GROUP;

    /// 선언된 소스 좌표
    fn source_key() -> SourceKey {
        SourceKey::new(Self::DATA_ID, Self::GROUP)
    }
}

/// 스키마 타입에 `NexusConfig`를 구현한다.
///
/// `nexus_config!(Type, data_id = "...")` 또는
/// `nexus_config!(Type, data_id = "...", group = "...")`
#[macro_export]
macro_rules! nexus_config {
    ($ty:ty, data_id = $data_id:expr $(,)?) => {
        impl $crate::NexusConfig for $ty {
            const DATA_ID: &'static str = $data_id;
        }
    };
    ($ty:ty, data_id = $data_id:expr, group = $group:expr $(,)?) => {
        impl $crate::NexusConfig for $ty {
            const DATA_ID: &'static str = $data_id;
            const GROUP: &'static str = $group;
        }
    };
}

// ============================================================================
// SchemaDescriptor
// ============================================================================

/// 등록된 스키마의 불변 식별 정보
#[derive(Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    key: SourceKey,
}

impl SchemaDescriptor {
    /// 선언된 좌표로 descriptor 생성
    pub fn of<T: NexusConfig>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            key: T::source_key(),
        }
    }

    /// 좌표 오버라이드
    pub fn with_key(mut self, key: SourceKey) -> Self {
        self.key = key;
        self
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 전체 경로 타입 이름
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 모듈 경로를 뗀 짧은 이름 (로그/정보 출력용)
    pub fn name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        match base.rfind("::") {
            Some(idx) => &self.type_name[idx + 2..],
            None => self.type_name,
        }
    }

    pub fn key(&self) -> &SourceKey {
        &self.key
    }
}

impl fmt::Debug for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDescriptor")
            .field("type", &self.type_name)
            .field("key", &self.key)
            .finish()
    }
}

impl fmt::Display for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.key)
    }
}
