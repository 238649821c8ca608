//! Config events
//!
//! 레지스트리 상태 변화를 broadcast 채널로 알린다.
//! 수신자가 없거나 느려도 갱신 경로는 막히지 않는다 (lagged 수신자는 건너뜀).

use nexus_foundation::{SchemaDescriptor, SourceKey};
use serde::Serialize;

/// 레지스트리 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConfigEvent {
    /// 초기 로드 성공 후 등록됨
    Registered {
        schema: String,
        key: SourceKey,
        revision: u64,
    },

    /// 새 값이 설치됨
    Updated {
        schema: String,
        key: SourceKey,
        revision: u64,
    },

    /// 갱신 사이클 실패. 이전 값 유지
    RefreshFailed {
        schema: String,
        key: SourceKey,
        error: String,
    },

    Unregistered {
        schema: String,
        key: SourceKey,
    },

    /// 매니저/레지스트리 종료
    Closed,
}

impl ConfigEvent {
    pub(crate) fn registered(descriptor: &SchemaDescriptor, revision: u64) -> Self {
        ConfigEvent::Registered {
            schema: descriptor.name().to_string(),
            key: descriptor.key().clone(),
            revision,
        }
    }

    pub(crate) fn updated(descriptor: &SchemaDescriptor, revision: u64) -> Self {
        ConfigEvent::Updated {
            schema: descriptor.name().to_string(),
            key: descriptor.key().clone(),
            revision,
        }
    }

    pub(crate) fn refresh_failed(descriptor: &SchemaDescriptor, error: impl ToString) -> Self {
        ConfigEvent::RefreshFailed {
            schema: descriptor.name().to_string(),
            key: descriptor.key().clone(),
            error: error.to_string(),
        }
    }

    pub(crate) fn unregistered(descriptor: &SchemaDescriptor) -> Self {
        ConfigEvent::Unregistered {
            schema: descriptor.name().to_string(),
            key: descriptor.key().clone(),
        }
    }

    /// 관련 스키마 이름 (Closed는 None)
    pub fn schema(&self) -> Option<&str> {
        match self {
            ConfigEvent::Registered { schema, .. }
            | ConfigEvent::Updated { schema, .. }
            | ConfigEvent::RefreshFailed { schema, .. }
            | ConfigEvent::Unregistered { schema, .. } => Some(schema),
            ConfigEvent::Closed => None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ConfigEvent::Registered { .. } => "registered",
            ConfigEvent::Updated { .. } => "updated",
            ConfigEvent::RefreshFailed { .. } => "refresh_failed",
            ConfigEvent::Unregistered { .. } => "unregistered",
            ConfigEvent::Closed => "closed",
        }
    }
}
