//! Core Types - 소스 좌표 및 변경 알림 타입

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 그룹을 지정하지 않은 스키마의 기본 그룹
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

// ============================================================================
// SourceKey - (data_id, group) 좌표
// ============================================================================

/// 설정 소스 안에서 하나의 설정 문서를 가리키는 좌표
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceKey {
    /// 설정 ID (예: `database.json`)
    pub data_id: String,
    /// 설정 그룹 / 네임스페이스
    pub group: String,
}

impl SourceKey {
    pub fn new(data_id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            data_id: data_id.into(),
            group: group.into(),
        }
    }

    /// 기본 그룹에 속한 키
    pub fn in_default_group(data_id: impl Into<String>) -> Self {
        Self::new(data_id, DEFAULT_GROUP)
    }

    /// data_id의 확장자 (소문자)
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.data_id)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.data_id)
    }
}

// ============================================================================
// ChangeNotification
// ============================================================================

/// 어댑터가 전달하는 변경 알림
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub key: SourceKey,
    /// 어댑터가 관찰한 새 내용. 코어는 트리거로만 사용하고 다시 fetch 한다.
    pub payload: String,
}

impl ChangeNotification {
    pub fn new(key: SourceKey, payload: impl Into<String>) -> Self {
        Self {
            key,
            payload: payload.into(),
        }
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// 구독 핸들
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription-{}", self.0)
    }
}

// ============================================================================
// SourceInfo
// ============================================================================

/// 어댑터 상태 정보
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub name: String,
    pub connected: bool,
    /// 활성 구독 수
    pub watchers: usize,
    /// 어댑터별 추가 정보 (서버 주소, 기본 경로 등)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl SourceInfo {
    pub fn new(name: impl Into<String>, connected: bool, watchers: usize) -> Self {
        Self {
            name: name.into(),
            connected,
            watchers,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_key_display() {
        let key = SourceKey::new("database.yaml", "PROD");
        assert_eq!(key.to_string(), "PROD/database.yaml");
        assert_eq!(key.extension().as_deref(), Some("yaml"));

        let key = SourceKey::in_default_group("app");
        assert_eq!(key.group, DEFAULT_GROUP);
        assert_eq!(key.extension(), None);
    }

    #[test]
    fn test_source_info_details() {
        let info = SourceInfo::new("File", true, 2).with_detail("basePath", "configs");
        assert_eq!(info.details.get("basePath").map(String::as_str), Some("configs"));

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["watchers"], 2);
    }
}
