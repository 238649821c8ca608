//! 타입을 지운 레지스트리 항목
//!
//! 테이블은 서로 다른 스키마 타입을 한곳에 담아야 하므로
//! `Binding<T>`를 `dyn ManagedEntry`로 보관하고 조회 시 downcast 한다.

use crate::store::{Snapshot, UpdateCoordinator};
use chrono::{DateTime, Utc};
use nexus_foundation::{redact_sensitive, ConfigSource, NexusConfig, Result, SchemaDescriptor};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// 레지스트리가 타입과 무관하게 다루는 항목 연산
pub(crate) trait ManagedEntry: Send + Sync {
    fn descriptor(&self) -> &SchemaDescriptor;

    fn revision(&self) -> u64;

    fn updated_at(&self) -> Option<DateTime<Utc>>;

    /// 민감 필드를 가린 현재 값. 요약을 지원하지 않는 스키마면 None
    fn summary(&self) -> Option<Result<Value>>;

    /// 구독 해제 후 엔트리를 닫는다. 여러 번 불려도 된다
    fn shutdown(&self, source: &dyn ConfigSource);

    fn as_any(&self) -> &dyn Any;
}

/// 값 → 요약 JSON
pub(crate) type Summarizer<T> = fn(&T) -> Result<Value>;

/// `Serialize` 스키마용 요약 함수
pub(crate) fn summarize_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(redact_sensitive(serde_json::to_value(value)?))
}

/// 스키마 타입 하나의 엔트리 + 코디네이터
pub(crate) struct Binding<T> {
    coordinator: Arc<UpdateCoordinator<T>>,
    summarize: Option<Summarizer<T>>,
}

impl<T: NexusConfig> Binding<T> {
    pub(crate) fn new(coordinator: Arc<UpdateCoordinator<T>>, summarize: Option<Summarizer<T>>) -> Self {
        Self {
            coordinator,
            summarize,
        }
    }

    pub(crate) fn coordinator(&self) -> &Arc<UpdateCoordinator<T>> {
        &self.coordinator
    }

    pub(crate) fn snapshot(&self) -> Option<Arc<Snapshot<T>>> {
        self.coordinator.entry().snapshot()
    }
}

impl<T: NexusConfig> ManagedEntry for Binding<T> {
    fn descriptor(&self) -> &SchemaDescriptor {
        self.coordinator.entry().descriptor()
    }

    fn revision(&self) -> u64 {
        self.coordinator.entry().revision()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().map(|s| s.updated_at())
    }

    fn summary(&self) -> Option<Result<Value>> {
        let summarize = self.summarize?;
        let snapshot = self.snapshot()?;
        Some(summarize(snapshot.value().as_ref()))
    }

    fn shutdown(&self, source: &dyn ConfigSource) {
        if let Some(id) = self.coordinator.entry().take_subscription() {
            source.unsubscribe(id);
            debug!("Unsubscribed {} ({})", self.descriptor(), id);
        }
        self.coordinator.close();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
