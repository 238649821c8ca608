//! Core Traits - 설정 소스 인터페이스
//!
//! Layer2-provider에서 구현하고 Layer2-core가 소비하는 어댑터 계약.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Layer2-core                                                │
//! │  ├── ConfigRegistry / CacheEntry                            │
//! │  └── UpdateCoordinator (fetch → decode → swap)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layer2-provider                                            │
//! │  ├── FileSource  (mtime poll)                               │
//! │  ├── NacosSource (HTTP open API)                            │
//! │  └── MemorySource                                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layer1-Foundation (이 레이어)                              │
//! │  └── ConfigSource trait, SourceKey, Decoder                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use super::types::{ChangeNotification, SourceInfo, SourceKey, SubscriptionId};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// 변경 알림 콜백
///
/// 어댑터의 전달 스레드/태스크에서 호출된다. 구현은 스케줄링만 하고 즉시 반환해야 한다.
pub type ChangeCallback = Arc<dyn Fn(ChangeNotification) + Send + Sync>;

// ============================================================================
// ConfigSource Trait
// ============================================================================

/// 설정 소스 어댑터
///
/// - `fetch`는 `SourceUnavailable` 또는 `NotFound`로 실패할 수 있다.
/// - `subscribe` / `unsubscribe` / `close`는 동기 호출이다. 정리 경로(`Drop`)에서도
///   호출할 수 있어야 하기 때문.
/// - 타임아웃 정책은 어댑터의 몫이다.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// 어댑터 이름 (로그/에러용)
    fn name(&self) -> &str;

    /// 소스에 연결
    async fn connect(&self) -> Result<()>;

    /// 원본 페이로드 조회
    async fn fetch(&self, key: &SourceKey) -> Result<String>;

    /// 변경 구독
    fn subscribe(&self, key: &SourceKey, on_change: ChangeCallback) -> Result<SubscriptionId>;

    /// 구독 해제 (모르는 핸들은 무시)
    fn unsubscribe(&self, id: SubscriptionId);

    /// 연결 종료 및 자원 해제. 여러 번 호출해도 안전해야 한다.
    fn close(&self);

    /// 상태 정보
    fn info(&self) -> SourceInfo;
}
