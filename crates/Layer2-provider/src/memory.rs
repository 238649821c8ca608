//! In-memory config source
//!
//! 프로세스 내부에 설정 문서를 보관한다. 임베딩, 정적 기본값, 테스트용.
//! `put`은 호출한 스레드에서 바로 구독자에게 알린다.

use crate::watchers::WatcherSet;
use async_trait::async_trait;
use nexus_foundation::{
    ChangeCallback, ConfigSource, Error, Result, SourceInfo, SourceKey, SubscriptionId,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

/// 메모리 기반 설정 소스
pub struct MemorySource {
    documents: RwLock<HashMap<SourceKey, String>>,
    watchers: WatcherSet,
    connected: AtomicBool,
    /// false면 fetch가 SourceUnavailable로 실패 (장애 시뮬레이션)
    available: AtomicBool,
    fetch_count: AtomicU64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            watchers: WatcherSet::new(),
            connected: AtomicBool::new(false),
            available: AtomicBool::new(true),
            fetch_count: AtomicU64::new(0),
        }
    }

    /// 초기 문서와 함께 생성
    pub fn with_document(self, key: SourceKey, payload: impl Into<String>) -> Self {
        self.documents.write().insert(key, payload.into());
        self
    }

    /// 문서 저장 후 구독자에게 알림. 알린 구독자 수 반환
    pub fn put(&self, key: &SourceKey, payload: impl Into<String>) -> usize {
        let payload = payload.into();
        self.documents.write().insert(key.clone(), payload.clone());
        debug!("Memory source updated {}", key);
        self.watchers.notify(key, &payload)
    }

    /// 알림 없이 문서만 교체
    pub fn put_silently(&self, key: &SourceKey, payload: impl Into<String>) {
        self.documents.write().insert(key.clone(), payload.into());
    }

    /// 문서 제거
    pub fn remove(&self, key: &SourceKey) -> Option<String> {
        self.documents.write().remove(key)
    }

    /// 가용성 전환
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 지금까지의 fetch 호출 수
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigSource for MemorySource {
    fn name(&self) -> &str {
        "Memory"
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        info!("Memory source connected ({} documents)", self.documents.read().len());
        Ok(())
    }

    async fn fetch(&self, key: &SourceKey) -> Result<String> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::unavailable(self.name(), "source marked unavailable"));
        }

        self.documents
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.clone()))
    }

    fn subscribe(&self, key: &SourceKey, on_change: ChangeCallback) -> Result<SubscriptionId> {
        Ok(self.watchers.add(key, on_change))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.watchers.remove(id);
    }

    fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Memory source closed");
        }
        self.watchers.clear();
    }

    fn info(&self) -> SourceInfo {
        SourceInfo::new(
            self.name(),
            self.connected.load(Ordering::SeqCst),
            self.watchers.len(),
        )
        .with_detail("documents", self.documents.read().len().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fetch_and_not_found() {
        let key = SourceKey::in_default_group("db.json");
        let source = MemorySource::new().with_document(key.clone(), r#"{"host":"db1"}"#);
        source.connect().await.unwrap();

        assert_eq!(source.fetch(&key).await.unwrap(), r#"{"host":"db1"}"#);

        let missing = SourceKey::in_default_group("missing.json");
        assert!(matches!(source.fetch(&missing).await, Err(Error::NotFound(k)) if k == missing));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let key = SourceKey::in_default_group("db.json");
        let source = MemorySource::new().with_document(key.clone(), "{}");

        source.set_available(false);
        let err = source.fetch(&key).await.unwrap_err();
        assert!(err.is_transient());

        source.set_available(true);
        assert!(source.fetch(&key).await.is_ok());
    }

    #[tokio::test]
    async fn test_put_notifies_subscribers() {
        let key = SourceKey::in_default_group("db.json");
        let source = MemorySource::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let id = source
            .subscribe(&key, Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert_eq!(source.put(&key, "{}"), 1);
        source.put_silently(&key, "{\"a\":1}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        source.unsubscribe(id);
        assert_eq!(source.put(&key, "{}"), 0);
        assert_eq!(source.info().watchers, 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let source = MemorySource::new();
        source.connect().await.unwrap();
        source.subscribe(&SourceKey::in_default_group("x"), Arc::new(|_| {})).unwrap();

        source.close();
        source.close();

        let info = source.info();
        assert!(!info.connected);
        assert_eq!(info.watchers, 0);
    }
}
